//! One direction of a relayed connection.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use netmind_core::Direction;

use super::connection::ConnectionContext;
use crate::bus::EventBus;

/// Largest chunk read (and logged) at once.
pub const CHUNK_SIZE: usize = 4096;

/// Copy `reader` into `writer` until EOF or an I/O error, logging every chunk
/// to the bus before forwarding it unchanged.
///
/// On exit the write side is shut down so the peer sees EOF; the opposite
/// direction is left running. Returns the number of bytes forwarded.
pub(crate) async fn pipe<R, W>(
    mut reader: R,
    mut writer: W,
    direction: Direction,
    ctx: &ConnectionContext,
    bus: &EventBus,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut forwarded = 0u64;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(conn_id = %ctx.id, %direction, error = %e, "Read failed");
                break;
            }
        };

        let chunk = &buf[..n];
        bus.log_traffic(ctx.listen_port, direction, chunk, &ctx.id)
            .await;

        if let Err(e) = writer.write_all(chunk).await {
            debug!(conn_id = %ctx.id, %direction, error = %e, "Write failed");
            break;
        }
        forwarded += n as u64;
    }

    if let Err(e) = writer.shutdown().await {
        debug!(conn_id = %ctx.id, %direction, error = %e, "Shutdown failed");
    }
    forwarded
}
