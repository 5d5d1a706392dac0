//! Handling of one accepted client connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use netmind_core::Direction;

use super::pipe::pipe;
use crate::bus::EventBus;
use crate::dial::dial;

/// Identity of one accepted client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    /// Short id shared by every event of this connection.
    pub id: String,
    /// Listen port of the owning relay.
    pub listen_port: u16,
}

impl ConnectionContext {
    pub fn new(listen_port: u16) -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(8);
        Self { id, listen_port }
    }
}

/// Where a relay forwards to.
#[derive(Debug)]
pub(crate) struct Target {
    pub relay_name: String,
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
}

/// Dial the destination and pipe both directions until each ends.
///
/// A failed dial closes the client without logging any traffic.
pub(crate) async fn serve_connection(
    client: TcpStream,
    peer: SocketAddr,
    ctx: ConnectionContext,
    target: Arc<Target>,
    bus: Arc<EventBus>,
) {
    info!(relay = %target.relay_name, conn_id = %ctx.id, peer = %peer, "New connection");

    let upstream = match dial(&target.host, target.port, target.connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(
                relay = %target.relay_name,
                conn_id = %ctx.id,
                host = %target.host,
                port = target.port,
                error = %e,
                "Failed to connect to destination"
            );
            return;
        }
    };

    let (client_read, client_write) = client.into_split();
    let (upstream_read, upstream_write) = upstream.into_split();

    let (sent, received) = tokio::join!(
        pipe(client_read, upstream_write, Direction::Tx, &ctx, &bus),
        pipe(upstream_read, client_write, Direction::Rx, &ctx, &bus),
    );

    debug!(
        relay = %target.relay_name,
        conn_id = %ctx.id,
        bytes_tx = sent,
        bytes_rx = received,
        "Connection closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_are_short_and_distinct() {
        let a = ConnectionContext::new(9000);
        let b = ConnectionContext::new(9000);
        assert_eq!(a.id.len(), 8);
        assert!(a.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.id, b.id);
        assert_eq!(a.listen_port, 9000);
    }
}
