//! Outbound TCP connects with a bounded timeout.
//!
//! Used both for relayed connections and for health probes; each call opens
//! its own socket.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

/// Destination could not be reached.
#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Connect to `host:port`, giving up after `connect_timeout`.
pub async fn dial(host: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream, DialError> {
    match timeout(connect_timeout, TcpStream::connect((host, port))).await {
        Ok(stream) => Ok(stream?),
        Err(_) => Err(DialError::Timeout(connect_timeout)),
    }
}
