//! A single listen-port-to-destination TCP relay.
//!
//! Lifecycle: bound by [`bind_listener`], serving once [`Relay::spawn`] starts
//! its accept task, closed by [`Relay::close`]. Closing stops accepting and
//! waits for the accept task; connections already being piped run until
//! their own EOF or error so in-flight exchanges are not cut mid-frame.

mod connection;
mod pipe;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use netmind_core::RelaySpec;

use crate::bus::EventBus;
use connection::{Target, serve_connection};

pub use connection::ConnectionContext;
pub use pipe::CHUNK_SIZE;

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Bind the listening socket for a relay.
pub async fn bind_listener(bind_host: &str, listen_port: u16) -> io::Result<TcpListener> {
    TcpListener::bind((bind_host, listen_port)).await
}

/// A running relay.
#[derive(Debug)]
pub struct Relay {
    name: String,
    listen_port: u16,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl Relay {
    /// Start accepting on `listener`, forwarding to the destination in `spec`.
    ///
    /// The spec must already be registered on the bus, otherwise the first
    /// chunks would be dropped as belonging to an unknown relay.
    pub fn spawn(
        listener: TcpListener,
        spec: &RelaySpec,
        bus: Arc<EventBus>,
        connect_timeout: Duration,
    ) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let target = Arc::new(Target {
            relay_name: spec.name.clone(),
            host: spec.dest_host.clone(),
            port: spec.dest_port,
            connect_timeout,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            spec.listen_port,
            target,
            bus,
            shutdown_rx,
        ));

        info!(
            relay = %spec.name,
            listen = %local_addr,
            destination = %spec.destination(),
            protocol = %spec.protocol,
            "Relay listening"
        );

        Ok(Self {
            name: spec.name.clone(),
            listen_port: spec.listen_port,
            local_addr,
            shutdown_tx,
            accept_task,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn listen_port(&self) -> u16 {
        self.listen_port
    }

    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and wait for the accept task to finish.
    pub async fn close(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.accept_task.await {
            warn!(relay = %self.name, error = %e, "Accept task ended abnormally");
        }
        info!(relay = %self.name, listen_port = self.listen_port, "Relay stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    listen_port: u16,
    target: Arc<Target>,
    bus: Arc<EventBus>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let ctx = ConnectionContext::new(listen_port);
                    tokio::spawn(serve_connection(
                        stream,
                        peer,
                        ctx,
                        Arc::clone(&target),
                        Arc::clone(&bus),
                    ));
                }
                Err(e) => {
                    warn!(listen_port, error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
        }
    }
    debug!(listen_port, "Accept loop stopped");
}
