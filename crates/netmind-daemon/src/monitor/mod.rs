//! Background health monitor for relay destinations.
//!
//! Every interval, each registered relay's destination gets a bare TCP
//! connect on its own socket. Results go through
//! [`EventBus::record_status`], which broadcasts a status event only when the
//! status or error text changes.

mod probe;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use netmind_core::RelayStatus;

use crate::bus::EventBus;
use crate::dial::dial;

pub use probe::{ReachabilityReport, test_reachability};

/// Handle to the running monitor task.
#[derive(Debug)]
pub struct HealthMonitor {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HealthMonitor {
    /// Spawn the monitor. The first check runs immediately.
    pub fn spawn(bus: Arc<EventBus>, interval: Duration, probe_timeout: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let round = move || {
            let bus = Arc::clone(&bus);
            async move { check_all(&bus, probe_timeout).await }
        };
        let task = tokio::spawn(run(interval, shutdown_rx, round));
        Self { shutdown_tx, task }
    }

    /// Signal the task to stop and wait for it.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Health monitor task ended abnormally");
        }
    }
}

/// Drive `round` every `interval` until shutdown is signalled.
async fn run<F, Fut>(interval: Duration, mut shutdown: watch::Receiver<bool>, mut round: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = usize> + Send + 'static,
{
    info!(interval = ?interval, "Starting health monitor");
    loop {
        // Each iteration runs as its own task so a panic in one probe round
        // is contained and the next round still happens.
        let mut iteration = tokio::spawn(round());

        tokio::select! {
            _ = shutdown.changed() => {
                iteration.abort();
                break;
            }
            result = &mut iteration => match result {
                Ok(changed) => debug!(changed, "Health check round complete"),
                Err(e) => error!(error = %e, "Health check round failed"),
            },
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }
    info!("Health monitor stopped");
}

/// Probe every registered relay's destination once, sequentially.
///
/// Returns how many relays changed status.
pub async fn check_all(bus: &EventBus, probe_timeout: Duration) -> usize {
    let mut changed = 0;
    for spec in bus.relays().await {
        let (status, error_msg) = match dial(&spec.dest_host, spec.dest_port, probe_timeout).await {
            Ok(_stream) => (RelayStatus::Online, None),
            Err(e) => (RelayStatus::Offline, Some(e.to_string())),
        };
        if bus.record_status(spec.listen_port, status, error_msg).await {
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use netmind_core::{Event, RelaySpec};

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn check_all_marks_online_and_offline() {
        let live = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live_port = live.local_addr().unwrap().port();
        let dead_port = closed_port();

        let bus = EventBus::with_defaults();
        bus.register_relay(RelaySpec::new(9100, "127.0.0.1", live_port, "Healthy", "raw"))
            .await;
        bus.register_relay(RelaySpec::new(9101, "127.0.0.1", dead_port, "Unhealthy", "raw"))
            .await;

        assert_eq!(check_all(&bus, Duration::from_secs(2)).await, 2);

        let healthy = bus.relay(9100).await.unwrap();
        assert_eq!(healthy.status, RelayStatus::Online);
        assert!(healthy.error_msg.is_none());

        let unhealthy = bus.relay(9101).await.unwrap();
        assert_eq!(unhealthy.status, RelayStatus::Offline);
        assert!(unhealthy.error_msg.is_some());
    }

    #[tokio::test]
    async fn steady_state_emits_nothing() {
        let dead_port = closed_port();
        let bus = EventBus::with_defaults();
        bus.register_relay(RelaySpec::new(9101, "127.0.0.1", dead_port, "Unhealthy", "raw"))
            .await;
        let mut sub = bus.subscribe().await;

        assert_eq!(check_all(&bus, Duration::from_secs(2)).await, 1);
        assert_eq!(check_all(&bus, Duration::from_secs(2)).await, 0);

        let events = sub.drain();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Status(e) => {
                assert_eq!(e.listen_port, 9101);
                assert_eq!(e.status, RelayStatus::Offline);
            }
            other => panic!("expected status event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn monitor_runs_immediately_and_stops() {
        let dead_port = closed_port();
        let bus = Arc::new(EventBus::with_defaults());
        bus.register_relay(RelaySpec::new(9102, "127.0.0.1", dead_port, "Down", "raw"))
            .await;
        let mut sub = bus.subscribe().await;

        let monitor = HealthMonitor::spawn(
            Arc::clone(&bus),
            Duration::from_secs(60),
            Duration::from_secs(2),
        );

        let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, Event::Status(_)));

        tokio::time::timeout(Duration::from_secs(5), monitor.stop())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn panicking_round_does_not_stop_the_loop() {
        let rounds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&rounds);
        let round = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    panic!("first round fails");
                }
                n
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(Duration::from_millis(10), shutdown_rx, round));

        tokio::time::timeout(Duration::from_secs(5), async {
            while rounds.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(!task.is_finished());
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
