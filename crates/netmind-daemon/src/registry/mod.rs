//! Relay registry: the engine that owns every live relay.
//!
//! All relay management goes through here. The registry is the only writer of
//! the live-relay set and of the bus's relay-spec table membership, and it
//! owns the health monitor's lifecycle.

mod error;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use netmind_core::config::{MonitorConfig, RelayConfig};
use netmind_core::{Config, RelaySpec, TrafficEvent};

use crate::bus::{EventBus, Subscription};
use crate::monitor::{self, HealthMonitor, ReachabilityReport};
use crate::relay::{Relay, bind_listener};

pub use error::RegistryError;

/// Owns the live relays and the health monitor.
pub struct RelayRegistry {
    bus: Arc<EventBus>,
    relays: Mutex<HashMap<u16, Relay>>,
    monitor: Mutex<Option<HealthMonitor>>,
    bind_host: String,
    connect_timeout: Duration,
    monitor_interval: Duration,
    probe_timeout: Duration,
}

impl RelayRegistry {
    /// Create a registry writing to `bus`, using the relay and monitor
    /// sections of `config`.
    pub fn new(bus: Arc<EventBus>, config: &Config) -> Self {
        Self::with_settings(bus, &config.relay, &config.monitor)
    }

    /// Create with default settings.
    pub fn with_defaults(bus: Arc<EventBus>) -> Self {
        Self::new(bus, &Config::default())
    }

    pub fn with_settings(bus: Arc<EventBus>, relay: &RelayConfig, monitor: &MonitorConfig) -> Self {
        let defaults = (RelayConfig::default(), MonitorConfig::default());
        Self {
            bus,
            relays: Mutex::new(HashMap::new()),
            monitor: Mutex::new(None),
            bind_host: relay.bind_host.clone(),
            connect_timeout: secs(relay.connect_timeout_secs, defaults.0.connect_timeout_secs),
            monitor_interval: secs(monitor.interval_secs, defaults.1.interval_secs),
            probe_timeout: secs(monitor.probe_timeout_secs, defaults.1.probe_timeout_secs),
        }
    }

    pub const fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Start a relay on `listen_port` forwarding to `dest_host:dest_port`.
    pub async fn add_relay(
        &self,
        listen_port: u16,
        dest_host: &str,
        dest_port: u16,
        name: &str,
        protocol: &str,
    ) -> Result<String, RegistryError> {
        self.validate(listen_port, dest_host, dest_port, name, protocol)?;

        // Held across bind so two concurrent adds cannot race for one port.
        let mut relays = self.relays.lock().await;
        if let Some(existing) = relays.get(&listen_port) {
            return Err(RegistryError::PortInUse {
                port: listen_port,
                name: existing.name().to_string(),
            });
        }

        let listener = bind_listener(&self.bind_host, listen_port)
            .await
            .map_err(|e| RegistryError::BindFailed {
                port: listen_port,
                reason: e.to_string(),
            })?;

        let spec = RelaySpec::new(listen_port, dest_host, dest_port, name, protocol);
        self.bus.register_relay(spec.clone()).await;

        let relay = match Relay::spawn(listener, &spec, Arc::clone(&self.bus), self.connect_timeout)
        {
            Ok(relay) => relay,
            Err(e) => {
                self.bus.unregister_relay(listen_port).await;
                return Err(RegistryError::BindFailed {
                    port: listen_port,
                    reason: e.to_string(),
                });
            }
        };
        relays.insert(listen_port, relay);

        Ok(format!("Relay '{name}' started on port {listen_port}"))
    }

    /// Stop and forget the relay on `listen_port`.
    pub async fn remove_relay(&self, listen_port: u16) -> Result<String, RegistryError> {
        let mut relays = self.relays.lock().await;
        let relay = relays
            .remove(&listen_port)
            .ok_or(RegistryError::NotFound { port: listen_port })?;

        relay.close().await;
        self.bus.unregister_relay(listen_port).await;
        drop(relays);

        Ok(format!("Relay on port {listen_port} stopped"))
    }

    /// Snapshot of every live relay, ordered by listen port.
    pub async fn list_relays(&self) -> Vec<RelaySpec> {
        self.bus.relays().await
    }

    pub async fn relay_count(&self) -> usize {
        self.relays.lock().await.len()
    }

    pub async fn recent_events(&self, limit: usize, relay_name: Option<&str>) -> Vec<TrafficEvent> {
        self.bus.recent(limit, relay_name).await
    }

    pub async fn subscribe_events(&self) -> Subscription {
        self.bus.subscribe().await
    }

    /// One-shot connectivity check, unrelated to any registered relay.
    pub async fn test_reachability(&self, host: &str, port: u16, timeout_secs: f64) -> ReachabilityReport {
        monitor::test_reachability(host, port, timeout_secs).await
    }

    /// Run one health-check round now. Returns how many relays changed status.
    pub async fn check_health(&self) -> usize {
        monitor::check_all(&self.bus, self.probe_timeout).await
    }

    /// Start the periodic health monitor if it is not running.
    pub async fn start_monitor(&self) {
        let mut monitor = self.monitor.lock().await;
        if monitor.is_none() {
            *monitor = Some(HealthMonitor::spawn(
                Arc::clone(&self.bus),
                self.monitor_interval,
                self.probe_timeout,
            ));
        }
    }

    /// Stop the health monitor if it is running.
    pub async fn stop_monitor(&self) {
        let running = self.monitor.lock().await.take();
        if let Some(monitor) = running {
            monitor.stop().await;
        }
    }

    pub async fn is_monitor_running(&self) -> bool {
        self.monitor.lock().await.is_some()
    }

    /// Stop the monitor, close every relay and clear the relay-spec table.
    /// Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.stop_monitor().await;

        let relays: Vec<Relay> = self.relays.lock().await.drain().map(|(_, r)| r).collect();
        if !relays.is_empty() {
            info!(count = relays.len(), "Stopping all relays");
        }
        for relay in relays {
            relay.close().await;
        }
        self.bus.clear_relays().await;
        info!("Registry shutdown complete");
    }

    fn validate(
        &self,
        listen_port: u16,
        dest_host: &str,
        dest_port: u16,
        name: &str,
        protocol: &str,
    ) -> Result<(), RegistryError> {
        if listen_port == 0 {
            return Err(RegistryError::InvalidArgument(
                "listen port must be non-zero".to_string(),
            ));
        }
        if dest_port == 0 {
            return Err(RegistryError::InvalidArgument(
                "destination port must be non-zero".to_string(),
            ));
        }
        if dest_host.trim().is_empty() {
            return Err(RegistryError::InvalidArgument(
                "destination host is empty".to_string(),
            ));
        }
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidArgument("name is empty".to_string()));
        }
        if !self.bus.decoders().supports(protocol) {
            return Err(RegistryError::InvalidArgument(format!(
                "unsupported protocol '{protocol}' (expected one of: {})",
                self.bus.decoders().families().join(", ")
            )));
        }
        Ok(())
    }
}

/// A zero, negative or non-finite setting falls back to `fallback`.
fn secs(value: f64, fallback: f64) -> Duration {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => duration,
        _ => {
            warn!(value, fallback, "Invalid duration in config, using default");
            Duration::from_secs_f64(fallback)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn local_config() -> Config {
        let mut config = Config::default();
        config.relay.bind_host = "127.0.0.1".to_string();
        config
    }

    fn registry() -> RelayRegistry {
        RelayRegistry::new(Arc::new(EventBus::with_defaults()), &local_config())
    }

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn add_and_remove_relay() {
        let registry = registry();
        let port = free_port();

        let msg = registry
            .add_relay(port, "127.0.0.1", 4532, "Rig", "hamlib")
            .await
            .unwrap();
        assert_eq!(msg, format!("Relay 'Rig' started on port {port}"));

        let listed = registry.list_relays().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Rig");
        assert_eq!(listed[0].protocol, "hamlib");

        let msg = registry.remove_relay(port).await.unwrap();
        assert_eq!(msg, format!("Relay on port {port} stopped"));
        assert!(registry.list_relays().await.is_empty());
        assert_eq!(registry.relay_count().await, 0);
    }

    #[tokio::test]
    async fn invalid_arguments_are_rejected() {
        let registry = registry();
        let port = free_port();

        let cases = [
            registry.add_relay(0, "127.0.0.1", 4532, "Rig", "raw").await,
            registry.add_relay(port, "127.0.0.1", 0, "Rig", "raw").await,
            registry.add_relay(port, " ", 4532, "Rig", "raw").await,
            registry.add_relay(port, "127.0.0.1", 4532, "", "raw").await,
            registry.add_relay(port, "127.0.0.1", 4532, "Rig", "modbus").await,
        ];
        for result in cases {
            assert!(matches!(result, Err(RegistryError::InvalidArgument(_))));
        }
        assert!(registry.list_relays().await.is_empty());
    }

    #[tokio::test]
    async fn bind_failure_is_reported_and_leaves_no_trace() {
        let registry = registry();
        let squatter = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = squatter.local_addr().unwrap().port();

        let err = registry
            .add_relay(port, "127.0.0.1", 4532, "Rig", "raw")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::BindFailed { port: p, .. } if p == port));
        assert!(registry.list_relays().await.is_empty());
        drop(squatter);
    }

    #[tokio::test]
    async fn monitor_lifecycle_is_idempotent() {
        let registry = registry();
        assert!(!registry.is_monitor_running().await);

        registry.start_monitor().await;
        registry.start_monitor().await;
        assert!(registry.is_monitor_running().await);

        registry.stop_monitor().await;
        registry.stop_monitor().await;
        assert!(!registry.is_monitor_running().await);
    }

    #[tokio::test]
    async fn shutdown_twice_is_safe() {
        let registry = registry();
        let port = free_port();
        registry
            .add_relay(port, "127.0.0.1", 4532, "Rig", "raw")
            .await
            .unwrap();
        registry.start_monitor().await;

        registry.shutdown().await;
        registry.shutdown().await;

        assert!(registry.list_relays().await.is_empty());
        assert_eq!(registry.relay_count().await, 0);
        assert!(!registry.is_monitor_running().await);
    }

    #[test]
    fn invalid_durations_fall_back() {
        assert_eq!(secs(-1.0, 2.0), Duration::from_secs(2));
        assert_eq!(secs(f64::NAN, 2.0), Duration::from_secs(2));
        assert_eq!(secs(0.5, 2.0), Duration::from_millis(500));
    }

    #[test]
    fn zero_interval_uses_default() {
        let mut config = local_config();
        config.monitor.interval_secs = 0.0;
        config.relay.connect_timeout_secs = 0.0;
        let registry = RelayRegistry::new(Arc::new(EventBus::with_defaults()), &config);
        assert_eq!(registry.monitor_interval, Duration::from_secs(5));
        assert_eq!(registry.connect_timeout, Duration::from_secs(3));
    }
}
