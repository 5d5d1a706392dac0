//! Event bus: bounded traffic log plus fan-out to live subscribers.
//!
//! Relays and the health monitor write here; dashboards and tool surfaces
//! read. Two overflow policies apply and are kept separate: the replay log
//! drops its *oldest* entry when full, while a full subscriber queue drops the
//! *newest* event for that subscriber only. Producers never wait on consumers.
//!
//! The bus also holds the relay-spec table so a chunk can be attributed to its
//! relay by listen port. Membership of that table is changed only by the
//! [`RelayRegistry`](crate::registry::RelayRegistry); status fields only by the
//! health monitor through [`EventBus::record_status`].

mod subscription;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, trace, warn};

use netmind_core::config::EventConfig;
use netmind_core::{
    DecoderRegistry, Direction, Event, RelaySpec, RelayStatus, StatusEvent, TrafficEvent,
};

pub use subscription::Subscription;

/// Shared event bus. Create one per process and hand out `Arc` clones.
pub struct EventBus {
    log: Mutex<VecDeque<TrafficEvent>>,
    log_capacity: usize,
    subscribers: Mutex<HashMap<u64, mpsc::Sender<Event>>>,
    subscriber_capacity: usize,
    next_subscriber_id: AtomicU64,
    relays: RwLock<HashMap<u16, RelaySpec>>,
    decoders: DecoderRegistry,
}

impl EventBus {
    /// Create a bus with the built-in protocol decoders.
    pub fn new(config: &EventConfig) -> Self {
        Self::with_decoders(config, DecoderRegistry::with_builtins())
    }

    /// Create with default capacities.
    pub fn with_defaults() -> Self {
        Self::new(&EventConfig::default())
    }

    /// Create a bus with a custom decoder set.
    pub fn with_decoders(config: &EventConfig, decoders: DecoderRegistry) -> Self {
        let log_capacity = config.log_capacity.max(1);
        Self {
            log: Mutex::new(VecDeque::with_capacity(log_capacity)),
            log_capacity,
            subscribers: Mutex::new(HashMap::new()),
            subscriber_capacity: config.subscriber_capacity.max(1),
            next_subscriber_id: AtomicU64::new(1),
            relays: RwLock::new(HashMap::new()),
            decoders,
        }
    }

    pub const fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    pub const fn log_capacity(&self) -> usize {
        self.log_capacity
    }

    /// Record one chunk seen on the relay listening on `listen_port`.
    ///
    /// Chunks for a port with no registered relay are dropped silently: a
    /// relay removed while its pipes are still draining must not fail them.
    pub async fn log_traffic(
        &self,
        listen_port: u16,
        direction: Direction,
        data: &[u8],
        connection_id: &str,
    ) {
        let (relay_name, protocol) = {
            let relays = self.relays.read().await;
            match relays.get(&listen_port) {
                Some(spec) => (spec.name.clone(), spec.protocol.clone()),
                None => {
                    trace!(listen_port, "Dropping chunk for unregistered relay");
                    return;
                }
            }
        };

        let semantic = self.decoders.decode(&protocol, data);
        let event = TrafficEvent::capture(relay_name, direction, data, semantic, connection_id);

        {
            let mut log = self.log.lock().await;
            while log.len() >= self.log_capacity {
                log.pop_front();
            }
            log.push_back(event.clone());
        }

        self.broadcast(Event::Traffic(event)).await;
    }

    /// Push `event` to every subscriber without waiting.
    pub async fn broadcast(&self, event: Event) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!(subscriber = id, kind = event.kind(), "Subscriber queue full, event dropped");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = id, "Removing closed subscriber");
                false
            }
        });
    }

    /// Register a new bounded subscriber queue.
    pub async fn subscribe(&self) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.subscriber_capacity);
        self.subscribers.lock().await.insert(id, tx);
        debug!(subscriber = id, "Subscriber registered");
        Subscription { id, rx }
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub async fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let removed = self
            .subscribers
            .lock()
            .await
            .remove(&subscription.id)
            .is_some();
        if removed {
            debug!(subscriber = subscription.id, "Subscriber removed");
        }
        removed
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// The last `limit` traffic events, oldest first, optionally only those
    /// of one relay. The filter applies before the limit.
    pub async fn recent(&self, limit: usize, relay_name: Option<&str>) -> Vec<TrafficEvent> {
        let log = self.log.lock().await;
        let matching: Vec<&TrafficEvent> = log
            .iter()
            .filter(|e| relay_name.is_none_or(|name| e.relay_name == name))
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }

    pub async fn log_len(&self) -> usize {
        self.log.lock().await.len()
    }

    /// Snapshot of all registered relays, ordered by listen port.
    pub async fn relays(&self) -> Vec<RelaySpec> {
        let mut specs: Vec<RelaySpec> = self.relays.read().await.values().cloned().collect();
        specs.sort_by_key(|s| s.listen_port);
        specs
    }

    pub async fn relay(&self, listen_port: u16) -> Option<RelaySpec> {
        self.relays.read().await.get(&listen_port).cloned()
    }

    pub(crate) async fn register_relay(&self, spec: RelaySpec) {
        self.relays.write().await.insert(spec.listen_port, spec);
    }

    pub(crate) async fn unregister_relay(&self, listen_port: u16) -> Option<RelaySpec> {
        self.relays.write().await.remove(&listen_port)
    }

    pub(crate) async fn clear_relays(&self) {
        self.relays.write().await.clear();
    }

    /// Apply a health result to a relay's spec.
    ///
    /// A [`StatusEvent`] is broadcast only when the status or the error text
    /// differs from what was recorded. Returns whether anything changed.
    pub(crate) async fn record_status(
        &self,
        listen_port: u16,
        status: RelayStatus,
        error_msg: Option<String>,
    ) -> bool {
        {
            let mut relays = self.relays.write().await;
            let Some(spec) = relays.get_mut(&listen_port) else {
                return false;
            };
            if spec.status == status && spec.error_msg == error_msg {
                return false;
            }
            spec.status = status;
            spec.error_msg.clone_from(&error_msg);
        }

        match &error_msg {
            Some(error) => warn!(listen_port, %status, error = %error, "Relay destination status changed"),
            None => info!(listen_port, %status, "Relay destination status changed"),
        }

        self.broadcast(
            StatusEvent {
                listen_port,
                status,
                error_msg,
            }
            .into(),
        )
        .await;
        true
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_defaults()
    }
}
