//! `NetMind` Daemon Library
//!
//! Core functionality for the `NetMind` relay daemon:
//! - Transparent TCP relays that mirror every chunk to the event bus
//! - Event bus with a bounded replay log and live fan-out subscribers
//! - Relay registry owning relay and monitor lifecycles
//! - Background health monitor probing relay destinations

pub mod bus;
pub mod dial;
pub mod monitor;
pub mod registry;
pub mod relay;

pub use bus::{EventBus, Subscription};
pub use monitor::{HealthMonitor, ReachabilityReport};
pub use registry::{RegistryError, RelayRegistry};
pub use relay::Relay;
