//! `NetMind` Core Library
//!
//! Shared functionality for `NetMind` components:
//! - Protocol decoders that gloss raw TCP chunks (Hamlib `rigctld`, raw)
//! - Relay, traffic and status event types
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod config;
pub mod decoder;
pub mod error;
pub mod tracing_init;
pub mod types;

pub use config::Config;
pub use decoder::{DecoderRegistry, ProtocolDecoder};
pub use error::{Error, Result};
pub use types::{Direction, Event, RelaySpec, RelayStatus, StatusEvent, TrafficEvent};
