//! Relay and event types shared between the daemon and its consumers.
//!
//! Events serialize as flat JSON records with a `type` discriminator
//! (`"packet"` for traffic, `"status"` for reachability transitions), which is
//! the shape dashboards and tool surfaces consume.

use std::fmt::{self, Write as _};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Protocol family used when none is requested.
pub const DEFAULT_PROTOCOL: &str = "raw";

/// Last-known reachability of a relay's destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

impl RelayStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of an observed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Client to destination.
    #[serde(rename = "TX")]
    Tx,
    /// Destination to client.
    #[serde(rename = "RX")]
    Rx,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tx => "TX",
            Self::Rx => "RX",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one relay. The listen port is the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySpec {
    pub name: String,
    pub listen_port: u16,
    pub dest_host: String,
    pub dest_port: u16,
    pub protocol: String,
    pub status: RelayStatus,
    pub error_msg: Option<String>,
}

impl RelaySpec {
    pub fn new(
        listen_port: u16,
        dest_host: impl Into<String>,
        dest_port: u16,
        name: impl Into<String>,
        protocol: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            listen_port,
            dest_host: dest_host.into(),
            dest_port,
            protocol: protocol.into(),
            status: RelayStatus::Unknown,
            error_msg: None,
        }
    }

    /// `host:port` of the destination.
    pub fn destination(&self) -> String {
        format!("{}:{}", self.dest_host, self.dest_port)
    }
}

/// One observed chunk of relayed bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficEvent {
    pub id: String,
    pub relay_name: String,
    pub direction: Direction,
    pub data_hex: String,
    pub data_str: String,
    pub semantic: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub connection_id: String,
}

impl TrafficEvent {
    /// Capture a chunk, stamping it with a fresh id and the current time.
    pub fn capture(
        relay_name: impl Into<String>,
        direction: Direction,
        data: &[u8],
        semantic: String,
        connection_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            relay_name: relay_name.into(),
            direction,
            data_hex: hex_spaced(data),
            data_str: String::from_utf8_lossy(data).into_owned(),
            semantic,
            timestamp: unix_timestamp(),
            connection_id: connection_id.into(),
        }
    }
}

/// A reachability transition for one relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub listen_port: u16,
    pub status: RelayStatus,
    pub error_msg: Option<String>,
}

/// Anything carried on the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "packet")]
    Traffic(TrafficEvent),
    #[serde(rename = "status")]
    Status(StatusEvent),
}

impl Event {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Traffic(_) => "packet",
            Self::Status(_) => "status",
        }
    }
}

impl From<TrafficEvent> for Event {
    fn from(event: TrafficEvent) -> Self {
        Self::Traffic(event)
    }
}

impl From<StatusEvent> for Event {
    fn from(event: StatusEvent) -> Self {
        Self::Status(event)
    }
}

/// Lowercase hex pairs separated by single spaces (`"48 45 4c"`).
pub fn hex_spaced(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}
