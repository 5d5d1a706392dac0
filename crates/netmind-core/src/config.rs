//! Configuration resolution for `NetMind`.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/netmind/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables (`NETMIND_LOG_LEVEL`, `NETMIND_PROXIES`)
//! 5. CLI arguments (highest priority, applied by the binary)

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::DEFAULT_PROTOCOL;

/// Environment variable holding a JSON array of startup relays.
pub const PROXIES_ENV: &str = "NETMIND_PROXIES";

/// Complete `NetMind` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub events: EventConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Relays started at boot.
    #[serde(default)]
    pub relays: Vec<RelayDefinition>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay: RelayConfig::default(),
            events: EventConfig::default(),
            monitor: MonitorConfig::default(),
            relays: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Listener and dial settings shared by every relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Host the relay listeners bind to.
    pub bind_host: String,
    /// Timeout for dialing the destination of an accepted connection.
    pub connect_timeout_secs: f64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            connect_timeout_secs: 3.0,
        }
    }
}

/// Event log and subscriber queue sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Traffic events retained for replay; oldest dropped beyond this.
    pub log_capacity: usize,
    /// Per-subscriber queue depth; newest dropped for a full subscriber.
    pub subscriber_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            log_capacity: 2000,
            subscriber_capacity: 100,
        }
    }
}

/// Health monitor schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_secs: f64,
    pub probe_timeout_secs: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5.0,
            probe_timeout_secs: 2.0,
        }
    }
}

/// A relay requested at startup.
///
/// Field aliases accept the `local_port`/`target_host`/`target_port` naming
/// used by `NETMIND_PROXIES`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayDefinition {
    pub name: String,
    #[serde(alias = "local_port")]
    pub listen_port: u16,
    #[serde(alias = "target_host")]
    pub dest_host: String,
    #[serde(alias = "target_port")]
    pub dest_port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

impl FromStr for RelayDefinition {
    type Err = Error;

    /// Parse `name:listen_port:dest_host:dest_port[:protocol]`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::RelayDefinition {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = s.split(':').collect();
        if !(4..=5).contains(&parts.len()) {
            return Err(invalid(
                "expected name:listen_port:dest_host:dest_port[:protocol]",
            ));
        }
        if parts[0].is_empty() {
            return Err(invalid("name is empty"));
        }
        if parts[2].is_empty() {
            return Err(invalid("destination host is empty"));
        }
        let listen_port = parts[1]
            .parse()
            .map_err(|_| invalid("listen port is not a valid port number"))?;
        let dest_port = parts[3]
            .parse()
            .map_err(|_| invalid("destination port is not a valid port number"))?;
        let protocol = parts
            .get(4)
            .filter(|p| !p.is_empty())
            .map_or_else(default_protocol, |p| (*p).to_string());

        Ok(Self {
            name: parts[0].to_string(),
            listen_port,
            dest_host: parts[2].to_string(),
            dest_port,
            protocol,
        })
    }
}

/// Outcome of [`load_config`].
///
/// `rejected` holds startup relay entries that were skipped. They are returned
/// rather than logged because configuration is read before tracing is set up.
#[derive(Debug, Default)]
pub struct LoadedConfig {
    pub config: Config,
    pub rejected: Vec<Error>,
}

/// Startup relays parsed from one source.
#[derive(Debug, Default)]
pub struct ParsedRelays {
    pub relays: Vec<RelayDefinition>,
    pub rejected: Vec<Error>,
}

/// Load configuration with hierarchical resolution.
pub fn load_config(config_file: Option<&Path>) -> Result<LoadedConfig> {
    let mut loaded = LoadedConfig::default();

    // Load global config
    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        let global = load_config_file(&global_path)?;
        merge_config(&mut loaded.config, global);
    }

    // Load explicit config
    if let Some(path) = config_file {
        let explicit = load_config_file(path)?;
        merge_config(&mut loaded.config, explicit);
    }

    // Apply environment overrides
    apply_env_overrides(&mut loaded);

    Ok(loaded)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".netmind").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/netmind/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("netmind").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// Parse the JSON array format of `NETMIND_PROXIES`.
///
/// Entries that do not parse are skipped and returned in `rejected` so one
/// typo does not keep the remaining relays from starting. Only a value that is
/// not a JSON array at all is an error.
pub fn relays_from_json(raw: &str) -> Result<ParsedRelays> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(raw)?;
    let mut parsed = ParsedRelays::default();
    for entry in entries {
        let input = entry.to_string();
        match parse_relay_entry(entry) {
            Ok(def) => parsed.relays.push(def),
            Err(e) => parsed.rejected.push(Error::RelayDefinition {
                input,
                reason: e.to_string(),
            }),
        }
    }
    Ok(parsed)
}

/// Parse `--proxy` values, keeping the valid ones.
pub fn relays_from_args<I, S>(args: I) -> ParsedRelays
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed = ParsedRelays::default();
    for arg in args {
        match arg.as_ref().parse::<RelayDefinition>() {
            Ok(def) => parsed.relays.push(def),
            Err(e) => parsed.rejected.push(e),
        }
    }
    parsed
}

/// Accepts ports given either as numbers or as numeric strings.
fn parse_relay_entry(mut entry: serde_json::Value) -> Result<RelayDefinition> {
    if let Some(obj) = entry.as_object_mut() {
        for key in ["local_port", "listen_port", "target_port", "dest_port"] {
            if let Some(serde_json::Value::String(s)) = obj.get(key)
                && let Ok(n) = s.trim().parse::<u16>()
            {
                obj.insert(key.to_string(), n.into());
            }
        }
    }
    Ok(serde_json::from_value(entry)?)
}

/// One settings file. Absent keys leave the lower layer untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    relay: RelayLayer,
    events: EventLayer,
    monitor: MonitorLayer,
    relays: Vec<RelayDefinition>,
    log_level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelayLayer {
    bind_host: Option<String>,
    connect_timeout_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventLayer {
    log_capacity: Option<usize>,
    subscriber_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MonitorLayer {
    enabled: Option<bool>,
    interval_secs: Option<f64>,
    probe_timeout_secs: Option<f64>,
}

fn load_config_file(path: &Path) -> Result<ConfigLayer> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: ConfigLayer) {
    // Relay settings
    if let Some(host) = overlay.relay.bind_host {
        base.relay.bind_host = host;
    }
    if let Some(secs) = overlay.relay.connect_timeout_secs {
        base.relay.connect_timeout_secs = secs;
    }

    // Event settings
    if let Some(n) = overlay.events.log_capacity {
        base.events.log_capacity = n;
    }
    if let Some(n) = overlay.events.subscriber_capacity {
        base.events.subscriber_capacity = n;
    }

    // Monitor settings
    if let Some(enabled) = overlay.monitor.enabled {
        base.monitor.enabled = enabled;
    }
    if let Some(secs) = overlay.monitor.interval_secs {
        base.monitor.interval_secs = secs;
    }
    if let Some(secs) = overlay.monitor.probe_timeout_secs {
        base.monitor.probe_timeout_secs = secs;
    }

    if let Some(level) = overlay.log_level {
        base.log_level = level;
    }

    // Startup relays accumulate across layers
    base.relays.extend(overlay.relays);
}

fn apply_env_overrides(loaded: &mut LoadedConfig) {
    if let Ok(val) = std::env::var("NETMIND_LOG_LEVEL") {
        loaded.config.log_level = val;
    }
    if let Ok(val) = std::env::var(PROXIES_ENV) {
        apply_proxies_env(loaded, &val);
    }
}

fn apply_proxies_env(loaded: &mut LoadedConfig, raw: &str) {
    match relays_from_json(raw) {
        Ok(parsed) => {
            loaded.config.relays.extend(parsed.relays);
            loaded.rejected.extend(parsed.rejected);
        }
        Err(e) => loaded
            .rejected
            .push(Error::Config(format!("Ignoring malformed {PROXIES_ENV}: {e}"))),
    }
}
