//! `NetMind` Daemon
//!
//! Runs transparent TCP relays that capture every chunk into the event bus,
//! glossing known protocols, while a health monitor watches each
//! destination.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use netmind_core::config::{LoadedConfig, load_config, relays_from_args};
use netmind_daemon::{EventBus, RelayRegistry};

#[derive(Parser, Debug)]
#[command(name = "netmind-daemon")]
#[command(version, about = "NetMind daemon - TCP relay with traffic capture")]
struct Args {
    /// Path to a JSON settings file (layered over the global settings).
    #[arg(long, env = "NETMIND_CONFIG")]
    config: Option<PathBuf>,

    /// Start a relay: name:listen_port:dest_host:dest_port[:protocol].
    /// May be given multiple times; malformed entries are logged and skipped.
    #[arg(long = "proxy", value_name = "SPEC")]
    proxies: Vec<String>,

    /// Log level filter for the daemon (e.g. "info", "debug", "warn").
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "NETMIND_LOG_JSON")]
    log_json: bool,

    /// Do not run the destination health monitor.
    #[arg(long)]
    no_monitor: bool,

    /// Log every captured event as a JSON record.
    #[arg(long)]
    trace_events: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let LoadedConfig {
        mut config,
        mut rejected,
    } = load_config(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    let cli_relays = relays_from_args(&args.proxies);
    config.relays.extend(cli_relays.relays);
    rejected.extend(cli_relays.rejected);

    let log_filter = format!("netmind_daemon={}", config.log_level);
    netmind_core::tracing_init::init_tracing(&log_filter, args.log_json)?;

    for e in &rejected {
        warn!(error = %e, "Skipping invalid startup relay");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        relays = config.relays.len(),
        "Starting netmind-daemon"
    );

    let bus = Arc::new(EventBus::new(&config.events));
    let registry = RelayRegistry::new(Arc::clone(&bus), &config);

    for def in &config.relays {
        match registry
            .add_relay(
                def.listen_port,
                &def.dest_host,
                def.dest_port,
                &def.name,
                &def.protocol,
            )
            .await
        {
            Ok(message) => info!(%message, "Startup relay ready"),
            Err(e) => warn!(relay = %def.name, error = %e, "Failed to start relay"),
        }
    }

    if config.monitor.enabled && !args.no_monitor {
        registry.start_monitor().await;
    }

    let event_tracer = if args.trace_events {
        let mut subscription = bus.subscribe().await;
        Some(tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                match serde_json::to_string(&event) {
                    Ok(json) => info!(target: "netmind_daemon::events", event = %json),
                    Err(e) => warn!(error = %e, "Failed to serialize event"),
                }
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    registry.shutdown().await;
    if let Some(tracer) = event_tracer {
        tracer.abort();
    }

    info!("NetMind stopped");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn malformed_proxy_does_not_reject_command_line() {
        let args = Args::try_parse_from([
            "netmind-daemon",
            "--proxy",
            "Good:9000:localhost:4532",
            "--proxy",
            "broken",
        ])
        .unwrap();
        assert_eq!(args.proxies.len(), 2);

        let parsed = relays_from_args(&args.proxies);
        assert_eq!(parsed.relays.len(), 1);
        assert_eq!(parsed.relays[0].name, "Good");
        assert_eq!(parsed.rejected.len(), 1);
    }

    #[test]
    fn flags_default_off() {
        let args = Args::try_parse_from(["netmind-daemon"]).unwrap();
        assert!(args.proxies.is_empty());
        assert!(!args.no_monitor);
        assert!(!args.trace_events);
        assert!(args.log_level.is_none());
    }
}
