//! Log output setup for `NetMind` binaries.

use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{Error, Result};

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` wins when it parses; otherwise `default_filter` (for example
/// `"netmind_daemon=info"`) is used. A `default_filter` that does not parse,
/// usually a bad `--log-level`, is an error, as is a second call.
pub fn init_tracing(default_filter: &str, log_json: bool) -> Result<()> {
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), default_filter)?;

    let output = fmt::layer().with_writer(std::io::stderr);
    let output = if log_json {
        output.json().boxed()
    } else {
        output.boxed()
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to install log subscriber: {e}")))
}

fn build_filter(rust_log: Option<&str>, default_filter: &str) -> Result<EnvFilter> {
    if let Some(filter) = rust_log.and_then(|raw| EnvFilter::try_new(raw).ok()) {
        return Ok(filter);
    }
    EnvFilter::try_new(default_filter)
        .map_err(|e| Error::Config(format!("Invalid log filter '{default_filter}': {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn rust_log_takes_precedence() {
        let filter = build_filter(Some("netmind_daemon=trace"), "netmind_daemon=info").unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn unparsable_rust_log_falls_back_to_default() {
        let filter = build_filter(Some("netmind_daemon=loud"), "netmind_daemon=warn").unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn bad_default_filter_is_an_error() {
        let err = build_filter(None, "netmind_daemon=verbose").unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("verbose")));
    }
}
