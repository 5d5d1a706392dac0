//! One-shot reachability probe, independent of any registered relay.

use std::time::Duration;

use serde::Serialize;

use crate::dial::dial;

/// Outcome of [`test_reachability`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReachabilityReport {
    pub success: bool,
    pub message: String,
}

impl ReachabilityReport {
    fn ok() -> Self {
        Self {
            success: true,
            message: "Connection successful".to_string(),
        }
    }

    fn failed(reason: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            message: format!("Connection failed: {reason}"),
        }
    }
}

/// Try a bare TCP connect to `host:port`.
///
/// Never errors: an invalid timeout or an unreachable destination is reported
/// through the returned report.
pub async fn test_reachability(host: &str, port: u16, timeout_secs: f64) -> ReachabilityReport {
    let Ok(timeout) = Duration::try_from_secs_f64(timeout_secs) else {
        return ReachabilityReport::failed(format!("invalid timeout {timeout_secs}"));
    };
    match dial(host, port, timeout).await {
        Ok(_stream) => ReachabilityReport::ok(),
        Err(e) => ReachabilityReport::failed(e),
    }
}
