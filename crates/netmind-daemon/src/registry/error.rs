//! Registry error types.

/// Failures returned by relay management operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Port {port} is already in use by relay '{name}'")]
    PortInUse { port: u16, name: String },

    #[error("Failed to bind port {port}: {reason}")]
    BindFailed { port: u16, reason: String },

    #[error("No relay found on port {port}")]
    NotFound { port: u16 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
