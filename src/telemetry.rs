use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter directive: {0}")]
    InvalidFilter(String),
    #[error("tracing subscriber already installed: {0}")]
    Install(String),
}

/// Install the global tracing subscriber from configuration. Call once at
/// process start.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|source| TelemetryError::InvalidFilter(source.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|source| TelemetryError::Install(source.to_string()))
}
