//! Process-wide logging: a tracing fmt subscriber on stderr with `log`
//! records from the kernel bridged into it.
use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("Failed to install log bridge: {0}")]
    Bridge(String),

    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

/// Build the filter: an explicit `--log-level` wins, then `RUST_LOG`, then `info`.
pub fn build_filter(level: Option<&str>) -> Result<EnvFilter, LoggingError> {
    match level {
        Some(filter) => EnvFilter::try_new(filter).map_err(|e| LoggingError::InvalidFilter {
            filter: filter.to_string(),
            message: e.to_string(),
        }),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Install the global subscriber. Call once, before bootstrap.
pub fn init(level: Option<&str>) -> Result<(), LoggingError> {
    let filter = build_filter(level)?;

    LogTracer::init().map_err(|e| LoggingError::Bridge(e.to_string()))?;

    // stdout is reserved for command output
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::Subscriber(e.to_string()))?;

    tracing::debug!("Logging initialized");
    Ok(())
}
