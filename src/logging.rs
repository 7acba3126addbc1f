//! Tracing subscriber setup
//!
//! ```text
//! Registry
//!   ├── EnvFilter (RUST_LOG, else the configured level)
//!   └── Fmt layer (pretty or JSON)
//! ```

use crate::config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Logging initialization errors
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{0}'")]
    InvalidFilter(String),

    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    AlreadyInitialized(String),
}

/// Build the filter: `RUST_LOG` wins, otherwise `level`.
pub fn env_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => {
            EnvFilter::try_new(level).map_err(|_| LoggingError::InvalidFilter(level.to_string()))
        }
    }
}

/// Install the global subscriber described by `config`
pub fn init_subscriber(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = env_filter(&config.level)?;
    let set_global = |e: tracing::subscriber::SetGlobalDefaultError| {
        LoggingError::AlreadyInitialized(e.to_string())
    };

    if config.format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber).map_err(set_global)?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true);

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber).map_err(set_global)?;
    }

    Ok(())
}
