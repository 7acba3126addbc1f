//! Configuration module for fileshelf
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. Every section is optional;
//! a missing file section falls back to the defaults below.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Parsed listen address of the upload server
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.address.parse().map_err(|e| {
            ConfigError::ValidationError(format!(
                "Invalid server address '{}': {}",
                self.server.address, e
            ))
        })
    }

    /// Resolve a relative store root against `base`.
    ///
    /// Absolute roots are left untouched.
    pub fn resolve_store_root(&mut self, base: &Path) {
        if self.store.root.is_relative() {
            self.store.root = base.join(&self.store.root);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.store.root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "store.root cannot be empty".into(),
            ));
        }

        if self.store.max_upload_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "store.max_upload_bytes must be greater than zero".into(),
            ));
        }

        if self.metrics.enabled && self.metrics.address.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "Invalid metrics address '{}'",
                self.metrics.address
            )));
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid logging format '{}': must be 'pretty' or 'json'",
                    other
                )))
            }
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_server_address(),
        }
    }
}

fn default_server_address() -> String {
    "127.0.0.1:5000".to_string()
}

/// Upload store configuration
///
/// ```yaml
/// store:
///   root: "${UPLOAD_DIR:-uploads}"
///   max_upload_bytes: 16777216
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding uploaded files. Created on startup if absent.
    #[serde(default = "default_store_root")]
    pub root: PathBuf,

    /// Upper bound on the size of a whole upload request body. Default: 16 MiB
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_store_root() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_upload_bytes() -> u64 {
    16 * 1024 * 1024 // 16MB
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "127.0.0.1:9090".to_string()
}

/// Logging configuration.
///
/// `RUST_LOG`, when set, takes precedence over `level`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive. Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "pretty" or "json". Default: "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
