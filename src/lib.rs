//! fileshelf library
//!
//! A small HTTP service that accepts multipart file uploads, stores them in a
//! flat directory and serves them back by name.
//!
//! # Features
//!
//! - **Safe names**: client filenames are sanitized before they touch disk
//! - **Contained reads**: the store refuses anything resolving outside its root
//! - **Atomic writes**: temp file + rename, readers never see partial files
//! - **Observability**: `tracing` spans per request, Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use fileshelf::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("fileshelf.yaml")?;
//!     let server = Server::bind(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod logging;
pub mod metrics;
pub mod profiles;
pub mod router;
pub mod server;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
