//! fileshelf - multipart upload server backed by a local directory

use clap::Parser;
use fileshelf::metrics::server::MetricsServer;
use fileshelf::{config::Config, logging, server::Server};
use std::path::PathBuf;
use tracing::info;

/// fileshelf - upload files over HTTP and serve them back by name
#[derive(Parser, Debug)]
#[command(name = "fileshelf")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file (defaults apply without one)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter directive, overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Listen address, overrides `server.address`
    #[arg(short, long)]
    address: Option<String>,

    /// Upload directory, overrides `store.root`
    #[arg(short, long)]
    upload_dir: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(address) = self.address {
            config.server.address = address;
        }
        if let Some(dir) = self.upload_dir {
            config.store.root = dir;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;

    logging::init_subscriber(&config.logging)?;
    info!("Starting fileshelf v{}", fileshelf::VERSION);

    let metrics = if config.metrics.enabled {
        let server = MetricsServer::bind(&config.metrics.address).await?;
        Some(server.spawn())
    } else {
        None
    };

    let server = Server::bind(config).await?;
    server.run().await?;

    if let Some(handle) = metrics {
        handle.shutdown().await;
    }

    Ok(())
}
