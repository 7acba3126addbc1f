//! Prometheus scrape endpoint
//!
//! Runs on its own listener so scrapes never compete with uploads.
//!
//! ```no_run
//! use fileshelf::metrics::server::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MetricsServer::bind("127.0.0.1:9090").await?;
//! println!("Metrics on http://{}/metrics", server.local_addr());
//! let handle = server.spawn();
//! // ...
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::server::response::{self, Body};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Metrics server error
#[derive(Debug, thiserror::Error)]
pub enum MetricsServerError {
    #[error("Failed to bind metrics listener on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Bound, not yet running metrics server
pub struct MetricsServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl MetricsServer {
    /// Bind the scrape listener. Port 0 picks a free port.
    pub async fn bind(address: &str) -> Result<Self, MetricsServerError> {
        let bind_err = |source| MetricsServerError::Bind {
            address: address.to_string(),
            source,
        };
        let listener = TcpListener::bind(address).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve in a background task until the returned handle is shut down.
    pub fn spawn(self) -> MetricsHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        info!("Metrics server listening on {}", self.local_addr);
        let task = tokio::spawn(accept_loop(self.listener, shutdown_rx));
        MetricsHandle { shutdown_tx, task }
    }
}

/// Handle to a running metrics server
pub struct MetricsHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl MetricsHandle {
    /// Stop accepting scrapes and wait for the accept loop to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }
}

async fn accept_loop(listener: TcpListener, mut shutdown_rx: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            accepted = listener.accept() => {
                let Ok((stream, peer)) = accepted else { continue };
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(io, service_fn(route))
                        .await
                    {
                        debug!("Metrics connection from {} ended: {}", peer, e);
                    }
                });
            }
        }
    }
}

async fn route(req: Request<hyper::body::Incoming>) -> Result<Response<Body>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => render(),
        (&Method::GET, "/health") => response::text(StatusCode::OK, "ok"),
        _ => response::not_found(),
    };
    Ok(response)
}

/// Encode the default registry in the Prometheus text format
fn render() -> Response<Body> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return response::text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut response = response::text(StatusCode::OK, buffer);
    if let Ok(content_type) = encoder.format_type().parse() {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, content_type);
    }
    response
}
