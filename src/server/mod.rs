//! HTTP server module
//!
//! A hyper HTTP/1.1 server on tokio: one task per connection, requests
//! dispatched through [`Route::parse`] to the upload, retrieval and profile
//! handlers.
//!
//! ```no_run
//! use fileshelf::{config::Config, server::Server};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = Server::bind(Config::default()).await?;
//! println!("Listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod http_tracing;
pub mod response;

use crate::config::Config;
use crate::profiles;
use crate::router::{Route, RouterError};
use crate::upload::{self, DirectoryStore, FileStore};
use bytes::Bytes;
use hyper::body::Body as HttpBody;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use response::Body;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, Instrument};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Upload store error: {0}")]
    Store(#[from] upload::StoreError),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// State shared by every request
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn FileStore>,
}

impl AppState {
    /// State backed by a [`DirectoryStore`] at `config.store.root`
    pub fn new(config: Config) -> Self {
        let store = Arc::new(DirectoryStore::new(config.store.root.clone()));
        Self { config, store }
    }

    pub fn with_store(config: Config, store: Arc<dyn FileStore>) -> Self {
        Self { config, store }
    }
}

/// HTTP Server
pub struct Server {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Provision the upload directory and bind the listener.
    ///
    /// Port 0 lets the OS pick a port; see [`Server::local_addr`].
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        Self::bind_with_state(AppState::new(config)).await
    }

    /// Bind with a caller-supplied state, e.g. a different store backend
    pub async fn bind_with_state(state: AppState) -> Result<Self, ServerError> {
        let addr = state
            .config
            .socket_addr()
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        // One-time provisioning; requests only hit the cheap fast path.
        state.store.ensure_root().await?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!(
            "Server bound to {}, storing uploads in {}",
            local_addr,
            state.config.store.root.display()
        );

        Ok(Self {
            state: Arc::new(state),
            listener,
            local_addr,
        })
    }

    /// The address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        };
        self.run_until(ctrl_c).await
    }

    /// Serve until `shutdown` completes.
    ///
    /// Stops accepting new connections; connections already accepted keep
    /// running on their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Accepting connections on {}", self.local_addr);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down server");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    self.spawn_connection(stream, peer_addr);
                }
            }
        }
    }

    fn spawn_connection(&self, stream: tokio::net::TcpStream, peer_addr: SocketAddr) {
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| {
                let state = Arc::clone(&state);
                async move { Ok::<_, Infallible>(handle_request(req, state).await) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving connection from {}: {}", peer_addr, e);
            }
        });
    }
}

/// Route and handle one request.
///
/// Generic over the body so the whole pipeline can be driven in-process.
pub async fn handle_request<B>(req: Request<B>, state: Arc<AppState>) -> Response<Body>
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    let span = http_tracing::request_span(req.method(), req.uri().path());

    async move {
        let response = dispatch(req, &state).await;
        http_tracing::record_status(&tracing::Span::current(), response.status());
        response
    }
    .instrument(span)
    .await
}

async fn dispatch<B>(req: Request<B>, state: &AppState) -> Response<Body>
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    let is_head = req.method() == Method::HEAD;
    let route = match Route::parse(req.method(), req.uri().path()) {
        Ok(route) => route,
        Err(RouterError::NotFound(path)) => {
            debug!("No route for {}", path);
            return response::not_found();
        }
        Err(RouterError::MethodNotAllowed { allow, .. }) => {
            return response::method_not_allowed(allow);
        }
    };

    let reply = match route {
        Route::Index => response::text(StatusCode::OK, "Index Page"),
        Route::Health => response::text(StatusCode::OK, "ok"),
        Route::Upload => {
            upload::handle_upload(req, state.store.as_ref(), state.config.store.max_upload_bytes)
                .await
        }
        Route::Retrieve { name } => upload::handle_retrieve(&name, state.store.as_ref()).await,
        Route::CurrentUser => response::json(StatusCode::OK, &profiles::current_user()),
        Route::Users => response::json(StatusCode::OK, &profiles::all_users()),
    };

    if is_head {
        response::head(reply)
    } else {
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Full};

    fn test_config(root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.server.address = "127.0.0.1:0".into();
        config.store.root = root.to_path_buf();
        config
    }

    fn request(method: &str, path: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn get(path: &str) -> Request<Full<Bytes>> {
        request("GET", path)
    }

    #[tokio::test]
    async fn test_server_bind_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        let server = Server::bind(test_config(&root)).await.unwrap();

        assert!(root.is_dir());
        assert_eq!(server.local_addr().ip().to_string(), "127.0.0.1");
        assert!(server.local_addr().port() > 0);
    }

    #[tokio::test]
    async fn test_server_invalid_address() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.server.address = "invalid".into();
        assert!(matches!(
            Server::bind(config).await,
            Err(ServerError::BindError(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_fixed_routes() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(AppState::new(test_config(dir.path())));

        let response = handle_request(get("/health"), Arc::clone(&state)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = handle_request(get("/me"), Arc::clone(&state)).await;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let me: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(me["image"], "/uploads/S.png");

        let response = handle_request(get("/nope"), Arc::clone(&state)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = handle_request(get("/upload"), state).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_head_on_stored_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(AppState::new(test_config(dir.path())));
        state
            .store
            .write("a_b.txt", Bytes::from_static(b"stored"))
            .await
            .unwrap();

        let head = request("HEAD", "/uploads/a_b.txt");
        let response = handle_request(head, Arc::clone(&state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("content-length").unwrap(), "6");
        assert_eq!(response.headers().get("content-type").unwrap(), "text/plain");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());

        let head = request("HEAD", "/uploads/missing.txt");
        let response = handle_request(head, Arc::clone(&state)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = handle_request(request("PUT", "/users"), state).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get("allow").unwrap(), "GET, HEAD");
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let server = Server::bind(test_config(dir.path())).await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();

        assert!(handle.await.unwrap().is_ok());
    }
}
