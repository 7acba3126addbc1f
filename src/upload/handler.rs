//! `POST /upload`
//!
//! Single pass, no retries:
//!
//! ```text
//! read file part ──none──────────────► 400 No file part
//!      │
//!      ├─ filename "" ───────────────► 400 No selected file
//!      ▼
//! sanitize ──empty───────────────────► 400 No selected file
//!      ▼
//! ensure_root ──err──────────────────► 500
//!      ▼
//! write ──err────────────────────────► 500
//!      ▼
//! 200 File uploaded successfully
//! ```
//!
//! Nothing touches the store before validation has passed, so error paths
//! write nothing.

use super::multipart::read_file_part;
use super::sanitize::sanitize;
use super::store::{FileStore, StoredFile};
use super::UploadError;
use crate::metrics;
use crate::server::response::{self, Body};
use bytes::Bytes;
use hyper::body::Body as HttpBody;
use hyper::header::ETAG;
use hyper::{Request, Response, StatusCode};
use std::time::Instant;
use tracing::{error, info, warn};

/// Success message returned to the client
pub const UPLOAD_OK_MESSAGE: &str = "File uploaded successfully";

/// Handle an upload request and turn the outcome into a JSON response.
pub async fn handle_upload<B>(
    req: Request<B>,
    store: &dyn FileStore,
    max_upload_bytes: u64,
) -> Response<Body>
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    let started = Instant::now();
    let outcome = upload(req, store, max_upload_bytes).await;
    metrics::record_upload_duration(started.elapsed().as_secs_f64());

    match outcome {
        Ok(stored) => {
            info!(
                file = %stored.name,
                bytes = stored.size_bytes,
                sha256 = %stored.content_hash,
                "Upload stored"
            );
            metrics::record_upload_success(stored.size_bytes);

            let mut response = response::json(
                StatusCode::OK,
                &serde_json::json!({ "message": UPLOAD_OK_MESSAGE }),
            );
            if let Ok(etag) = format!("\"{}\"", stored.content_hash).parse() {
                response.headers_mut().insert(ETAG, etag);
            }
            response
        }
        Err(e) => {
            let status = e.status_code();
            if status.is_server_error() {
                error!(error = %e, "Upload failed");
            } else {
                warn!(error = %e, "Upload rejected");
            }
            metrics::record_upload_failure(e.kind());
            response::json_error(status, e.user_message())
        }
    }
}

/// Validate, sanitize and persist the file part of `req`.
pub async fn upload<B>(
    req: Request<B>,
    store: &dyn FileStore,
    max_upload_bytes: u64,
) -> Result<StoredFile, UploadError>
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    let part = read_file_part(req, max_upload_bytes)
        .await?
        .ok_or(UploadError::NoFilePart)?;

    if part.filename.is_empty() {
        return Err(UploadError::NoSelectedFile);
    }

    let name = sanitize(&part.filename);
    if name.is_empty() {
        warn!(raw = %part.filename, "Filename sanitized to nothing");
        return Err(UploadError::NoSelectedFile);
    }

    store.ensure_root().await?;
    let stored = store.write(&name, part.data).await?;
    Ok(stored)
}
