//! `GET /uploads/{filename}`

use super::store::{FileStore, StoreError};
use crate::metrics;
use crate::server::response::{self, Body};
use hyper::{Response, StatusCode};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{debug, error};

/// URL prefix the stored files are served under
pub const DOWNLOAD_PREFIX: &str = "/uploads/";

// Unreserved characters (RFC 3986) stay as-is.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// URL path that serves the stored file `name`
pub fn download_path(name: &str) -> String {
    format!(
        "{}{}",
        DOWNLOAD_PREFIX,
        utf8_percent_encode(name, PATH_SEGMENT)
    )
}

/// Serve the file stored under `name`.
///
/// `name` is the already percent-decoded path segment and is handed to the
/// store as-is; the store's own containment check is the only guard here.
/// A rejected traversal answers exactly like a missing file.
pub async fn handle_retrieve(name: &str, store: &dyn FileStore) -> Response<Body> {
    match store.read(name).await {
        Ok(data) => {
            let content_type = mime_guess::from_path(name).first_or_octet_stream();
            debug!(file = %name, bytes = data.len(), content_type = %content_type, "Serving file");
            metrics::record_retrieval_found(data.len() as u64);
            response::bytes(content_type.as_ref(), data)
        }
        Err(StoreError::NotFound(_)) => {
            debug!(file = %name, "Requested file not found");
            metrics::record_retrieval_not_found();
            response::not_found()
        }
        Err(StoreError::TraversalRejected(_)) => {
            debug!(file = %name, "Requested name rejected");
            metrics::record_retrieval_not_found();
            metrics::record_error("traversal_rejected");
            response::not_found()
        }
        Err(e) => {
            error!(file = %name, error = %e, "Failed to read stored file");
            metrics::record_retrieval_error();
            response::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}
