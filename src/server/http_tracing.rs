//! HTTP request spans
//!
//! Every request runs inside an `http.request` span. The status code is
//! recorded on the span once the response is known.

use hyper::{Method, StatusCode};
use tracing::field::Empty;
use tracing::Span;

/// Create the span for one request
pub fn request_span(method: &Method, path: &str) -> Span {
    tracing::info_span!(
        "http.request",
        http.method = %method,
        http.target = %path,
        http.status_code = Empty,
    )
}

/// Record the final status on `span` and log the completed request
pub fn record_status(span: &Span, status: StatusCode) {
    span.record("http.status_code", status.as_u16());

    if status.is_server_error() {
        tracing::error!(parent: span, status = status.as_u16(), "Request failed");
    } else {
        tracing::info!(parent: span, status = status.as_u16(), "Request completed");
    }
}
