//! Metrics module
//!
//! Prometheus counters and histograms for the upload and retrieval paths,
//! registered in the default registry and scraped through [`server`].

pub mod server;

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Histogram,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "fileshelf_uploads_total",
        "Total number of upload requests",
        &["status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "fileshelf_upload_bytes_total",
        "Total bytes stored"
    ).unwrap();

    pub static ref UPLOAD_DURATION: Histogram = register_histogram!(
        "fileshelf_upload_duration_seconds",
        "Upload duration in seconds",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    // Retrieval metrics
    pub static ref RETRIEVALS_TOTAL: CounterVec = register_counter_vec!(
        "fileshelf_retrievals_total",
        "Total number of file retrievals",
        &["status"]  // "found", "not_found" or "error"
    ).unwrap();

    pub static ref RETRIEVAL_BYTES_TOTAL: Counter = register_counter!(
        "fileshelf_retrieval_bytes_total",
        "Total bytes served"
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "fileshelf_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record a successful upload
pub fn record_upload_success(bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&["success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload, labelled by error kind
pub fn record_upload_failure(kind: &str) {
    UPLOADS_TOTAL.with_label_values(&["failure"]).inc();
    record_error(kind);
}

/// Record upload duration
pub fn record_upload_duration(duration_secs: f64) {
    UPLOAD_DURATION.observe(duration_secs);
}

/// Record a served file
pub fn record_retrieval_found(bytes: u64) {
    RETRIEVALS_TOTAL.with_label_values(&["found"]).inc();
    RETRIEVAL_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a retrieval that answered 404
pub fn record_retrieval_not_found() {
    RETRIEVALS_TOTAL.with_label_values(&["not_found"]).inc();
}

/// Record a retrieval that failed on I/O
pub fn record_retrieval_error() {
    RETRIEVALS_TOTAL.with_label_values(&["error"]).inc();
    record_error("read_failed");
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}
