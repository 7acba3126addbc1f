//! Upload module
//!
//! Receives multipart uploads, stores them under a flat directory and serves
//! them back by name.
//!
//! The client filename is untrusted twice over: [`sanitize`] strips it down
//! to a flat, portable name, and the [`store`] independently refuses any name
//! that would resolve outside its root.

use hyper::StatusCode;
use thiserror::Error;

pub mod handler;
pub mod multipart;
pub mod retrieve;
pub mod sanitize;
pub mod store;

pub use handler::handle_upload;
pub use retrieve::{download_path, handle_retrieve};
pub use store::{DirectoryStore, FileStore, StoreError, StoredFile};

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No file part")]
    NoFilePart,

    #[error("No selected file")]
    NoSelectedFile,

    #[error("Malformed multipart body: {0}")]
    MalformedMultipart(String),

    #[error("Upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UploadError {
    /// HTTP status reported to the client
    pub fn status_code(&self) -> StatusCode {
        match self {
            UploadError::NoFilePart
            | UploadError::NoSelectedFile
            | UploadError::MalformedMultipart(_) => StatusCode::BAD_REQUEST,
            UploadError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Store(StoreError::TraversalRejected(_)) => StatusCode::BAD_REQUEST,
            UploadError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the client; never carries paths or OS errors
    pub fn user_message(&self) -> &'static str {
        match self {
            UploadError::NoFilePart => "No file part",
            UploadError::NoSelectedFile => "No selected file",
            UploadError::MalformedMultipart(_) => "Malformed multipart body",
            UploadError::PayloadTooLarge { .. } => "File too large",
            UploadError::Store(StoreError::Unavailable { .. }) => "Upload storage unavailable",
            UploadError::Store(StoreError::TraversalRejected(_)) => "Invalid filename",
            UploadError::Store(_) => "Failed to save file",
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::NoFilePart => "no_file_part",
            UploadError::NoSelectedFile => "no_selected_file",
            UploadError::MalformedMultipart(_) => "malformed_multipart",
            UploadError::PayloadTooLarge { .. } => "payload_too_large",
            UploadError::Store(StoreError::Unavailable { .. }) => "store_unavailable",
            UploadError::Store(StoreError::TraversalRejected(_)) => "traversal_rejected",
            UploadError::Store(_) => "write_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_validation_errors_are_bad_request() {
        assert_eq!(UploadError::NoFilePart.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(UploadError::NoSelectedFile.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(UploadError::NoFilePart.user_message(), "No file part");
        assert_eq!(UploadError::NoSelectedFile.user_message(), "No selected file");
    }

    #[test]
    fn test_store_errors_hide_details() {
        let err = UploadError::from(StoreError::WriteFailed {
            name: "a.txt".into(),
            source: io::Error::other("disk full at /srv/secret"),
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.user_message(), "Failed to save file");
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_payload_too_large() {
        let err = UploadError::PayloadTooLarge { limit: 10 };
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.kind(), "payload_too_large");
    }
}
