//! `multipart/form-data` parsing
//!
//! Pulls the `file` part out of an upload request. Only parts that carry a
//! `filename` in their `Content-Disposition` count as file parts; a plain
//! form field that happens to be called `file` is ignored, the same way a
//! browser form without a file input would look.
//!
//! An RFC 5987 `filename*=UTF-8''...` parameter is decoded and takes
//! precedence over a plain `filename`, as RFC 6266 asks.

use super::UploadError;
use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::Request;
use multer::{Constraints, Multipart, SizeLimit};
use percent_encoding::percent_decode_str;
use tracing::debug;

/// Form field that carries the upload
pub const FILE_FIELD: &str = "file";

/// The file part of an upload request
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    /// Client-supplied filename, untrusted and possibly empty
    pub filename: String,
    pub data: Bytes,
}

/// Read the first `file` part from `req`.
///
/// Returns `Ok(None)` when the body is not multipart or has no file part.
/// The whole body is capped at `max_bytes`, checked against
/// `Content-Length` up front and again while streaming.
pub async fn read_file_part<B>(
    req: Request<B>,
    max_bytes: u64,
) -> Result<Option<FilePart>, UploadError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    let Some(boundary) = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| multer::parse_boundary(ct).ok())
    else {
        debug!("Upload request is not multipart/form-data");
        return Ok(None);
    };

    if let Some(declared) = declared_length(&req) {
        if declared > max_bytes {
            return Err(UploadError::PayloadTooLarge { limit: max_bytes });
        }
    }

    let constraints =
        Constraints::new().size_limit(SizeLimit::new().whole_stream(max_bytes));
    let stream = req.into_body().into_data_stream();
    let mut multipart = Multipart::with_constraints(stream, boundary, constraints);

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| map_multer_error(e, max_bytes))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(filename) = extended_file_name(field.headers())
            .or_else(|| field.file_name().map(str::to_string))
        else {
            continue;
        };

        let mut data = BytesMut::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| map_multer_error(e, max_bytes))?
        {
            data.extend_from_slice(&chunk);
        }

        debug!(filename = %filename, bytes = data.len(), "Read file part");
        return Ok(Some(FilePart {
            filename,
            data: data.freeze(),
        }));
    }

    Ok(None)
}

/// Decode `filename*=charset'lang'value` from the part's Content-Disposition.
fn extended_file_name(headers: &HeaderMap) -> Option<String> {
    let disposition = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    let value = disposition.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("filename*")
            .then(|| value.trim().trim_matches('"'))
    })?;

    let mut parts = value.splitn(3, '\'');
    let charset = parts.next()?;
    let _language = parts.next()?;
    let encoded = parts.next()?;

    let decoded = percent_decode_str(encoded);
    if charset.eq_ignore_ascii_case("UTF-8") {
        decoded.decode_utf8().ok().map(|name| name.into_owned())
    } else if charset.eq_ignore_ascii_case("ISO-8859-1") {
        Some(decoded.map(char::from).collect())
    } else {
        debug!(charset = %charset, "Unsupported filename* charset");
        None
    }
}

fn declared_length<B>(req: &Request<B>) -> Option<u64> {
    req.headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn map_multer_error(err: multer::Error, max_bytes: u64) -> UploadError {
    match err {
        multer::Error::StreamSizeExceeded { .. } | multer::Error::FieldSizeExceeded { .. } => {
            UploadError::PayloadTooLarge { limit: max_bytes }
        }
        other => UploadError::MalformedMultipart(other.to_string()),
    }
}
