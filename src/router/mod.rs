//! Request router
//!
//! Maps an HTTP method and path onto a [`Route`]. The route table is small
//! and fixed, so it is a plain match rather than a trie. Every `GET` route
//! also answers `HEAD`.

use crate::upload::retrieve::DOWNLOAD_PREFIX;
use hyper::Method;
use percent_encoding::percent_decode_str;
use thiserror::Error;

/// Router errors
#[derive(Error, Debug, PartialEq)]
pub enum RouterError {
    #[error("No route for path: {0}")]
    NotFound(String),

    #[error("Method {method} not allowed for {path}")]
    MethodNotAllowed {
        method: String,
        path: String,
        /// Value for the `Allow` response header
        allow: &'static str,
    },
}

// `Allow` values, also the set of methods each route accepts
const READ: &str = "GET, HEAD";
const WRITE: &str = "POST";

/// Routes served by the application
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// GET /
    Index,
    /// GET /health
    Health,
    /// POST /upload
    Upload,
    /// GET /uploads/{name}
    Retrieve { name: String },
    /// GET /me
    CurrentUser,
    /// GET /users
    Users,
}

impl Route {
    /// Resolve `method` + `path` to a route
    pub fn parse(method: &Method, path: &str) -> Result<Route, RouterError> {
        let (route, allow) = match path {
            "/" => (Route::Index, READ),
            "/health" => (Route::Health, READ),
            "/upload" => (Route::Upload, WRITE),
            "/me" => (Route::CurrentUser, READ),
            "/users" => (Route::Users, READ),
            _ => match path.strip_prefix(DOWNLOAD_PREFIX) {
                Some(segment) => (
                    Route::Retrieve {
                        name: Self::decode_segment(path, segment)?,
                    },
                    READ,
                ),
                None => return Err(RouterError::NotFound(path.to_string())),
            },
        };

        if !allow.split(", ").any(|m| m == method.as_str()) {
            return Err(RouterError::MethodNotAllowed {
                method: method.to_string(),
                path: path.to_string(),
                allow,
            });
        }

        Ok(route)
    }

    /// Percent-decode a single path segment. Sub-paths are not routes.
    fn decode_segment(path: &str, segment: &str) -> Result<String, RouterError> {
        let not_found = || RouterError::NotFound(path.to_string());

        if segment.is_empty() || segment.contains('/') {
            return Err(not_found());
        }

        percent_decode_str(segment)
            .decode_utf8()
            .map(|name| name.into_owned())
            .map_err(|_| not_found())
    }
}
