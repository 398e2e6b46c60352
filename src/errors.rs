//! Gateway error types.
//!
//! [`ProxyError`] covers every terminal failure of the request pipeline
//! that happens before the body starts streaming.  It implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(ProxyError::NoSuchKey { .. })`.  None of the responses carry a
//! body.
//!
//! [`RelayError`] describes a transfer that was aborted after the
//! response headers were already sent; it is only logged.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures that end a request before streaming begins.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The root path never maps to an object.
    #[error("The root path does not name an object")]
    RootPath,

    /// The path's percent-escapes do not decode to UTF-8.
    #[error("The request path is not valid UTF-8 once decoded")]
    InvalidPath,

    /// The store has no object under the key.
    #[error("No object exists under key {key}")]
    NoSuchKey { key: String },

    /// Any other storage-layer failure.
    #[error("Fetching key {key} failed: {source}")]
    FetchFailed {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ProxyError {
    /// Return the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::RootPath => StatusCode::NOT_FOUND,
            ProxyError::InvalidPath => StatusCode::NOT_FOUND,
            ProxyError::NoSuchKey { .. } => StatusCode::NOT_FOUND,
            ProxyError::FetchFailed { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.status_code().into_response()
    }
}

/// A relay aborted mid-transfer.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Reading the object body failed.
    #[error("read failed after {transferred} bytes: {source}")]
    Read {
        transferred: u64,
        #[source]
        source: std::io::Error,
    },

    /// Writing to the response failed (usually a client disconnect).
    #[error("write failed after {transferred} bytes: {source}")]
    Write {
        transferred: u64,
        #[source]
        source: std::io::Error,
    },
}

impl RelayError {
    /// Bytes fully written to the response before the abort.
    pub fn transferred(&self) -> u64 {
        match self {
            RelayError::Read { transferred, .. } | RelayError::Write { transferred, .. } => {
                *transferred
            }
        }
    }

    /// Whether the response was dropped before a single byte reached it.
    ///
    /// This is what a `HEAD` request or a client that hung up before
    /// reading looks like, so it is not worth a warning.
    pub fn is_unread_disconnect(&self) -> bool {
        matches!(self, RelayError::Write { transferred: 0, .. })
    }

    /// Which side of the relay failed, for metric labels.
    pub fn stage(&self) -> &'static str {
        match self {
            RelayError::Read { .. } => "read",
            RelayError::Write { .. } => "write",
        }
    }
}
