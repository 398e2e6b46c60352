//! Object GET pipeline.
//!
//! A request flows through key derivation, the fetch, the conditional
//! check and header synthesis, and then hands the body to the relay:
//!
//! ```text
//! route_key -> fetch -> evaluate_conditional -> synthesize_headers -> relay
//!     |          |  \            |
//!    404        404  502        304
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::header::{
    CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, IF_MODIFIED_SINCE, LAST_MODIFIED,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use percent_encoding::percent_decode_str;
use tracing::{debug, error, warn};

use crate::errors::ProxyError;
use crate::metrics::FETCH_TOTAL;
use crate::relay;
use crate::storage::fetcher::{FetchOutcome, ObjectMetadata};
use crate::AppState;

/// Objects at or above this size get `content-disposition: attachment`
/// unless the store supplies a disposition.
pub const ATTACHMENT_THRESHOLD: u64 = 50 * 1024 * 1024;

// -- Routing ------------------------------------------------------------------

/// Derive the object key from a request path.
///
/// The path is percent-decoded once and otherwise used verbatim,
/// including its leading `/` and original casing.  The root path is
/// rejected, and so is a path whose escapes decode to invalid UTF-8
/// (e.g. `/%FF`): no key can name it.
pub fn route_key(raw_path: &str) -> Result<String, ProxyError> {
    let key = percent_decode_str(raw_path)
        .decode_utf8()
        .map_err(|_| ProxyError::InvalidPath)?
        .into_owned();
    if key == "/" {
        return Err(ProxyError::RootPath);
    }
    Ok(key)
}

// -- Conditional GET ----------------------------------------------------------

/// Result of evaluating `If-Modified-Since`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conditional {
    /// Send the object.
    Proceed,
    /// The client's copy is current; answer 304.
    NotModified,
}

/// Decide whether the client's cached copy is still current.
///
/// A missing or unparsable header, or an object without a modification
/// time, always proceeds.  HTTP dates carry whole seconds, so the object
/// time is truncated to seconds before comparing.
pub fn evaluate_conditional(
    last_modified: Option<SystemTime>,
    if_modified_since: Option<&str>,
) -> Conditional {
    let (Some(object_time), Some(raw)) = (last_modified, if_modified_since) else {
        return Conditional::Proceed;
    };
    let Ok(client_time) = httpdate::parse_http_date(raw) else {
        return Conditional::Proceed;
    };
    if client_time >= truncate_to_secs(object_time) {
        Conditional::NotModified
    } else {
        Conditional::Proceed
    }
}

fn truncate_to_secs(t: SystemTime) -> SystemTime {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => UNIX_EPOCH + Duration::from_secs(d.as_secs()),
        Err(_) => t,
    }
}

// -- Header synthesis ---------------------------------------------------------

/// Derive the outbound headers from object metadata.
///
/// Each header is emitted only when its source field is present, except
/// `content-disposition`, which falls back to `attachment` for objects of
/// [`ATTACHMENT_THRESHOLD`] bytes or more.  Values the store returns that
/// are not valid header values are dropped with a warning.
pub fn synthesize_headers(meta: &ObjectMetadata) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Some(ref ct) = meta.content_type {
        insert_header(&mut headers, CONTENT_TYPE, ct);
    }
    if let Some(len) = meta.content_length {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }
    match meta.content_disposition {
        Some(ref disp) => insert_header(&mut headers, CONTENT_DISPOSITION, disp),
        None => {
            if meta.content_length.is_some_and(|len| len >= ATTACHMENT_THRESHOLD) {
                headers.insert(CONTENT_DISPOSITION, HeaderValue::from_static("attachment"));
            }
        }
    }
    if let Some(lm) = meta.last_modified {
        insert_last_modified(&mut headers, lm);
    }

    headers
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(val) => {
            headers.insert(name, val);
        }
        Err(_) => warn!("Dropping invalid {} value from object metadata", name),
    }
}

fn insert_last_modified(headers: &mut HeaderMap, lm: SystemTime) {
    if let Ok(val) = HeaderValue::from_str(&httpdate::fmt_http_date(lm)) {
        headers.insert(LAST_MODIFIED, val);
    }
}

// -- Handler ------------------------------------------------------------------

/// Serve the object stored under `key`.
///
/// Returns a 200 response whose body streams the object, a bodiless 304
/// when the client's copy is current, or a [`ProxyError`].  The fetched
/// body stream is closed on every path: by the relay once it finishes, or
/// on return here when the request ends early.
pub async fn get_object(
    state: Arc<AppState>,
    key: String,
    headers: &HeaderMap,
) -> Result<Response, ProxyError> {
    let (metadata, body) = match state.fetcher.fetch(&key).await {
        FetchOutcome::Found(metadata, body) => {
            counter!(FETCH_TOTAL, "outcome" => "found").increment(1);
            (metadata, body)
        }
        FetchOutcome::NotFound => {
            counter!(FETCH_TOTAL, "outcome" => "not_found").increment(1);
            debug!(operation = "fetch", key = %key, "object not found");
            return Err(ProxyError::NoSuchKey { key });
        }
        FetchOutcome::Failed(source) => {
            counter!(FETCH_TOTAL, "outcome" => "failed").increment(1);
            let cause = format!("{source:#}");
            error!(operation = "fetch", key = %key, error = %cause, "fetch failed");
            return Err(ProxyError::FetchFailed { key, source });
        }
    };

    let if_modified_since = headers
        .get(IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok());

    if evaluate_conditional(metadata.last_modified, if_modified_since) == Conditional::NotModified
    {
        drop(body);
        debug!(key = %key, "not modified");
        let mut response = StatusCode::NOT_MODIFIED.into_response();
        if let Some(lm) = metadata.last_modified {
            insert_last_modified(response.headers_mut(), lm);
        }
        return Ok(response);
    }

    let mut response = Response::new(relay::stream_body(body, key));
    *response.headers_mut() = synthesize_headers(&metadata);
    Ok(response)
}

// -- Unit tests ---------------------------------------------------------------
