//! s3proxy library -- an anonymous HTTP gateway in front of one S3 bucket.
//!
//! Every request path is looked up as an object key in a single,
//! preconfigured bucket.  The matched object is streamed back with
//! standard caching (`Last-Modified` / `If-Modified-Since`) and download
//! disposition headers.  Callers never see storage credentials.

use std::sync::Arc;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::Config;
use crate::storage::fetcher::ObjectFetcher;

/// Shared application state passed to all handlers via `axum::extract::State`.
///
/// Built once at startup; nothing in it is mutated by requests.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Object source bound to the configured bucket.
    pub fetcher: Arc<dyn ObjectFetcher>,
}
