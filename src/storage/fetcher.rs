//! Abstract object fetch capability.
//!
//! Every object source must implement [`ObjectFetcher`].  The trait is
//! deliberately narrow: a single lookup by key within a bucket that the
//! implementation was configured with at construction time.  Callers see
//! a tagged [`FetchOutcome`] and never inspect the underlying transport.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::SystemTime;

use tokio::io::AsyncRead;

/// Attributes reported by the store for a single object.
///
/// Every field is independently optional; presence is decided by the
/// store per object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// MIME type of the object, as stored.
    pub content_type: Option<String>,
    /// Size of the object body in bytes.
    pub content_length: Option<u64>,
    /// Explicit `Content-Disposition` stored with the object.
    pub content_disposition: Option<String>,
    /// Last modification time of the object.
    pub last_modified: Option<SystemTime>,
}

/// Exclusively owned byte stream of an object body.
///
/// Dropping the value closes the underlying stream.  Ownership moves from
/// the fetcher to whoever relays the body, so the stream is released
/// exactly once regardless of how the request ends.
pub struct ObjectBody {
    reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl ObjectBody {
    /// Wrap any async reader as an object body.
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            reader: Box::pin(reader),
        }
    }

    /// Borrow the reader for polling.
    pub(crate) fn reader(&mut self) -> Pin<&mut (dyn AsyncRead + Send + 'static)> {
        self.reader.as_mut()
    }
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody").finish_non_exhaustive()
    }
}

/// Result of a single fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The object exists; its metadata and an open body stream.
    Found(ObjectMetadata, ObjectBody),
    /// The store reports that no object exists under the key.
    NotFound,
    /// Any other storage failure (network, auth, malformed response).
    Failed(anyhow::Error),
}

/// Async object lookup contract.
///
/// Implementations are built once at startup and shared by every request,
/// so they must be safe to call concurrently.
pub trait ObjectFetcher: Send + Sync + 'static {
    /// Fetch the object stored under `key`.
    fn fetch(&self, key: &str) -> Pin<Box<dyn Future<Output = FetchOutcome> + Send + '_>>;
}
