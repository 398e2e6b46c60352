//! In-memory object fetcher.
//!
//! Objects are held in a `std::sync::RwLock<HashMap<...>>` keyed by the
//! exact object key.  Useful for embedding the gateway without a network
//! store and for exercising the request pipeline in tests.

use std::collections::HashMap;
use std::future::Future;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::RwLock;

use bytes::Bytes;

use super::fetcher::{FetchOutcome, ObjectBody, ObjectFetcher, ObjectMetadata};

/// In-memory fetcher.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    /// key -> (metadata, data).
    objects: RwLock<HashMap<String, (ObjectMetadata, Bytes)>>,
}

impl MemoryFetcher {
    /// Create an empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under `key` with the given metadata, replacing any
    /// previous object.
    pub fn insert(&self, key: impl Into<String>, metadata: ObjectMetadata, data: impl Into<Bytes>) {
        let mut objects = self
            .objects
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        objects.insert(key.into(), (metadata, data.into()));
    }
}

impl ObjectFetcher for MemoryFetcher {
    fn fetch(&self, key: &str) -> Pin<Box<dyn Future<Output = FetchOutcome> + Send + '_>> {
        let found = self
            .objects
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned();
        Box::pin(async move {
            match found {
                Some((metadata, data)) => {
                    FetchOutcome::Found(metadata, ObjectBody::new(Cursor::new(data)))
                }
                None => FetchOutcome::NotFound,
            }
        })
    }
}
