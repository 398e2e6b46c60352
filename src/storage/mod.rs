//! Object sources.
//!
//! The [`fetcher::ObjectFetcher`] trait is the only way the request
//! pipeline learns about objects.  Implementations include an AWS S3
//! client bound to one bucket and an in-memory map.

pub mod fetcher;
pub mod memory;
pub mod s3;
