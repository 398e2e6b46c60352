//! Shared test utilities: object fetchers and I/O doubles.

use std::future::Future;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::storage::fetcher::{FetchOutcome, ObjectBody, ObjectFetcher, ObjectMetadata};

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = 0xDEAD_BEEF;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// Reader that bumps a shared counter when dropped.
pub struct DropCounting<R> {
    inner: R,
    drops: Arc<AtomicUsize>,
}

impl<R> DropCounting<R> {
    pub fn new(inner: R, drops: Arc<AtomicUsize>) -> Self {
        Self { inner, drops }
    }
}

impl<R> Drop for DropCounting<R> {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for DropCounting<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// Reader that yields `data` and then fails instead of reaching EOF.
pub struct FailingReader {
    data: Cursor<Vec<u8>>,
}

impl FailingReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Cursor::new(data),
        }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let remaining = self.data.get_ref().len() as u64 - self.data.position();
        if remaining == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "upstream connection reset",
            )));
        }
        Pin::new(&mut self.data).poll_read(cx, buf)
    }
}

/// Writer that accepts at most `max_per_call` bytes per write.
#[derive(Debug, Default)]
pub struct TrickleWriter {
    pub written: Vec<u8>,
    pub max_per_call: usize,
    pub calls: usize,
}

impl TrickleWriter {
    pub fn new(max_per_call: usize) -> Self {
        Self {
            written: Vec::new(),
            max_per_call,
            calls: 0,
        }
    }
}

impl AsyncWrite for TrickleWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let n = buf.len().min(self.max_per_call);
        self.written.extend_from_slice(&buf[..n]);
        self.calls += 1;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Writer that accepts `capacity` bytes, then fails with `BrokenPipe`
/// (or returns `Ok(0)` when `zero_on_full` is set).
#[derive(Debug, Default)]
pub struct BrokenWriter {
    pub written: Vec<u8>,
    pub capacity: usize,
    pub zero_on_full: bool,
}

impl AsyncWrite for BrokenWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let room = self.capacity - self.written.len();
        if room == 0 {
            if self.zero_on_full {
                return Poll::Ready(Ok(0));
            }
            return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        let n = buf.len().min(room);
        self.written.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// What a [`ScriptedFetcher`] should answer.
#[derive(Debug, Clone)]
pub enum Script {
    Found(ObjectMetadata, Vec<u8>),
    /// Found, but the body fails after yielding the bytes.
    Truncated(ObjectMetadata, Vec<u8>),
    NotFound,
    Failed(String),
}

/// Fetcher that records every requested key, answers from a script and
/// counts how many body streams it handed out were closed.
pub struct ScriptedFetcher {
    script: Script,
    pub keys: Mutex<Vec<String>>,
    pub drops: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            keys: Mutex::new(Vec::new()),
            drops: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }

    pub fn closed_bodies(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

impl ObjectFetcher for ScriptedFetcher {
    fn fetch(&self, key: &str) -> Pin<Box<dyn Future<Output = FetchOutcome> + Send + '_>> {
        self.keys.lock().unwrap().push(key.to_string());
        let outcome = match &self.script {
            Script::Found(meta, data) => FetchOutcome::Found(
                meta.clone(),
                ObjectBody::new(DropCounting::new(
                    Cursor::new(data.clone()),
                    self.drops.clone(),
                )),
            ),
            Script::Truncated(meta, data) => FetchOutcome::Found(
                meta.clone(),
                ObjectBody::new(DropCounting::new(
                    FailingReader::new(data.clone()),
                    self.drops.clone(),
                )),
            ),
            Script::NotFound => FetchOutcome::NotFound,
            Script::Failed(msg) => FetchOutcome::Failed(anyhow::anyhow!("{msg}")),
        };
        Box::pin(async move { outcome })
    }
}
