//! Streaming byte relay from an object body to the HTTP response.
//!
//! [`relay`] copies an [`ObjectBody`] into any [`AsyncWrite`] through a
//! fixed 16 KiB buffer.  Each chunk is written with repeated `write`
//! calls until the writer has accepted all of it, so writers that take
//! partial writes are fine.  The first read or write error aborts the
//! transfer; nothing is retried and nothing already sent is undone.
//!
//! [`stream_body`] wires the relay to hyper: the relay runs in its own
//! task and writes into one half of an in-memory pipe whose other half
//! becomes the response body.  When the client goes away the pipe's read
//! half is dropped and the next write fails, which is how a disconnect is
//! discovered.

use std::io;

use axum::body::Body;
use futures::StreamExt;
use metrics::counter;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::errors::RelayError;
use crate::metrics::{BYTES_SENT_TOTAL, RELAY_ABORTS_TOTAL};
use crate::storage::fetcher::ObjectBody;

/// Size of the intermediate copy buffer.
pub const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Copy `body` into `writer` until end of input.
///
/// Returns the number of bytes written.  `body` is consumed and closed on
/// every path.  A writer that accepts zero bytes is treated as a
/// [`io::ErrorKind::WriteZero`] write failure.
pub async fn relay<W>(mut body: ObjectBody, writer: &mut W) -> Result<u64, RelayError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut transferred: u64 = 0;

    loop {
        let read_n = match body.reader().read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(source) => return Err(RelayError::Read { transferred, source }),
        };

        let mut written = 0;
        while written < read_n {
            match writer.write(&buf[written..read_n]).await {
                Ok(0) => {
                    return Err(RelayError::Write {
                        transferred,
                        source: io::Error::from(io::ErrorKind::WriteZero),
                    })
                }
                Ok(n) => {
                    written += n;
                    transferred += n as u64;
                }
                Err(source) => return Err(RelayError::Write { transferred, source }),
            }
        }
    }

    writer
        .flush()
        .await
        .map_err(|source| RelayError::Write { transferred, source })?;

    Ok(transferred)
}

/// Start relaying `body` in a background task and return the response
/// body it feeds.
///
/// A relay aborted by a read error makes the returned body yield an
/// error after the bytes already relayed, so hyper tears the connection
/// down instead of ending the response as if it were complete.
pub fn stream_body(body: ObjectBody, key: String) -> Body {
    let (mut writer, reader) = tokio::io::duplex(RELAY_BUFFER_SIZE);
    let (abort_tx, abort_rx) = oneshot::channel::<io::Error>();

    tokio::spawn(async move {
        match relay(body, &mut writer).await {
            Ok(transferred) => {
                counter!(BYTES_SENT_TOTAL).increment(transferred);
                debug!(key = %key, bytes = transferred, "relay complete");
                // Signals EOF to the response body.
                let _ = writer.shutdown().await;
            }
            Err(e) => {
                counter!(BYTES_SENT_TOTAL).increment(e.transferred());
                counter!(RELAY_ABORTS_TOTAL, "stage" => e.stage()).increment(1);
                if e.is_unread_disconnect() {
                    debug!(key = %key, error = %e, "response dropped before any byte was sent");
                } else {
                    warn!(operation = "relay", key = %key, error = %e, "relay aborted");
                }
                let _ = abort_tx.send(io::Error::new(io::ErrorKind::Other, e));
            }
        }
        drop(writer);
    });

    let data = ReaderStream::with_capacity(reader, RELAY_BUFFER_SIZE);
    let trailer = futures::stream::once(abort_rx)
        .filter_map(|aborted| std::future::ready(aborted.ok().map(Err)));

    Body::from_stream(data.chain(trailer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_data, BrokenWriter, DropCounting, FailingReader, TrickleWriter};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counted_body(data: Vec<u8>, drops: &Arc<AtomicUsize>) -> ObjectBody {
        ObjectBody::new(DropCounting::new(Cursor::new(data), drops.clone()))
    }

    #[tokio::test]
    async fn test_relay_copies_all_bytes() {
        let data = test_data(3 * RELAY_BUFFER_SIZE + 123);
        let mut out: Vec<u8> = Vec::new();

        let n = relay(ObjectBody::new(Cursor::new(data.clone())), &mut out)
            .await
            .unwrap();

        assert_eq!(n, data.len() as u64);
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_relay_empty_body() {
        let mut out: Vec<u8> = Vec::new();
        let n = relay(ObjectBody::new(Cursor::new(Vec::new())), &mut out)
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_relay_one_byte_writer() {
        let data = test_data(RELAY_BUFFER_SIZE + 17);
        let mut out = TrickleWriter::new(1);

        let n = relay(ObjectBody::new(Cursor::new(data.clone())), &mut out)
            .await
            .unwrap();

        assert_eq!(n, data.len() as u64);
        assert_eq!(out.written, data);
        assert_eq!(out.calls, data.len());
    }

    #[tokio::test]
    async fn test_relay_read_error_aborts() {
        let data = test_data(1000);
        let mut out: Vec<u8> = Vec::new();

        let err = relay(ObjectBody::new(FailingReader::new(data.clone())), &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Read { .. }));
        assert_eq!(err.transferred(), 1000);
        // Bytes relayed before the failure stay relayed.
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_relay_write_error_aborts() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut out = BrokenWriter {
            capacity: 100,
            ..Default::default()
        };

        let err = relay(counted_body(test_data(5000), &drops), &mut out)
            .await
            .unwrap_err();

        match err {
            RelayError::Write {
                transferred,
                source,
            } => {
                assert_eq!(transferred, 100);
                assert_eq!(source.kind(), io::ErrorKind::BrokenPipe);
            }
            other => panic!("expected write error, got {other:?}"),
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_relay_zero_write_is_error() {
        let mut out = BrokenWriter {
            capacity: 10,
            zero_on_full: true,
            ..Default::default()
        };

        let err = relay(ObjectBody::new(Cursor::new(test_data(64))), &mut out)
            .await
            .unwrap_err();

        match err {
            RelayError::Write { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::WriteZero)
            }
            other => panic!("expected write error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_relay_closes_body_once_on_success() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut out: Vec<u8> = Vec::new();

        relay(counted_body(test_data(10), &drops), &mut out)
            .await
            .unwrap();

        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream_body_delivers_object() {
        let data = test_data(5 * RELAY_BUFFER_SIZE + 1);
        let body = stream_body(
            ObjectBody::new(Cursor::new(data.clone())),
            "/big.bin".to_string(),
        );

        let collected = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(collected.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn test_stream_body_surfaces_read_failure() {
        let body = stream_body(
            ObjectBody::new(FailingReader::new(test_data(100))),
            "/broken.bin".to_string(),
        );

        assert!(axum::body::to_bytes(body, usize::MAX).await.is_err());
    }

    #[tokio::test]
    async fn test_stream_body_client_disconnect_closes_stream() {
        let drops = Arc::new(AtomicUsize::new(0));
        let body = stream_body(
            counted_body(test_data(10 * RELAY_BUFFER_SIZE), &drops),
            "/gone.bin".to_string(),
        );

        // Client went away without reading.
        drop(body);

        for _ in 0..100 {
            if drops.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
