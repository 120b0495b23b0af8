//! Deadline-bounded socket I/O shared by the server and the forwarder.
//!
//! Every read and write performed mid-exchange goes through these helpers so
//! a half-open peer surfaces as [`TransportError::Timeout`] instead of
//! blocking a session or the forwarder indefinitely.

use std::{future::Future, io, time::Duration};

use bytes::BytesMut;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::timeout,
};

/// Default deadline applied to each socket operation.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest amount of buffer space reserved ahead of arriving payload bytes.
pub(crate) const PAYLOAD_CHUNK: usize = 64 * 1024;

/// Socket level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying socket failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// The peer did not make progress before the deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Step that stalled.
        operation: &'static str,
        /// Deadline that elapsed.
        after: Duration,
    },
    /// The peer closed the connection before the expected bytes arrived.
    #[error("connection closed during {operation} after {received} of {expected} bytes")]
    Closed {
        /// Step that was interrupted.
        operation: &'static str,
        /// Bytes received before the close.
        received: usize,
        /// Bytes the step required.
        expected: usize,
    },
    /// The peer answered with something other than the expected
    /// acknowledgment.
    #[error("unexpected {operation}: expected {expected:?}, got {actual:?}")]
    UnexpectedAck {
        /// Acknowledgment being awaited.
        operation: &'static str,
        /// Bytes that were expected.
        expected: String,
        /// Bytes that arrived.
        actual: String,
    },
}

async fn with_deadline<T, F>(
    limit: Duration,
    operation: &'static str,
    fut: F,
) -> Result<T, TransportError>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(TransportError::Timeout {
            operation,
            after: limit,
        }),
    }
}

/// Perform a single read into `buf`, returning the number of bytes read.
///
/// Zero means the peer closed the connection.
pub(crate) async fn read_once<R>(
    reader: &mut R,
    buf: &mut [u8],
    limit: Duration,
    operation: &'static str,
) -> Result<usize, TransportError>
where
    R: AsyncRead + Unpin,
{
    with_deadline(limit, operation, reader.read(buf)).await
}

/// Fill `buf` completely. The deadline applies to each individual read so
/// large payloads on slow links are not cut short while data still flows.
pub(crate) async fn read_exact<R>(
    reader: &mut R,
    buf: &mut [u8],
    limit: Duration,
    operation: &'static str,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    let expected = buf.len();
    let mut received = 0;
    while received < expected {
        let n = read_once(reader, &mut buf[received..], limit, operation).await?;
        if n == 0 {
            return Err(TransportError::Closed {
                operation,
                received,
                expected,
            });
        }
        received += n;
    }
    Ok(())
}

/// Append `len` bytes to `buf`.
///
/// Space is reserved at most [`PAYLOAD_CHUNK`] bytes at a time, so a peer
/// announcing a large payload and then sending nothing holds only one chunk.
/// The deadline applies to each individual read.
pub(crate) async fn read_payload<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    len: usize,
    limit: Duration,
    operation: &'static str,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    let start = buf.len();
    loop {
        let received = buf.len() - start;
        if received == len {
            return Ok(());
        }
        let remaining = len - received;
        if buf.capacity() == buf.len() {
            buf.reserve(remaining.min(PAYLOAD_CHUNK));
        }
        let window = u64::try_from(remaining).unwrap_or(u64::MAX);
        let n = with_deadline(limit, operation, (&mut *reader).take(window).read_buf(buf)).await?;
        if n == 0 {
            return Err(TransportError::Closed {
                operation,
                received,
                expected: len,
            });
        }
    }
}

/// Write all of `bytes` and flush.
pub(crate) async fn write_all<W>(
    writer: &mut W,
    bytes: &[u8],
    limit: Duration,
    operation: &'static str,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    with_deadline(limit, operation, async {
        writer.write_all(bytes).await?;
        writer.flush().await
    })
    .await
}

/// Read exactly `expected.len()` bytes and compare them to `expected`.
pub(crate) async fn expect_ack<R>(
    reader: &mut R,
    expected: &[u8],
    limit: Duration,
    operation: &'static str,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut actual = vec![0; expected.len()];
    read_exact(reader, &mut actual, limit, operation).await?;
    if actual != expected {
        return Err(TransportError::UnexpectedAck {
            operation,
            expected: String::from_utf8_lossy(expected).into_owned(),
            actual: String::from_utf8_lossy(&actual).into_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncWriteExt, duplex};

    use super::*;

    #[tokio::test]
    async fn read_exact_reports_partial_payload_on_close() {
        let (mut client, mut server) = duplex(64);
        client.write_all(b"abc").await.expect("write");
        drop(client);

        let mut buf = [0u8; 8];
        let err = read_exact(&mut server, &mut buf, Duration::from_secs(1), "payload read")
            .await
            .expect_err("short payload must fail");
        assert!(matches!(
            err,
            TransportError::Closed {
                received: 3,
                expected: 8,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn read_exact_collects_fragmented_writes() {
        let (mut client, mut server) = duplex(4);
        let writer = tokio::spawn(async move {
            for chunk in [b"ab".as_slice(), b"cd", b"ef"] {
                client.write_all(chunk).await.expect("write");
            }
        });
        let mut buf = [0u8; 6];
        read_exact(&mut server, &mut buf, Duration::from_secs(1), "payload read")
            .await
            .expect("read");
        writer.await.expect("join writer");
        assert_eq!(&buf, b"abcdef");
    }

    #[tokio::test]
    async fn payload_buffer_grows_with_arriving_bytes() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[7u8; 100]).await.expect("write");
        drop(client);

        let declared = 32 * 1024 * 1024;
        let mut buf = BytesMut::new();
        let err = read_payload(&mut server, &mut buf, declared, Duration::from_secs(1), "payload read")
            .await
            .expect_err("short payload must fail");
        assert!(matches!(
            err,
            TransportError::Closed {
                received: 100,
                expected,
                ..
            } if expected == declared
        ));
        assert_eq!(buf.len(), 100);
        assert!(buf.capacity() <= 2 * PAYLOAD_CHUNK, "reserved {} bytes", buf.capacity());
    }

    #[tokio::test]
    async fn payload_spanning_several_chunks_is_read_whole() {
        let len = PAYLOAD_CHUNK * 3 + 17;
        let sent: Vec<u8> = (0..len).map(|i| u8::try_from(i % 251).expect("byte")).collect();
        let (mut client, mut server) = duplex(4096);
        let writer = tokio::spawn({
            let sent = sent.clone();
            async move { client.write_all(&sent).await.expect("write") }
        });
        let mut buf = BytesMut::new();
        read_payload(&mut server, &mut buf, len, Duration::from_secs(5), "payload read")
            .await
            .expect("read");
        writer.await.expect("join writer");
        assert_eq!(&buf[..], &sent[..]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_peer_times_out() {
        let (_client, mut server) = duplex(8);
        let mut buf = [0u8; 1];
        let err = read_once(&mut server, &mut buf, Duration::from_millis(50), "header read")
            .await
            .expect_err("stalled read must time out");
        assert!(matches!(
            err,
            TransportError::Timeout {
                operation: "header read",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn mismatched_ack_is_reported() {
        let (mut client, mut server) = duplex(16);
        client.write_all(b"b2").await.expect("write");
        let err = expect_ack(&mut server, b"a1", Duration::from_secs(1), "receipt")
            .await
            .expect_err("wrong id must fail");
        assert!(matches!(err, TransportError::UnexpectedAck { .. }));
    }
}
