//! Forwarder side of the lock-step exchange.

use std::{io, time::Duration};

use log::debug;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite},
    net::TcpStream,
    time::timeout,
};

use crate::{
    codec::{EncodedFrame, READY_TOKEN},
    transport::{self, TransportError},
};

/// An established connection to the relay server.
///
/// Exchanges run strictly one at a time: the next header is only written
/// once the previous detection has been acknowledged.
#[derive(Debug)]
pub struct RelayConnection<S = TcpStream> {
    stream: S,
    io_timeout: Duration,
}

impl RelayConnection<TcpStream> {
    /// Dial `addr`, giving up after `io_timeout`.
    ///
    /// # Errors
    ///
    /// Returns the connect error, or [`io::ErrorKind::TimedOut`] if the
    /// server did not answer in time.
    pub async fn connect(addr: &str, io_timeout: Duration) -> io::Result<Self> {
        let stream = timeout(io_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, io_timeout))
    }
}

impl<S> RelayConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream.
    pub fn new(stream: S, io_timeout: Duration) -> Self { Self { stream, io_timeout } }

    /// Send one detection and wait for its receipt.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the socket fails or stalls, or if the
    /// server answers with anything other than the ready token and the
    /// detection id.
    pub async fn exchange(&mut self, frame: &EncodedFrame) -> Result<(), TransportError> {
        let limit = self.io_timeout;
        let id = frame.header.id();
        transport::write_all(&mut self.stream, &frame.header.to_bytes(), limit, "header write")
            .await?;
        transport::expect_ack(&mut self.stream, READY_TOKEN, limit, "ready token").await?;
        transport::write_all(&mut self.stream, &frame.payload, limit, "payload write").await?;
        transport::expect_ack(&mut self.stream, id.as_bytes(), limit, "receipt").await?;
        debug!("exchange complete: id={id}, payload_len={}", frame.payload.len());
        Ok(())
    }

    /// Resolve once the idle connection is no longer usable.
    ///
    /// The server never speaks unprompted, so any readable event while idle
    /// means the connection has closed or broken. Dropping the future before
    /// it resolves leaves the connection untouched.
    pub async fn closed(&mut self) -> TransportError {
        let mut probe = [0u8; 1];
        match self.stream.read(&mut probe).await {
            Ok(0) => io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "relay server closed the connection",
            )
            .into(),
            Ok(_) => TransportError::UnexpectedAck {
                operation: "idle wait",
                expected: String::new(),
                actual: String::from_utf8_lossy(&probe).into_owned(),
            },
            Err(e) => e.into(),
        }
    }
}
