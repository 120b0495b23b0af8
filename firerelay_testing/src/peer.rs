//! A forwarder stand-in that drives each protocol step explicitly.

use std::{io, net::SocketAddr, time::Duration};

use firerelay::{
    codec::{self, READY_TOKEN},
    detection::Detection,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw connection to a relay server.
pub struct RawPeer {
    stream: TcpStream,
}

impl RawPeer {
    /// Connect to `addr`.
    ///
    /// # Errors
    ///
    /// Returns the connect error.
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        Ok(Self {
            stream: TcpStream::connect(addr).await?,
        })
    }

    /// Write raw bytes to the server.
    ///
    /// # Errors
    ///
    /// Returns the write error.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await
    }

    /// Close the write half so the server sees end of stream.
    ///
    /// # Errors
    ///
    /// Returns the shutdown error.
    pub async fn shutdown_write(&mut self) -> io::Result<()> { self.stream.shutdown().await }

    /// Read exactly `len` reply bytes, failing if none arrive within five
    /// seconds.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::TimedOut`] on a stall, or the read error.
    pub async fn read_reply(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        timeout(REPLY_TIMEOUT, self.stream.read_exact(&mut buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no reply from server"))??;
        Ok(buf)
    }

    /// Wait for the server to close the connection, returning any bytes it
    /// sent first.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::TimedOut`] if the connection stays open, or
    /// the read error.
    pub async fn read_to_close(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        match timeout(REPLY_TIMEOUT, self.stream.read_to_end(&mut buf)).await {
            Ok(Ok(_)) => Ok(buf),
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionReset => Ok(buf),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connection still open")),
        }
    }

    /// Run one full exchange for `detection` and return the receipt.
    ///
    /// # Errors
    ///
    /// Fails if the detection cannot be encoded, the socket fails, or the
    /// server answers with something other than the ready token.
    pub async fn send_detection(&mut self, detection: &Detection) -> io::Result<Vec<u8>> {
        let frame = codec::encode(detection)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.send_raw(&frame.header.to_bytes()).await?;
        let ready = self.read_reply(READY_TOKEN.len()).await?;
        if ready != READY_TOKEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected ready token: {}", String::from_utf8_lossy(&ready)),
            ));
        }
        self.send_raw(&frame.payload).await?;
        self.read_reply(frame.header.id().len()).await
    }
}
