//! A scripted relay server recording the order in which detections arrive.

use std::{
    io,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use firerelay::codec::{FrameHeader, MAX_HEADER_LEN, READY_TOKEN};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

type Arrivals = Arc<Mutex<Vec<String>>>;

/// Acknowledges every well-formed exchange and remembers the header ids in
/// arrival order. Payloads are read but not decoded or stored.
pub struct RecordingRelay {
    addr: SocketAddr,
    arrivals: Arrivals,
    accept: JoinHandle<()>,
}

impl RecordingRelay {
    /// Listen on `addr`. With `hang_up_after` set, every connection is
    /// closed once that many exchanges on it have been acknowledged.
    ///
    /// # Errors
    ///
    /// Fails if `addr` cannot be bound.
    pub async fn start_at(addr: SocketAddr, hang_up_after: Option<usize>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let arrivals = Arrivals::default();
        let accept = tokio::spawn({
            let arrivals = Arc::clone(&arrivals);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve(stream, Arc::clone(&arrivals), hang_up_after));
                }
            }
        });
        Ok(Self {
            addr,
            arrivals,
            accept,
        })
    }

    /// Address the relay listens on.
    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Ids acknowledged so far, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if a connection task panicked while recording.
    #[must_use]
    pub fn ids(&self) -> Vec<String> { self.arrivals.lock().expect("arrivals poisoned").clone() }

    /// Wait until at least `count` ids have arrived or `limit` elapses, then
    /// return them.
    pub async fn wait_for(&self, count: usize, limit: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let ids = self.ids();
            if ids.len() >= count || tokio::time::Instant::now() >= deadline {
                return ids;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for RecordingRelay {
    fn drop(&mut self) { self.accept.abort(); }
}

async fn serve(
    mut stream: TcpStream,
    arrivals: Arrivals,
    hang_up_after: Option<usize>,
) -> io::Result<()> {
    let mut buf = [0u8; MAX_HEADER_LEN];
    let mut served = 0;
    while hang_up_after.is_none_or(|limit| served < limit) {
        let read = stream.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        let header = FrameHeader::decode(&buf[..read]).map_err(io::Error::other)?;
        stream.write_all(READY_TOKEN).await?;
        let mut payload = vec![0; header.length()];
        stream.read_exact(&mut payload).await?;
        arrivals
            .lock()
            .expect("arrivals poisoned")
            .push(header.id().to_owned());
        stream.write_all(header.id().as_bytes()).await?;
        served += 1;
    }
    Ok(())
}
