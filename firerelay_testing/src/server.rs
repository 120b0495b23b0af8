//! A relay server running on a free port with a temporary output directory.

use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};

use firerelay::{
    server::{Bound, RelayServer, ServerError},
    store::ArtifactStore,
};
use tempfile::TempDir;
use tokio::{sync::oneshot, task::JoinHandle};

use crate::{RawPeer, TestResult};

/// Create a TCP listener bound to a free local port.
///
/// # Errors
///
/// Returns any IO error encountered while binding to an ephemeral localhost
/// port.
pub fn unused_listener() -> std::io::Result<StdTcpListener> {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr)
}

/// Handle to a [`RelayServer`] running in a background task.
pub struct RunningServer {
    addr: SocketAddr,
    root: TempDir,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    /// Start a server with default settings.
    ///
    /// # Errors
    ///
    /// Fails if no temporary directory or port is available.
    pub async fn start() -> TestResult<Self> { Self::start_with(|server| server).await }

    /// Start a server after applying `configure` to the unbound builder.
    ///
    /// # Errors
    ///
    /// Fails if no temporary directory or port is available, or if the
    /// server stops before signalling readiness.
    pub async fn start_with<F>(configure: F) -> TestResult<Self>
    where
        F: FnOnce(RelayServer) -> RelayServer,
    {
        let listener = unused_listener()?;
        Self::launch(configure, |server| server.bind_existing_listener(listener)).await
    }

    /// Start a server on a specific address, such as one a forwarder is
    /// already retrying.
    ///
    /// # Errors
    ///
    /// Fails if `addr` cannot be bound.
    pub async fn start_at(addr: SocketAddr) -> TestResult<Self> {
        Self::launch(|server| server, |server| server.bind(addr)).await
    }

    async fn launch<F, B>(configure: F, bind: B) -> TestResult<Self>
    where
        F: FnOnce(RelayServer) -> RelayServer,
        B: FnOnce(RelayServer) -> Result<RelayServer<Bound>, ServerError>,
    {
        let root = TempDir::new()?;
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop, stop_rx) = oneshot::channel::<()>();
        let unbound = configure(RelayServer::new(ArtifactStore::new(root.path())));
        let server = bind(unbound.ready_signal(ready_tx))?;
        let addr = server.local_addr().ok_or("server missing local addr")?;
        let handle = tokio::spawn(server.run_with_shutdown(async {
            let _ = stop_rx.await;
        }));
        ready_rx.await?;
        Ok(Self {
            addr,
            root,
            stop,
            handle,
        })
    }

    /// Address the server listens on.
    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Output directory receiving artifacts.
    #[must_use]
    pub fn root(&self) -> &std::path::Path { self.root.path() }

    /// Open a hand-driven connection to the server.
    ///
    /// # Errors
    ///
    /// Returns the connect error.
    pub async fn raw_peer(&self) -> std::io::Result<RawPeer> { RawPeer::connect(self.addr).await }

    /// Shut the server down and hand back its output directory.
    ///
    /// # Errors
    ///
    /// Returns the server's own error, or a join error if it panicked.
    pub async fn stop(self) -> TestResult<TempDir> {
        let _ = self.stop.send(());
        self.handle.await??;
        Ok(self.root)
    }
}
