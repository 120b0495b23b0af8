//! Test helpers shared across server modules.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    path::Path,
};

use rstest::fixture;
use tempfile::TempDir;

use super::{Bound, RelayServer};
use crate::store::ArtifactStore;

/// An [`ArtifactStore`] rooted in a directory removed when the test ends.
pub struct TempStore {
    dir: TempDir,
    store: ArtifactStore,
}

impl TempStore {
    /// Store writing into the temporary directory.
    #[must_use]
    pub fn store(&self) -> ArtifactStore { self.store.clone() }

    /// The temporary directory.
    #[must_use]
    pub fn path(&self) -> &Path { self.dir.path() }
}

/// Each test gets its own directory so tests never observe each other's
/// artifacts.
#[fixture]
pub fn store() -> TempStore {
    let dir = TempDir::new().expect("create temp dir");
    let store = ArtifactStore::new(dir.path());
    TempStore { dir, store }
}

#[fixture]
/// Returns a bound [`StdTcpListener`] on a free port for use in tests.
///
/// Keeping the listener bound prevents race conditions where another
/// process could claim the port between discovery and use.
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

/// Extract the bound address from a listener.
#[must_use]
pub fn listener_addr(listener: &StdTcpListener) -> SocketAddr {
    listener
        .local_addr()
        .expect("failed to get listener address")
}

pub fn bind_server(store: ArtifactStore, listener: StdTcpListener) -> RelayServer<Bound> {
    RelayServer::new(store)
        .bind_existing_listener(listener)
        .expect("Failed to bind")
}
