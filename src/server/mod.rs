//! Tokio-based relay server storing detections as they arrive.
//!
//! `RelayServer` accepts TCP connections and runs one session task per
//! connection. Each session reads frames in lock-step with its forwarder,
//! persists every detection through the [`ArtifactStore`] and acknowledges
//! it only once both artifacts are on disk.

use std::sync::Arc;

use tokio::{net::TcpListener, sync::oneshot};

use crate::{backoff::BackoffConfig, store::ArtifactStore};

/// Relay server for detection artifacts.
///
/// The server carries a typestate `S` indicating whether it is [`Unbound`]
/// (not yet bound to a TCP listener) or [`Bound`]. New servers start
/// `Unbound` and must call [`RelayServer::bind`] or
/// [`RelayServer::bind_existing_listener`] before running.
///
/// There is no per-peer limit; the total number of live sessions is capped
/// by [`RelayServer::max_connections`]. Once the cap is reached the accept
/// loop waits for a session to finish before accepting another connection.
pub struct RelayServer<S = Unbound>
where
    S: ServerState,
{
    pub(crate) store: Arc<ArtifactStore>,
    pub(crate) session: SessionConfig,
    pub(crate) max_connections: usize,
    pub(crate) backoff_config: BackoffConfig,
    /// Channel used to notify when the server is ready.
    ///
    /// A `oneshot::Sender` can transmit only one readiness notification, so a
    /// new one must be provided each time the server is started.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    /// Typestate tracking whether the server has been bound to a listener.
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

mod binding;
mod config;
mod connection;
pub mod error;
mod runtime;
mod session;

pub use error::{ServerError, SessionError};
pub use session::{SessionConfig, SessionSummary};

#[cfg(test)]
pub(crate) mod test_util;
