//! Configuration utilities for [`RelayServer`].

use std::time::Duration;

use tokio::sync::oneshot;

use super::{RelayServer, ServerState, SessionConfig, Unbound};
use crate::{backoff::BackoffConfig, store::ArtifactStore};

/// Default cap on concurrently served connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

impl RelayServer<Unbound> {
    /// Create a server persisting detections through `store`.
    ///
    /// The TCP listener is unset; call [`bind`](Self::bind) before running
    /// the server.
    ///
    /// # Examples
    ///
    /// ```
    /// use firerelay::{server::RelayServer, store::ArtifactStore};
    ///
    /// let server = RelayServer::new(ArtifactStore::new("/tmp/firerelay")).max_connections(64);
    /// assert_eq!(server.connection_limit(), 64);
    /// ```
    #[must_use]
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store: store.into(),
            session: SessionConfig::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            backoff_config: BackoffConfig::default(),
            ready_tx: None,
            state: Unbound,
        }
    }
}

impl<S> RelayServer<S>
where
    S: ServerState,
{
    /// Cap the number of concurrently served connections. Values below one
    /// are raised to one.
    #[must_use]
    pub fn max_connections(mut self, limit: usize) -> Self {
        self.max_connections = limit.max(1);
        self
    }

    /// Deadline for each socket operation once an exchange has started.
    ///
    /// Idle connections waiting for their next header are not subject to it.
    #[must_use]
    pub fn io_timeout(mut self, limit: Duration) -> Self {
        self.session.io_timeout = limit;
        self
    }

    /// Largest payload length a header may declare.
    #[must_use]
    pub fn max_payload_len(mut self, limit: usize) -> Self {
        self.session.max_payload_len = limit;
        self
    }

    /// Configure back-off applied when `accept()` fails.
    #[must_use]
    pub fn accept_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff_config = backoff.normalized();
        self
    }

    /// Configure a channel notified once the accept loop is running.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Configured connection cap.
    #[must_use]
    pub fn connection_limit(&self) -> usize { self.max_connections }

    /// Configured per-session settings.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig { self.session }

    /// Store receiving artifacts.
    #[must_use]
    pub fn store(&self) -> &ArtifactStore { &self.store }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::server::test_util::{TempStore, store};

    #[rstest]
    fn defaults(store: TempStore) {
        let server = RelayServer::new(store.store());
        assert_eq!(server.connection_limit(), DEFAULT_MAX_CONNECTIONS);
        assert_eq!(server.session_config(), SessionConfig::default());
        assert!(server.ready_tx.is_none());
    }

    #[rstest]
    fn max_connections_enforces_minimum(store: TempStore) {
        assert_eq!(RelayServer::new(store.store()).max_connections(0).connection_limit(), 1);
    }

    #[rstest]
    fn session_settings_are_recorded(store: TempStore) {
        let server = RelayServer::new(store.store())
            .io_timeout(Duration::from_secs(3))
            .max_payload_len(512);
        let config = server.session_config();
        assert_eq!(config.io_timeout, Duration::from_secs(3));
        assert_eq!(config.max_payload_len, 512);
    }

    #[rstest]
    fn accept_backoff_is_normalized(store: TempStore) {
        let server = RelayServer::new(store.store()).accept_backoff(BackoffConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(5),
        });
        assert_eq!(server.backoff_config.initial_delay, Duration::from_millis(5));
        assert_eq!(server.backoff_config.max_delay, Duration::from_millis(50));
    }
}
