//! Runtime control for [`RelayServer`].

mod accept;

use std::sync::Arc;

#[cfg(test)]
pub(super) use accept::MockAcceptListener;
pub(super) use accept::{AcceptLoopOptions, accept_loop};
use futures::Future;
use log::{info, warn};
use tokio::{select, sync::Semaphore};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, RelayServer, ServerError, connection::SessionContext};
use crate::signal::shutdown_signal;

impl RelayServer<Bound> {
    /// Run the server until a shutdown signal is received.
    ///
    /// Creates the output directories, starts the accept loop and awaits
    /// Ctrl+C or `SIGTERM` for shutdown.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use firerelay::{server::RelayServer, store::ArtifactStore};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), firerelay::server::ServerError> {
    /// let server = RelayServer::new(ArtifactStore::new("/opt/firedrone/data"))
    ///     .bind(([0, 0, 0, 0], 16551).into())?;
    /// server.run().await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Attempting to run a server without binding fails to compile:
    ///
    /// ```compile_fail
    /// use firerelay::{server::RelayServer, store::ArtifactStore};
    ///
    /// async fn try_run() {
    ///     RelayServer::new(ArtifactStore::new("/tmp"))
    ///         .run()
    ///         .await
    ///         .expect("unbound servers do not expose run()");
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Prepare`] if the output directories cannot be
    /// created. Accept failures are retried with exponential back-off and do
    /// not surface as errors.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(shutdown_signal()).await
    }

    /// Run the server until the `shutdown` future resolves.
    ///
    /// Idle sessions are closed as soon as `shutdown` resolves; an exchange
    /// in flight is allowed to finish first.
    ///
    /// # Examples
    ///
    /// ```
    /// use firerelay::{server::RelayServer, store::ArtifactStore};
    /// use tokio::sync::oneshot;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), firerelay::server::ServerError> {
    /// let dir = tempfile::tempdir().expect("temp dir");
    /// let server = RelayServer::new(ArtifactStore::new(dir.path())).bind(([127, 0, 0, 1], 0).into())?;
    ///
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(async move {
    ///     server
    ///         .run_with_shutdown(async {
    ///             let _ = rx.await;
    ///         })
    ///         .await
    /// });
    ///
    /// let _ = tx.send(());
    /// handle
    ///     .await
    ///     .expect("join server task")
    ///     .expect("server run failed");
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Prepare`] if the output directories cannot be
    /// created.
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let RelayServer {
            store,
            session,
            max_connections,
            backoff_config,
            ready_tx,
            state: Bound { listener },
        } = self;
        store.prepare().await.map_err(ServerError::Prepare)?;

        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let local_addr = listener.local_addr().ok();

        tracker.spawn(accept_loop(
            Arc::clone(&listener),
            AcceptLoopOptions {
                session: SessionContext {
                    store: Arc::clone(&store),
                    config: session,
                    shutdown: shutdown_token.clone(),
                },
                limit: Arc::new(Semaphore::new(max_connections)),
                tracker: tracker.clone(),
                backoff: backoff_config,
            },
        ));
        info!(
            "relay server listening: local_addr={local_addr:?}, output={:?}, \
             max_connections={max_connections}",
            store.root()
        );

        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        select! {
            () = shutdown => shutdown_token.cancel(),
            () = tracker.wait() => {},
        }

        tracker.close();
        tracker.wait().await;
        info!("relay server stopped: local_addr={local_addr:?}");
        Ok(())
    }
}
