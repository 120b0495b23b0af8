//! Connection handling for [`RelayServer`](super::RelayServer).

use std::{future::Future, net::SocketAddr, sync::Arc};

use futures::FutureExt;
use log::{error, info, warn};
use tokio::{net::TcpStream, sync::OwnedSemaphorePermit};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::session::{Session, SessionConfig};
use crate::{metrics, panic::PanicMessage, store::ArtifactStore};

/// Shared state handed to every session task.
#[derive(Clone, Debug)]
pub(super) struct SessionContext {
    pub store: Arc<ArtifactStore>,
    pub config: SessionConfig,
    pub shutdown: CancellationToken,
}

/// Spawn a task serving one TCP connection, logging and discarding any panics.
///
/// `permit` is held for the lifetime of the task so the accept loop can cap
/// the number of live sessions.
pub(super) fn spawn_session_task(
    stream: TcpStream,
    permit: OwnedSemaphorePermit,
    context: SessionContext,
    tracker: &TaskTracker,
) {
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!("Failed to retrieve peer address: error={e}");
            None
        }
    };
    tracker.spawn(async move {
        let _permit = permit;
        metrics::inc_sessions();
        catch_session_panic(serve(stream, peer_addr, context), peer_addr).await;
        metrics::dec_sessions();
    });
}

/// Drive `session` to completion, logging any panic it raises.
async fn catch_session_panic<F>(session: F, peer_addr: Option<SocketAddr>)
where
    F: Future<Output = ()>,
{
    if let Err(panic) = std::panic::AssertUnwindSafe(session).catch_unwind().await {
        let panic_msg = PanicMessage::from(panic);
        // Emit via both `log` and `tracing` for tests that capture either.
        error!("session task panicked: panic={panic_msg}, peer_addr={peer_addr:?}");
        tracing::error!(panic = %panic_msg, ?peer_addr, "session task panicked");
    }
}

async fn serve(stream: TcpStream, peer_addr: Option<SocketAddr>, context: SessionContext) {
    let SessionContext {
        store,
        config,
        shutdown,
    } = context;
    if let Err(e) = stream.set_nodelay(true) {
        warn!("failed to set TCP_NODELAY: error={e}, peer_addr={peer_addr:?}");
    }
    match Session::new(stream, peer_addr, store, config)
        .run(shutdown)
        .await
    {
        Ok(summary) => info!(
            "session closed: requests={}, stored={}, peer_addr={peer_addr:?}",
            summary.requests, summary.stored
        ),
        Err(e) => {
            metrics::inc_errors(e.kind());
            warn!("session aborted: error={e}, peer_addr={peer_addr:?}");
        }
    }
}
