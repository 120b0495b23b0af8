//! Process termination signals shared by both binaries.

use futures::Future;
use log::{info, warn};

/// Resolves once the process is asked to stop with Ctrl+C or `SIGTERM`.
///
/// The `SIGTERM` handler is installed when this function is called, not when
/// the returned future is first polled, so a signal delivered in between is
/// not lost. If the handler cannot be installed only Ctrl+C is awaited.
///
/// # Examples
///
/// ```no_run
/// # #[tokio::main]
/// # async fn main() {
/// firerelay::signal::shutdown_signal().await;
/// # }
/// ```
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    #[cfg(unix)]
    let terminate = {
        use tokio::signal::unix::{SignalKind, signal};
        signal(SignalKind::terminate())
            .inspect_err(|e| warn!("failed to install SIGTERM handler: error={e}"))
            .ok()
    };

    async move {
        #[cfg(unix)]
        {
            if let Some(mut terminate) = terminate {
                tokio::select! {
                    () = wait_for_ctrl_c() => {}
                    _ = terminate.recv() => info!("received SIGTERM"),
                }
                return;
            }
        }
        wait_for_ctrl_c().await;
    }
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C"),
        Err(e) => {
            warn!("failed to listen for Ctrl+C: error={e}");
            futures::future::pending::<()>().await;
        }
    }
}
