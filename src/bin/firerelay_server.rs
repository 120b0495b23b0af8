//! Ground station binary storing detections relayed by edge forwarders.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use firerelay::{cli::ServerCli, server::RelayServer, store::ArtifactStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = ServerCli::parse();
    if let Some(addr) = cli.metrics_addr {
        install_metrics_exporter(addr)?;
    }

    RelayServer::new(ArtifactStore::new(&cli.output))
        .max_connections(cli.max_connections)
        .io_timeout(Duration::from_secs(cli.io_timeout_secs))
        .bind(cli.listen)
        .with_context(|| format!("cannot listen on {}", cli.listen))?
        .run()
        .await
        .with_context(|| format!("relay server failed: output={}", cli.output.display()))?;
    Ok(())
}

#[cfg(feature = "metrics")]
fn install_metrics_exporter(addr: std::net::SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("cannot expose metrics on {addr}"))?;
    log::info!("metrics exporter listening: addr={addr}");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics_exporter(addr: std::net::SocketAddr) -> anyhow::Result<()> {
    log::warn!("metrics support not compiled in, ignoring --metrics-addr: addr={addr}");
    Ok(())
}
