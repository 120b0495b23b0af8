//! Edge binary forwarding detection alerts to the ground station.
//!
//! Alerts read from the bus are correlated with their telemetry, buffered in
//! a bounded queue and relayed one at a time. Ctrl+C or `SIGTERM` stops
//! intake and the forwarder; detections still queued at that point are not
//! sent.

use anyhow::Context;
use clap::Parser;
use firerelay::{
    cli::ForwarderCli,
    client::{Forwarder, ForwarderConfig, ReconnectPolicy},
    intake::{AlertIntake, IntakeConfig},
    queue::DetectionQueue,
    signal::shutdown_signal,
};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = ForwarderCli::parse();
    let intake_config = IntakeConfig::from_url(&cli.zmq).context("invalid alert bus url")?;
    let (receiver, sender) = DetectionQueue::builder()
        .capacity(cli.queue_capacity)
        .build()
        .context("invalid queue settings")?;

    let policy = if cli.connect_only_retry {
        ReconnectPolicy::ConnectOnly
    } else {
        ReconnectPolicy::Always
    };
    let forwarder = Forwarder::new(ForwarderConfig::new(&cli.dst).reconnect(policy));

    let shutdown = CancellationToken::new();
    let signal = shutdown_signal();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            signal.await;
            shutdown.cancel();
        }
    });

    let intake = tokio::spawn(AlertIntake::new(intake_config).run(sender, shutdown.clone()));
    let result = forwarder.run(receiver, shutdown.clone()).await;
    shutdown.cancel();
    match intake.await {
        Ok(report) => info!(
            "intake finished: alerts={}, enqueued={}, skipped={}",
            report.alerts, report.enqueued, report.skipped
        ),
        Err(e) => warn!("intake task failed: error={e}"),
    }

    let report = result.with_context(|| format!("forwarding to {} failed", cli.dst))?;
    info!(
        "forwarder finished: sent={}, reconnects={}, rejected={}",
        report.sent, report.reconnects, report.rejected
    );
    Ok(())
}
