#![cfg(feature = "metrics")]
//! Tests for `firerelay` metrics helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.

use std::time::Duration;

use firerelay::{
    backoff::BackoffConfig,
    client::{Forwarder, ForwarderConfig},
    metrics::{self as relay_metrics, ErrorKind},
    queue::DetectionQueue,
};
use firerelay_testing::{RunningServer, TestResult, sample_detection};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::{fixture, rstest};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// Single-threaded runtime so every task records into the local recorder.
#[fixture]
fn rt() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build test runtime")
}

fn counter(snapshotter: &Snapshotter, name: &str, kind: Option<&str>) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && kind.is_none_or(|kind| {
                    key.key()
                        .labels()
                        .any(|l| l.key() == "kind" && l.value() == kind)
                })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(c) => c,
            _ => 0,
        })
        .sum()
}

#[rstest]
#[case(ErrorKind::Framing, "framing")]
#[case(ErrorKind::Transport, "transport")]
#[case(ErrorKind::Decode, "decode")]
#[case(ErrorKind::Persistence, "persistence")]
fn error_metric_is_labelled(#[case] kind: ErrorKind, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || relay_metrics::inc_errors(kind));
    assert_eq!(
        counter(&snapshotter, relay_metrics::ERRORS_TOTAL, Some(label)),
        1
    );
}

#[test]
fn session_gauge_returns_to_zero() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        relay_metrics::inc_sessions();
        relay_metrics::inc_sessions();
        relay_metrics::dec_sessions();
        relay_metrics::dec_sessions();
    });
    let metrics = snapshotter.snapshot().into_vec();
    let gauge = metrics
        .iter()
        .find(|(key, _, _, _)| key.key().name() == relay_metrics::SESSIONS_ACTIVE)
        .map(|(_, _, _, value)| value.clone());
    assert!(
        matches!(gauge, Some(DebugValue::Gauge(g)) if g.into_inner().abs() < f64::EPSILON),
        "unexpected gauge {gauge:?}"
    );
}

async fn relay_traffic() -> TestResult {
    let server = RunningServer::start().await?;

    let mut bad = server.raw_peer().await?;
    bad.send_raw(b"garbage").await?;
    bad.read_to_close().await?;

    let (receiver, sender) = DetectionQueue::builder().build()?;
    for id in ["m1", "m2"] {
        sender.enqueue(sample_detection(id)).await?;
    }
    drop(sender);
    let config = ForwarderConfig::new(server.addr().to_string())
        .backoff(BackoffConfig::fixed(Duration::from_millis(10)))
        .poll_interval(Duration::from_millis(10));
    Forwarder::new(config)
        .run(receiver, CancellationToken::new())
        .await?;

    server.stop().await?;
    Ok(())
}

#[rstest]
fn relay_traffic_is_counted(rt: Runtime) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || rt.block_on(relay_traffic()))
        .expect("relay traffic");

    assert_eq!(counter(&snapshotter, relay_metrics::ARTIFACTS_STORED, None), 2);
    assert_eq!(
        counter(&snapshotter, relay_metrics::DETECTIONS_FORWARDED, None),
        2
    );
    assert_eq!(
        counter(&snapshotter, relay_metrics::ERRORS_TOTAL, Some("framing")),
        1
    );
    assert_eq!(counter(&snapshotter, relay_metrics::RECONNECTS_TOTAL, None), 0);
}
