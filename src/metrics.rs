//! Metric helpers for `firerelay`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking live server sessions.
pub const SESSIONS_ACTIVE: &str = "firerelay_sessions_active";
/// Name of the counter tracking artifacts written by the server.
pub const ARTIFACTS_STORED: &str = "firerelay_artifacts_stored_total";
/// Name of the counter tracking detections acknowledged by the server.
pub const DETECTIONS_FORWARDED: &str = "firerelay_detections_forwarded_total";
/// Name of the counter tracking forwarder reconnections.
pub const RECONNECTS_TOTAL: &str = "firerelay_reconnects_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "firerelay_errors_total";

/// Category of a counted error.
#[derive(Clone, Copy, Debug)]
pub enum ErrorKind {
    /// Malformed frame header.
    Framing,
    /// Socket failure or timeout.
    Transport,
    /// Malformed envelope.
    Decode,
    /// Filesystem failure.
    Persistence,
}

impl ErrorKind {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Framing => "framing",
            ErrorKind::Transport => "transport",
            ErrorKind::Decode => "decode",
            ErrorKind::Persistence => "persistence",
        }
    }
}

/// Increment the live sessions gauge.
pub fn inc_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

/// Decrement the live sessions gauge.
pub fn dec_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

/// Record a stored artifact pair.
pub fn inc_artifacts() {
    #[cfg(feature = "metrics")]
    counter!(ARTIFACTS_STORED).increment(1);
}

/// Record a detection acknowledged by the server.
pub fn inc_forwarded() {
    #[cfg(feature = "metrics")]
    counter!(DETECTIONS_FORWARDED).increment(1);
}

/// Record a forwarder reconnection.
pub fn inc_reconnects() {
    #[cfg(feature = "metrics")]
    counter!(RECONNECTS_TOTAL).increment(1);
}

/// Record an error occurrence of the given kind.
pub fn inc_errors(kind: ErrorKind) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}
