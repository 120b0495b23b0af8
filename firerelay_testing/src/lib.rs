//! Utilities for exercising `firerelay` servers and forwarders in tests.
//!
//! The helpers build sample detections, run a [`RelayServer`] against a
//! temporary output directory and speak the wire protocol by hand so tests
//! can misbehave in ways the real forwarder never would.
//!
//! ```rust,no_run
//! use firerelay_testing::{RunningServer, sample_detection};
//!
//! # async fn demo() -> firerelay_testing::TestResult {
//! let server = RunningServer::start().await?;
//! let mut peer = server.raw_peer().await?;
//! peer.send_detection(&sample_detection("a1")).await?;
//! let root = server.stop().await?;
//! assert!(root.path().join("telemetry/a1").is_file());
//! # Ok(())
//! # }
//! ```
//!
//! [`RelayServer`]: firerelay::server::RelayServer

mod detections;
mod logging;
mod peer;
mod relay;
mod server;

pub use detections::{JPEG_STUB, distinct_detection, sample_detection, sample_telemetry};
pub use logging::{LoggerHandle, logger};
pub use peer::RawPeer;
pub use relay::RecordingRelay;
pub use server::{RunningServer, unused_listener};

/// Shared result type for integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
