//! Public API for the `firerelay` library.
//!
//! `firerelay` moves fire detections from an airborne edge device to a ground
//! station over a small lock-step TCP protocol. The edge side runs a
//! [`client::Forwarder`] draining a [`queue::DetectionQueue`]; the ground
//! side runs a [`server::RelayServer`] that stores each detection through an
//! [`store::ArtifactStore`] before acknowledging it.

pub mod backoff;
pub mod cli;
pub mod client;
pub mod codec;
pub mod detection;
pub mod intake;
pub mod metrics;
pub mod panic;
pub mod queue;
pub mod server;
pub mod signal;
pub mod store;
pub mod transport;

pub use backoff::BackoffConfig;
pub use client::{ConnectionState, Forwarder, ForwarderConfig, ForwarderError, ReconnectPolicy};
pub use codec::{FrameHeader, FramingError, READY_TOKEN};
pub use detection::{Detection, Envelope, Image, Telemetry};
pub use queue::{DetectionQueue, DetectionReceiver, DetectionSender, OverflowPolicy};
pub use server::{RelayServer, ServerError};
pub use store::ArtifactStore;
pub use transport::TransportError;
