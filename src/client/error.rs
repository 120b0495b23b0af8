//! Error types for forwarder operations.

use std::io;

use crate::transport::TransportError;

/// Reasons a [`Forwarder`](super::Forwarder) stopped before its queue closed.
#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    /// The relay server could not be reached within the configured number of
    /// attempts.
    #[error("failed to connect to {addr} after {attempts} attempts: {source}")]
    Connect {
        /// Address that was dialled.
        addr: String,
        /// Attempts made, including the last one.
        attempts: u32,
        /// Error from the last attempt.
        #[source]
        source: io::Error,
    },
    /// A live connection failed under
    /// [`ReconnectPolicy::ConnectOnly`](super::ReconnectPolicy::ConnectOnly).
    #[error(transparent)]
    Transport(#[from] TransportError),
}
