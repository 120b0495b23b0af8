//! Errors raised by [`super::RelayServer`] and its sessions.

use std::io;

use thiserror::Error;

use crate::{
    codec::FramingError,
    detection::DecodeError,
    metrics::ErrorKind,
    store::PersistenceError,
    transport::TransportError,
};

/// Errors that may occur while starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or configuring the listener failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),
    /// The output directories could not be created.
    #[error("failed to prepare output directory: {0}")]
    Prepare(#[source] PersistenceError),
}

/// Reasons a session ended before its peer closed the connection.
///
/// Every variant is local to one connection. None of them is acknowledged to
/// the peer: the receipt is only sent after a detection has been stored.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The header could not be interpreted.
    #[error(transparent)]
    Framing(#[from] FramingError),
    /// The socket failed, stalled or closed mid-exchange.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The payload was not a valid envelope.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The artifacts could not be written.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl SessionError {
    /// Metric category of the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Framing(_) => ErrorKind::Framing,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }
}
