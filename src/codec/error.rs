//! Error types for the relay framing layer.
//!
//! - [`FramingError`]: the header line or declared length is unusable. A
//!   server session receiving one closes the connection.
//! - [`EncodeError`]: a detection cannot be turned into a frame. The
//!   forwarder drops such detections instead of retrying them.

use thiserror::Error;

/// Errors raised while building or interpreting a frame header.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The header did not contain an id and a length separated by `,`.
    #[error("header has {found} comma-separated field(s), expected at least 2")]
    MissingFields {
        /// Number of fields present.
        found: usize,
    },

    /// The header is not valid UTF-8 text.
    #[error("header is not valid UTF-8")]
    NotUtf8,

    /// The length field is not a non-negative integer.
    #[error("invalid payload length {0:?}")]
    InvalidLength(String),

    /// The id field is empty or would corrupt the header.
    #[error("invalid detection id {0:?}")]
    InvalidId(String),

    /// The header does not fit in a single header read.
    #[error("header exceeds max length: {size} > {max}")]
    HeaderTooLong {
        /// Encoded header size.
        size: usize,
        /// Maximum header size.
        max: usize,
    },

    /// The declared payload length exceeds the configured limit.
    #[error("payload exceeds max length: {length} > {max}")]
    PayloadTooLarge {
        /// Length declared in the header.
        length: usize,
        /// Maximum accepted length.
        max: usize,
    },
}

/// Errors raised while encoding a detection into a frame.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The detection id cannot be carried in a header.
    #[error(transparent)]
    Framing(#[from] FramingError),
    /// The envelope could not be serialized.
    #[error("failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),
}
