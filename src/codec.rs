//! Framing rules of the detection relay protocol.
//!
//! One detection crosses the wire in four steps on a persistent connection:
//!
//! | Step | Direction       | Bytes                                  |
//! |------|-----------------|----------------------------------------|
//! | 1    | client → server | ASCII header `"<id>,<length>"`         |
//! | 2    | server → client | [`READY_TOKEN`]                        |
//! | 3    | client → server | exactly `<length>` bytes of JSON       |
//! | 4    | server → client | `<id>` bytes, once the detection is stored |
//!
//! The header carries no terminator. Both peers rely on the lock-step
//! exchange: the client never writes the payload before the ready token
//! arrives, so whatever a single read returns is the complete header.

use std::str;

use bytes::Bytes;

use crate::detection::{Detection, Envelope};

pub mod error;

pub use error::{EncodeError, FramingError};

/// Token the server sends once it is ready to receive a payload.
pub const READY_TOKEN: &[u8; 9] = b"NAME_SIZE";

/// Upper bound on the size of a header read.
pub const MAX_HEADER_LEN: usize = 1024;

/// Default upper bound on declared payload lengths (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 64 * 1024 * 1024;

const FIELD_SEPARATOR: char = ',';

/// The `id,length` line announcing a payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    id: String,
    length: usize,
}

impl FrameHeader {
    /// Create a header announcing `length` payload bytes for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::InvalidId`] if `id` is empty or contains the
    /// field separator, and [`FramingError::HeaderTooLong`] if the encoded
    /// header would not fit in a single header read.
    pub fn new(id: impl Into<String>, length: usize) -> Result<Self, FramingError> {
        let id = id.into();
        if id.is_empty() || id.contains(FIELD_SEPARATOR) {
            return Err(FramingError::InvalidId(id));
        }
        let header = Self { id, length };
        let size = header.encoded_len();
        if size > MAX_HEADER_LEN {
            return Err(FramingError::HeaderTooLong {
                size,
                max: MAX_HEADER_LEN,
            });
        }
        Ok(header)
    }

    /// Detection id announced by the header.
    #[must_use]
    pub fn id(&self) -> &str { &self.id }

    /// Declared payload length in bytes.
    #[must_use]
    pub fn length(&self) -> usize { self.length }

    fn encoded_len(&self) -> usize { self.id.len() + 1 + self.length.to_string().len() }

    /// Render the header as sent on the wire.
    ///
    /// # Examples
    ///
    /// ```
    /// use firerelay::codec::FrameHeader;
    ///
    /// let header = FrameHeader::new("a1", 512).expect("valid header");
    /// assert_eq!(&header.to_bytes()[..], b"a1,512");
    /// ```
    #[must_use]
    pub fn to_bytes(&self) -> Bytes { Bytes::from(format!("{},{}", self.id, self.length)) }

    /// Interpret the bytes of one header read.
    ///
    /// Fields beyond the second are ignored. Whitespace around the length is
    /// tolerated so a trailing newline from a hand-written client still
    /// decodes.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::MissingFields`] if fewer than two fields are
    /// present, [`FramingError::InvalidLength`] if the second field is not a
    /// non-negative integer, [`FramingError::InvalidId`] for an empty id, and
    /// [`FramingError::NotUtf8`] for non-text input.
    ///
    /// # Examples
    ///
    /// ```
    /// use firerelay::codec::{FramingError, FrameHeader};
    ///
    /// let header = FrameHeader::decode(b"a1,12").expect("valid header");
    /// assert_eq!((header.id(), header.length()), ("a1", 12));
    /// assert_eq!(
    ///     FrameHeader::decode(b"a1"),
    ///     Err(FramingError::MissingFields { found: 1 })
    /// );
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Self, FramingError> {
        let text = str::from_utf8(buf).map_err(|_| FramingError::NotUtf8)?;
        let mut fields = text.split(FIELD_SEPARATOR);
        let (Some(id), Some(length)) = (fields.next(), fields.next()) else {
            return Err(FramingError::MissingFields {
                found: text.split(FIELD_SEPARATOR).count(),
            });
        };
        if id.is_empty() {
            return Err(FramingError::InvalidId(String::new()));
        }
        let length = length
            .trim()
            .parse::<usize>()
            .map_err(|_| FramingError::InvalidLength(length.to_owned()))?;
        Ok(Self {
            id: id.to_owned(),
            length,
        })
    }
}

/// A detection ready for transmission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Header announcing the payload.
    pub header: FrameHeader,
    /// UTF-8 JSON envelope.
    pub payload: Bytes,
}

/// Serialize `detection` into a header and payload pair.
///
/// # Errors
///
/// Returns [`EncodeError::Framing`] if the id cannot be carried in a header
/// and [`EncodeError::Serialize`] if the envelope cannot be serialized.
pub fn encode(detection: &Detection) -> Result<EncodedFrame, EncodeError> {
    let payload = Bytes::from(Envelope::from_detection(detection).to_json()?);
    let header = FrameHeader::new(detection.id.clone(), payload.len())?;
    Ok(EncodedFrame { header, payload })
}
