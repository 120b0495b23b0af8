//! Fire detection events and their JSON wire envelope.
//!
//! A [`Detection`] is produced on the edge device once telemetry and the
//! captured image have been correlated. It travels to the ground station as
//! an [`Envelope`], a single JSON document whose image bytes are base64
//! encoded. The ground station persists the [`Telemetry`] projection of the
//! envelope alongside the decoded image.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Extension assumed when a producer cannot infer one.
pub const DEFAULT_IMAGE_EXTENSION: &str = "jpg";

/// Errors raised while decoding an [`Envelope`] or building an [`Image`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not a JSON envelope with every required field.
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
    /// The image payload is not valid base64.
    #[error("image payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// A field decoded but violates its constraints.
    #[error("envelope field `{field}` is invalid: {reason}")]
    InvalidField {
        /// Name of the offending field on the wire.
        field: &'static str,
        /// Constraint that was violated.
        reason: &'static str,
    },
    /// The envelope describes a different detection than its frame header.
    #[error("envelope id {envelope:?} does not match header id {header:?}")]
    IdMismatch {
        /// Id announced in the frame header.
        header: String,
        /// Id carried inside the envelope.
        envelope: String,
    },
}

/// Position and attitude of the airframe when an image was captured.
///
/// Field names on the wire follow the telemetry bus (`time`, `lat`, `lon`,
/// ...). The same shape is persisted as the telemetry artifact, so field
/// order here is the order written to disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// GPS timestamp in microseconds since the Unix epoch.
    #[serde(rename = "time")]
    pub captured_at: u64,
    /// Latitude in degrees.
    #[serde(rename = "lat")]
    pub latitude: f64,
    /// Longitude in degrees.
    #[serde(rename = "lon")]
    pub longitude: f64,
    /// Absolute altitude in metres.
    #[serde(rename = "alt")]
    pub altitude: f64,
    /// Yaw in degrees.
    pub yaw: f64,
    /// Pitch in degrees.
    pub pitch: f64,
    /// Roll in degrees.
    pub roll: f64,
    /// Ground speed in miles per hour.
    pub speed: f64,
}

/// Captured image bytes tagged with a lowercase file extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    bytes: Bytes,
    extension: String,
}

impl Image {
    /// Create an image, normalising `extension` to lowercase without a
    /// leading dot.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidField`] if the extension is empty or
    /// contains anything other than ASCII letters and digits.
    ///
    /// # Examples
    ///
    /// ```
    /// use firerelay::detection::Image;
    ///
    /// let image = Image::new(vec![0xff, 0xd8], ".JPG").expect("valid extension");
    /// assert_eq!(image.extension(), "jpg");
    /// assert!(Image::new(Vec::new(), "../jpg").is_err());
    /// ```
    pub fn new(bytes: impl Into<Bytes>, extension: &str) -> Result<Self, DecodeError> {
        let extension = extension.strip_prefix('.').unwrap_or(extension);
        if extension.is_empty() {
            return Err(DecodeError::InvalidField {
                field: "image.ext",
                reason: "must not be empty",
            });
        }
        if !extension.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(DecodeError::InvalidField {
                field: "image.ext",
                reason: "must contain only ASCII letters and digits",
            });
        }
        Ok(Self {
            bytes: bytes.into(),
            extension: extension.to_ascii_lowercase(),
        })
    }

    /// Raw image bytes.
    #[must_use]
    pub fn bytes(&self) -> &Bytes { &self.bytes }

    /// Lowercase extension without a leading dot.
    #[must_use]
    pub fn extension(&self) -> &str { &self.extension }
}

/// A fire alert: telemetry, classifier confidence and the captured image.
///
/// `id` identifies the detection end to end. It names the persisted
/// artifacts and is echoed back by the ground station as the receipt, so it
/// must stay the same when a detection is retransmitted.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// Caller supplied unique identifier.
    pub id: String,
    /// Airframe telemetry at capture time.
    pub telemetry: Telemetry,
    /// Classifier confidence between 0 and 100.
    pub confidence: f64,
    /// Captured image.
    pub image: Image,
}

impl Detection {
    /// Bundle the parts of a detection.
    #[must_use]
    pub fn new(id: impl Into<String>, telemetry: Telemetry, confidence: f64, image: Image) -> Self {
        Self {
            id: id.into(),
            telemetry,
            confidence,
            image,
        }
    }
}

/// Image section of an [`Envelope`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeImage {
    /// Base64 text of the raw image bytes.
    pub b64: String,
    /// Lowercase extension without a leading dot.
    pub ext: String,
}

/// Serialized form of a [`Detection`] sent over the wire.
///
/// Every field is required; decoding an envelope that lacks one fails
/// instead of surfacing later as a missing value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Detection id.
    pub uuid: String,
    /// See [`Telemetry::captured_at`].
    pub time: u64,
    /// See [`Telemetry::latitude`].
    pub lat: f64,
    /// See [`Telemetry::longitude`].
    pub lon: f64,
    /// See [`Telemetry::altitude`].
    pub alt: f64,
    /// See [`Telemetry::yaw`].
    pub yaw: f64,
    /// See [`Telemetry::pitch`].
    pub pitch: f64,
    /// See [`Telemetry::roll`].
    pub roll: f64,
    /// See [`Telemetry::speed`].
    pub speed: f64,
    /// Classifier confidence.
    pub accuracy: f64,
    /// Encoded image.
    pub image: EnvelopeImage,
}

impl Envelope {
    /// Build the envelope for `detection`, base64 encoding its image.
    #[must_use]
    pub fn from_detection(detection: &Detection) -> Self {
        let Telemetry {
            captured_at,
            latitude,
            longitude,
            altitude,
            yaw,
            pitch,
            roll,
            speed,
        } = detection.telemetry;
        Self {
            uuid: detection.id.clone(),
            time: captured_at,
            lat: latitude,
            lon: longitude,
            alt: altitude,
            yaw,
            pitch,
            roll,
            speed,
            accuracy: detection.confidence,
            image: EnvelopeImage {
                b64: BASE64.encode(detection.image.bytes()),
                ext: detection.image.extension().to_owned(),
            },
        }
    }

    /// Serialize the envelope as compact UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> { serde_json::to_vec(self) }

    /// Parse an envelope from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Json`] if the bytes are not a JSON envelope with
    /// every required field and [`DecodeError::InvalidField`] if `uuid` is
    /// empty.
    pub fn from_json(bytes: &[u8]) -> Result<Self, DecodeError> {
        let envelope: Self = serde_json::from_slice(bytes)?;
        if envelope.uuid.is_empty() {
            return Err(DecodeError::InvalidField {
                field: "uuid",
                reason: "must not be empty",
            });
        }
        Ok(envelope)
    }

    /// Telemetry fields of the envelope.
    #[must_use]
    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            captured_at: self.time,
            latitude: self.lat,
            longitude: self.lon,
            altitude: self.alt,
            yaw: self.yaw,
            pitch: self.pitch,
            roll: self.roll,
            speed: self.speed,
        }
    }

    /// Decode the image and rebuild the [`Detection`].
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Base64`] if the image text is not base64 and
    /// [`DecodeError::InvalidField`] if the extension is unusable.
    pub fn into_detection(self) -> Result<Detection, DecodeError> {
        let telemetry = self.telemetry();
        let bytes = BASE64.decode(self.image.b64.as_bytes())?;
        let image = Image::new(bytes, &self.image.ext)?;
        Ok(Detection::new(self.uuid, telemetry, self.accuracy, image))
    }
}
