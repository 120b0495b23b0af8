//! Alert intake: turns classifier alerts into queued detections.
//!
//! The on-board classifier publishes alerts on a ZeroMQ PUB socket as
//! two-frame messages: an `Alert` topic frame followed by a JSON frame
//! carrying `{"filename": "...", "accuracy": ...}`. The JSON may itself
//! arrive wrapped in a JSON string. Single-frame `"<topic> <json>"` messages
//! are accepted too. Each alert is correlated with the telemetry record that
//! the capture pipeline writes next to the image directory:
//!
//! ```text
//! <root>/imagery/<stem>.<ext>   image named in the alert
//! <root>/telemetry/<stem>       {"time", "lat", "lon", "alt", ...}
//! ```
//!
//! The telemetry file may lag the alert, so intake polls for it before
//! building the [`Detection`] whose id is the image stem.

use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use bytes::Bytes;
use log::{debug, info, warn};
use serde::Deserialize;
use thiserror::Error;
use tokio::{fs, select, time::sleep};
use tokio_util::sync::CancellationToken;
use zeromq::{Socket, SocketRecv, SubSocket, ZmqError};

use crate::{
    backoff::BackoffConfig,
    detection::{DEFAULT_IMAGE_EXTENSION, DecodeError, Detection, Image, Telemetry},
    queue::{DetectionSender, QueueError},
    store::TELEMETRY_DIR,
};

/// Topic carrying classifier alerts.
pub const ALERT_TOPIC: &str = "Alert";
/// Interval between checks for a telemetry file that has not appeared yet.
pub const TELEMETRY_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// How long an alert waits for its telemetry before it is skipped.
pub const DEFAULT_TELEMETRY_WAIT: Duration = Duration::from_secs(30);

/// Errors raised while reading or correlating alerts.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// The bus URL is not `tcp://host:port`.
    #[error("unsupported alert bus url {0:?}: expected tcp://host:port")]
    InvalidUrl(String),
    /// A bus message lacks a topic.
    #[error("alert message has no topic")]
    MissingTopic,
    /// A single-frame message is not text.
    #[error("alert message is not UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    /// The alert body is not the expected JSON.
    #[error("malformed alert: {0}")]
    Json(#[from] serde_json::Error),
    /// The image path has no usable file stem.
    #[error("alert filename {0:?} has no file stem")]
    InvalidFilename(PathBuf),
    /// The telemetry file did not appear in time.
    #[error("telemetry {path:?} did not appear within {waited:?}")]
    TelemetryMissing {
        /// Expected telemetry location.
        path: PathBuf,
        /// Time spent waiting.
        waited: Duration,
    },
    /// A referenced file could not be read.
    #[error("failed to read {path:?}: {source}")]
    Read {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The image could not be wrapped as a detection image.
    #[error(transparent)]
    Image(#[from] DecodeError),
}

/// A classifier alert.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Alert {
    /// Path of the image that triggered the alert.
    pub filename: PathBuf,
    /// Classifier confidence between 0 and 100.
    pub accuracy: f64,
}

impl Alert {
    /// Parse the frames of one bus message. Messages on other topics yield
    /// `Ok(None)`.
    ///
    /// A two-frame message is `[topic, json]`; a single frame is handed to
    /// [`Alert::parse_line`].
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::MissingTopic`], [`IntakeError::Encoding`] or
    /// [`IntakeError::Json`] if an `Alert` message is malformed.
    ///
    /// # Examples
    ///
    /// ```
    /// use bytes::Bytes;
    /// use firerelay::intake::Alert;
    ///
    /// let frames = [
    ///     Bytes::from_static(b"Alert"),
    ///     Bytes::from_static(br#""{\"filename\":\"/d/imagery/a1.jpg\",\"accuracy\":91.5}""#),
    /// ];
    /// let alert = Alert::parse_frames(&frames).expect("valid alert").expect("alert topic");
    /// assert_eq!(alert.id().expect("id"), "a1");
    /// ```
    pub fn parse_frames(frames: &[Bytes]) -> Result<Option<Self>, IntakeError> {
        match frames {
            [] => Err(IntakeError::MissingTopic),
            [line] => Self::parse_line(std::str::from_utf8(line)?),
            [topic, body, ..] => {
                if &topic[..] != ALERT_TOPIC.as_bytes() {
                    return Ok(None);
                }
                Self::parse_body(body).map(Some)
            }
        }
    }

    /// Parse one `"<topic> <json>"` line. Lines on other topics yield
    /// `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::MissingTopic`] or [`IntakeError::Json`] if an
    /// `Alert` line is malformed.
    ///
    /// # Examples
    ///
    /// ```
    /// use firerelay::intake::Alert;
    ///
    /// let alert = Alert::parse_line(r#"Alert {"filename":"/d/imagery/a1.jpg","accuracy":91.5}"#)
    ///     .expect("valid alert")
    ///     .expect("alert topic");
    /// assert_eq!(alert.accuracy, 91.5);
    /// assert!(Alert::parse_line("Status {}").expect("other topic").is_none());
    /// ```
    pub fn parse_line(line: &str) -> Result<Option<Self>, IntakeError> {
        let line = line.trim_end_matches('\r');
        let (topic, body) = line.split_once(' ').ok_or(IntakeError::MissingTopic)?;
        if topic != ALERT_TOPIC {
            return Ok(None);
        }
        Self::parse_body(body.as_bytes()).map(Some)
    }

    fn parse_body(body: &[u8]) -> Result<Self, IntakeError> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        let alert = match value {
            serde_json::Value::String(inner) => serde_json::from_str(&inner)?,
            other => serde_json::from_value(other)?,
        };
        Ok(alert)
    }

    /// Detection id derived from the image name.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::InvalidFilename`] if the path has no UTF-8 stem.
    pub fn id(&self) -> Result<&str, IntakeError> {
        self.filename
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| IntakeError::InvalidFilename(self.filename.clone()))
    }

    /// Location of the telemetry record for this alert's image.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::InvalidFilename`] if the path has no stem.
    pub fn telemetry_path(&self) -> Result<PathBuf, IntakeError> {
        let stem = self.id()?;
        let image_dir = self.filename.parent().unwrap_or_else(|| Path::new(""));
        let root = image_dir.parent().unwrap_or_else(|| Path::new(""));
        Ok(root.join(TELEMETRY_DIR).join(stem))
    }

    fn extension(&self) -> String {
        self.filename
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .unwrap_or(DEFAULT_IMAGE_EXTENSION)
            .to_ascii_lowercase()
    }
}

/// Settings for [`AlertIntake`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntakeConfig {
    endpoint: String,
    backoff: BackoffConfig,
    telemetry_wait: Duration,
}

impl IntakeConfig {
    /// Subscribe to the publisher at `url`, which must have the form
    /// `tcp://host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::InvalidUrl`] for any other form.
    ///
    /// # Examples
    ///
    /// ```
    /// use firerelay::intake::IntakeConfig;
    ///
    /// let config = IntakeConfig::from_url("tcp://127.0.0.1:5556").expect("valid url");
    /// assert_eq!(config.endpoint(), "tcp://127.0.0.1:5556");
    /// assert!(IntakeConfig::from_url("ipc:///tmp/alerts").is_err());
    /// ```
    pub fn from_url(url: &str) -> Result<Self, IntakeError> {
        url.strip_prefix("tcp://")
            .filter(|rest| rest.rsplit_once(':').is_some_and(|(host, port)| {
                !host.is_empty() && port.parse::<u16>().is_ok()
            }))
            .ok_or_else(|| IntakeError::InvalidUrl(url.to_owned()))?;
        Ok(Self {
            endpoint: url.to_owned(),
            backoff: BackoffConfig {
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
            },
            telemetry_wait: DEFAULT_TELEMETRY_WAIT,
        })
    }

    /// Back-off between bus connection attempts.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff.normalized();
        self
    }

    /// How long to wait for a telemetry record before skipping an alert.
    #[must_use]
    pub fn telemetry_wait(mut self, wait: Duration) -> Self {
        self.telemetry_wait = wait;
        self
    }

    /// Publisher endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str { &self.endpoint }
}

/// Totals reported when intake stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IntakeReport {
    /// Alert messages received.
    pub alerts: u64,
    /// Detections handed to the queue.
    pub enqueued: u64,
    /// Alerts that could not be turned into detections.
    pub skipped: u64,
}

/// Subscribes to the alert bus and feeds the detection queue.
#[derive(Debug)]
pub struct AlertIntake {
    config: IntakeConfig,
}

enum Flow {
    Continue,
    Stop,
}

impl AlertIntake {
    /// Create an intake for `config`.
    #[must_use]
    pub fn new(config: IntakeConfig) -> Self { Self { config } }

    /// Read alerts until `shutdown` is cancelled or the queue closes.
    ///
    /// Failed subscriptions and bus errors are retried with back-off;
    /// malformed alerts and alerts whose files cannot be read are logged and
    /// skipped.
    pub async fn run(self, sender: DetectionSender, shutdown: CancellationToken) -> IntakeReport {
        let mut report = IntakeReport::default();
        let backoff = self.config.backoff;
        let mut delay = backoff.initial_delay;
        loop {
            let connected = select! {
                biased;

                () = shutdown.cancelled() => break,
                res = self.subscribe() => res,
            };
            match connected {
                Ok(socket) => {
                    info!("alert bus subscribed: endpoint={}", self.config.endpoint());
                    delay = backoff.initial_delay;
                    if let Flow::Stop = self.consume(socket, &sender, &shutdown, &mut report).await {
                        break;
                    }
                    warn!("alert bus lost: endpoint={}", self.config.endpoint());
                }
                Err(e) => warn!(
                    "alert bus subscribe failed: error={e}, endpoint={}, retry_in={delay:?}",
                    self.config.endpoint()
                ),
            }
            select! {
                biased;

                () = shutdown.cancelled() => break,
                () = sleep(delay) => {}
            }
            delay = backoff.next_delay(delay);
        }
        info!(
            "alert intake stopped: alerts={}, enqueued={}, skipped={}",
            report.alerts, report.enqueued, report.skipped
        );
        report
    }

    async fn subscribe(&self) -> Result<SubSocket, ZmqError> {
        let mut socket = SubSocket::new();
        socket.connect(self.config.endpoint()).await?;
        socket.subscribe(ALERT_TOPIC).await?;
        Ok(socket)
    }

    async fn consume(
        &self,
        mut socket: SubSocket,
        sender: &DetectionSender,
        shutdown: &CancellationToken,
        report: &mut IntakeReport,
    ) -> Flow {
        loop {
            let next = select! {
                biased;

                () = shutdown.cancelled() => return Flow::Stop,
                next = socket.recv() => next,
            };
            let frames = match next {
                Ok(message) => message.into_vec(),
                Err(e) => {
                    warn!("alert bus read failed: error={e}");
                    return Flow::Continue;
                }
            };
            let alert = match Alert::parse_frames(&frames) {
                Ok(Some(alert)) => alert,
                Ok(None) => continue,
                Err(e) => {
                    report.skipped += 1;
                    warn!("skipping malformed alert: error={e}");
                    continue;
                }
            };
            report.alerts += 1;
            let detection = match correlate(&alert, self.config.telemetry_wait, shutdown).await {
                Ok(Some(detection)) => detection,
                Ok(None) => return Flow::Stop,
                Err(e) => {
                    report.skipped += 1;
                    warn!("skipping alert: error={e}, filename={:?}", alert.filename);
                    continue;
                }
            };
            let id = detection.id.clone();
            let queued = select! {
                biased;

                () = shutdown.cancelled() => return Flow::Stop,
                res = sender.enqueue(detection) => res,
            };
            match queued {
                Ok(()) => {
                    report.enqueued += 1;
                    debug!("detection queued: id={id}, accuracy={}", alert.accuracy);
                }
                Err(QueueError::Closed) => return Flow::Stop,
                Err(e) => {
                    report.skipped += 1;
                    warn!("detection not queued: id={id}, error={e}");
                }
            }
        }
    }
}

/// Build the detection for `alert` once its telemetry is available.
///
/// Returns `Ok(None)` if `shutdown` fires while waiting.
///
/// # Errors
///
/// Returns [`IntakeError::TelemetryMissing`] if the telemetry file does not
/// appear within `wait`, and a read, JSON or image error if either file is
/// unusable.
pub async fn correlate(
    alert: &Alert,
    wait: Duration,
    shutdown: &CancellationToken,
) -> Result<Option<Detection>, IntakeError> {
    let id = alert.id()?;
    let telemetry_path = alert.telemetry_path()?;
    let mut waited = Duration::ZERO;
    while !exists(&telemetry_path).await? {
        if waited >= wait {
            return Err(IntakeError::TelemetryMissing {
                path: telemetry_path,
                waited,
            });
        }
        select! {
            biased;

            () = shutdown.cancelled() => return Ok(None),
            () = sleep(TELEMETRY_POLL_INTERVAL) => waited += TELEMETRY_POLL_INTERVAL,
        }
    }

    let record = read(&telemetry_path).await?;
    let telemetry: Telemetry = serde_json::from_slice(&record)?;
    let bytes = read(&alert.filename).await?;
    let image = Image::new(bytes, &alert.extension())?;
    Ok(Some(Detection::new(id, telemetry, alert.accuracy, image)))
}

async fn exists(path: &Path) -> Result<bool, IntakeError> {
    fs::try_exists(path).await.map_err(|source| {
        warn!("cannot check for telemetry: error={source}, path={path:?}");
        IntakeError::Read {
            path: path.to_path_buf(),
            source,
        }
    })
}

async fn read(path: &Path) -> Result<Vec<u8>, IntakeError> {
    fs::read(path).await.map_err(|source| IntakeError::Read {
        path: path.to_path_buf(),
        source,
    })
}
