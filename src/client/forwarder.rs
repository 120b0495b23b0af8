//! The forwarder control loop.

use log::{debug, error, info, warn};
use tokio::{select, sync::watch, time::sleep};
use tokio_util::sync::CancellationToken;

use super::{
    ConnectionState,
    ForwarderConfig,
    ForwarderError,
    ReconnectPolicy,
    RelayConnection,
};
use crate::{
    codec::{self, EncodedFrame},
    metrics::{self, ErrorKind},
    queue::{DequeueError, DetectionReceiver},
    transport::TransportError,
};

/// Totals reported when a [`Forwarder`] stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ForwarderReport {
    /// Detections acknowledged by the relay server.
    pub sent: u64,
    /// Connections re-established after the first one.
    pub reconnects: u64,
    /// Detections abandoned because they could not be encoded or exhausted
    /// their send attempts.
    pub rejected: u64,
}

/// A detection encoded for transmission, with its exchange attempts so far.
struct Outbound {
    frame: EncodedFrame,
    attempts: u32,
}

/// Why the ready loop handed control back to the connect loop.
enum Interrupted {
    /// Shutdown requested or the queue closed and drained.
    Finished,
    /// The connection failed; the detection in flight, if any, is returned.
    Broken(TransportError, Option<Outbound>),
}

/// Sends detections from a queue to the relay server.
///
/// # Examples
///
/// ```no_run
/// use firerelay::{
///     client::{Forwarder, ForwarderConfig},
///     queue::DetectionQueue,
/// };
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (receiver, sender) = DetectionQueue::builder().build()?;
/// let forwarder = Forwarder::new(ForwarderConfig::new("127.0.0.1:16551"));
/// let shutdown = CancellationToken::new();
/// let task = tokio::spawn(async move { forwarder.run(receiver, shutdown).await });
/// drop(sender);
/// let report = task.await??;
/// println!("sent {} detections", report.sent);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Forwarder {
    config: ForwarderConfig,
    state: watch::Sender<ConnectionState>,
}

impl Forwarder {
    /// Create a forwarder in the [`ConnectionState::Disconnected`] state.
    #[must_use]
    pub fn new(config: ForwarderConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self { config, state }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ForwarderConfig { &self.config }

    /// Subscribe to connection state transitions.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ConnectionState> { self.state.subscribe() }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("forwarder state: from={previous}, to={next}");
        }
    }

    /// Forward detections until the queue is closed and drained or
    /// `shutdown` is cancelled.
    ///
    /// Under [`ReconnectPolicy::Always`] a failed exchange triggers a
    /// reconnect and the same detection is sent again first, so delivery is
    /// at-least-once and queue order is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`ForwarderError::Connect`] once `max_connect_attempts`
    /// consecutive connection attempts have failed, and
    /// [`ForwarderError::Transport`] when a live connection fails under
    /// [`ReconnectPolicy::ConnectOnly`].
    pub async fn run(
        &self,
        mut receiver: DetectionReceiver,
        shutdown: CancellationToken,
    ) -> Result<ForwarderReport, ForwarderError> {
        let result = self.drive(&mut receiver, &shutdown).await;
        self.set_state(ConnectionState::Terminated);
        match &result {
            Ok(report) => info!(
                "forwarder stopped: sent={}, reconnects={}, rejected={}",
                report.sent, report.reconnects, report.rejected
            ),
            Err(e) => error!("forwarder failed: error={e}, addr={}", self.config.addr()),
        }
        result
    }

    async fn drive(
        &self,
        receiver: &mut DetectionReceiver,
        shutdown: &CancellationToken,
    ) -> Result<ForwarderReport, ForwarderError> {
        let mut report = ForwarderReport::default();
        let mut pending: Option<Outbound> = None;
        let mut connected_before = false;
        loop {
            let Some(mut conn) = self.connect(shutdown).await? else {
                break;
            };
            if connected_before {
                report.reconnects += 1;
                metrics::inc_reconnects();
            }
            connected_before = true;

            match self
                .serve(&mut conn, receiver, shutdown, &mut pending, &mut report)
                .await
            {
                Interrupted::Finished => break,
                Interrupted::Broken(err, failed) => {
                    metrics::inc_errors(ErrorKind::Transport);
                    if self.config.reconnect_policy() == ReconnectPolicy::ConnectOnly {
                        return Err(err.into());
                    }
                    warn!("relay connection lost: error={err}, addr={}", self.config.addr());
                    pending = failed.and_then(|outbound| self.retain(outbound, &mut report));
                    self.set_state(ConnectionState::Disconnected);
                }
            }
        }
        if let Some(outbound) = pending {
            warn!(
                "detection not delivered before shutdown: id={}",
                outbound.frame.header.id()
            );
        }
        Ok(report)
    }

    /// Keep a detection whose exchange failed, unless it has used up its
    /// attempts.
    fn retain(&self, outbound: Outbound, report: &mut ForwarderReport) -> Option<Outbound> {
        if outbound.attempts < self.config.send_attempt_limit() {
            return Some(outbound);
        }
        error!(
            "dropping detection after repeated failures: id={}, attempts={}",
            outbound.frame.header.id(),
            outbound.attempts
        );
        report.rejected += 1;
        None
    }

    /// Connect with back-off. `Ok(None)` means shutdown was requested.
    async fn connect(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<Option<RelayConnection>, ForwarderError> {
        let backoff = self.config.backoff_config();
        let addr = self.config.addr();
        let mut delay = backoff.initial_delay;
        let mut attempts = 0u32;
        loop {
            self.set_state(ConnectionState::Connecting);
            attempts += 1;
            let result = select! {
                biased;

                () = shutdown.cancelled() => return Ok(None),
                res = RelayConnection::connect(addr, self.config.io_timeout_limit()) => res,
            };
            match result {
                Ok(conn) => {
                    info!("connected to relay server: addr={addr}, attempts={attempts}");
                    self.set_state(ConnectionState::Ready);
                    return Ok(Some(conn));
                }
                Err(source) => {
                    self.set_state(ConnectionState::Disconnected);
                    if self
                        .config
                        .connect_attempt_limit()
                        .is_some_and(|limit| attempts >= limit)
                    {
                        return Err(ForwarderError::Connect {
                            addr: addr.to_owned(),
                            attempts,
                            source,
                        });
                    }
                    warn!(
                        "connect failed: error={source}, addr={addr}, attempt={attempts}, \
                         retry_in={delay:?}"
                    );
                    select! {
                        biased;

                        () = shutdown.cancelled() => return Ok(None),
                        () = sleep(delay) => {}
                    }
                    delay = backoff.next_delay(delay);
                }
            }
        }
    }

    /// Run exchanges over `conn` until it breaks or the forwarder finishes.
    async fn serve(
        &self,
        conn: &mut RelayConnection,
        receiver: &mut DetectionReceiver,
        shutdown: &CancellationToken,
        pending: &mut Option<Outbound>,
        report: &mut ForwarderReport,
    ) -> Interrupted {
        loop {
            let mut outbound = match pending.take() {
                Some(outbound) => outbound,
                None => {
                    let dequeued = select! {
                        biased;

                        () = shutdown.cancelled() => return Interrupted::Finished,
                        res = receiver.dequeue(self.config.poll_interval_limit()) => res,
                        err = conn.closed() => return Interrupted::Broken(err, None),
                    };
                    let detection = match dequeued {
                        Ok(detection) => detection,
                        Err(DequeueError::Empty) => continue,
                        Err(DequeueError::Closed) => return Interrupted::Finished,
                    };
                    match codec::encode(&detection) {
                        Ok(frame) => Outbound { frame, attempts: 0 },
                        Err(e) => {
                            warn!("dropping unencodable detection: id={}, error={e}", detection.id);
                            report.rejected += 1;
                            continue;
                        }
                    }
                }
            };

            self.set_state(ConnectionState::Sending);
            outbound.attempts += 1;
            if let Err(err) = conn.exchange(&outbound.frame).await {
                return Interrupted::Broken(err, Some(outbound));
            }
            report.sent += 1;
            metrics::inc_forwarded();
            info!(
                "detection forwarded: id={}, payload_len={}",
                outbound.frame.header.id(),
                outbound.frame.payload.len()
            );
            self.set_state(ConnectionState::Ready);
        }
    }
}
