//! Configuration for [`Forwarder`](super::Forwarder).

use std::time::Duration;

use crate::{backoff::BackoffConfig, transport::DEFAULT_IO_TIMEOUT};

/// How long the forwarder waits on an empty queue before polling again.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Exchanges attempted for one detection before it is abandoned.
pub const DEFAULT_MAX_SEND_ATTEMPTS: u32 = 5;

/// What the forwarder does when an established connection fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Reconnect with back-off and retransmit the interrupted detection.
    #[default]
    Always,
    /// Retry only while establishing the first connection; a failure on a
    /// live connection ends the forwarder.
    ConnectOnly,
}

impl ReconnectPolicy {
    /// Connection back-off applied when this policy is selected.
    ///
    /// [`Always`](Self::Always) backs off from one second up to thirty;
    /// [`ConnectOnly`](Self::ConnectOnly) retries every second.
    #[must_use]
    pub const fn default_backoff(self) -> BackoffConfig {
        match self {
            Self::Always => BackoffConfig {
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
            },
            Self::ConnectOnly => BackoffConfig::fixed(Duration::from_secs(1)),
        }
    }
}

/// Settings for a [`Forwarder`](super::Forwarder).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use firerelay::client::{ForwarderConfig, ReconnectPolicy};
///
/// let config = ForwarderConfig::new("127.0.0.1:16551")
///     .reconnect(ReconnectPolicy::ConnectOnly)
///     .max_connect_attempts(Some(3))
///     .io_timeout(Duration::from_secs(5));
/// assert_eq!(config.addr(), "127.0.0.1:16551");
/// assert_eq!(config.reconnect_policy(), ReconnectPolicy::ConnectOnly);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwarderConfig {
    addr: String,
    backoff: BackoffConfig,
    io_timeout: Duration,
    poll_interval: Duration,
    reconnect: ReconnectPolicy,
    max_connect_attempts: Option<u32>,
    max_send_attempts: u32,
}

impl ForwarderConfig {
    /// Forward to the relay server at `addr` (`host:port`).
    ///
    /// Reconnects back off from one second up to thirty.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            backoff: ReconnectPolicy::Always.default_backoff(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect: ReconnectPolicy::default(),
            max_connect_attempts: None,
            max_send_attempts: DEFAULT_MAX_SEND_ATTEMPTS,
        }
    }

    /// Back-off between connection attempts.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff.normalized();
        self
    }

    /// Deadline for connecting and for each socket operation of an exchange.
    #[must_use]
    pub fn io_timeout(mut self, limit: Duration) -> Self {
        self.io_timeout = limit;
        self
    }

    /// Wait applied to each dequeue before the forwarder checks for
    /// shutdown again.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Behaviour after a live connection fails.
    ///
    /// Also resets the back-off to [`ReconnectPolicy::default_backoff`]; call
    /// [`backoff`](Self::backoff) afterwards to override it.
    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self.backoff = policy.default_backoff();
        self
    }

    /// Give up after this many consecutive failed connection attempts.
    /// `None` retries forever.
    #[must_use]
    pub fn max_connect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_connect_attempts = attempts.map(|n| n.max(1));
        self
    }

    /// Abandon a detection after this many interrupted exchanges. Values
    /// below one are raised to one.
    #[must_use]
    pub fn max_send_attempts(mut self, attempts: u32) -> Self {
        self.max_send_attempts = attempts.max(1);
        self
    }

    /// Relay server address.
    #[must_use]
    pub fn addr(&self) -> &str { &self.addr }

    /// Connection back-off.
    #[must_use]
    pub fn backoff_config(&self) -> BackoffConfig { self.backoff }

    /// Per-operation deadline.
    #[must_use]
    pub fn io_timeout_limit(&self) -> Duration { self.io_timeout }

    /// Dequeue wait.
    #[must_use]
    pub fn poll_interval_limit(&self) -> Duration { self.poll_interval }

    /// Reconnect behaviour.
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy { self.reconnect }

    /// Connection attempt limit.
    #[must_use]
    pub fn connect_attempt_limit(&self) -> Option<u32> { self.max_connect_attempts }

    /// Per-detection exchange limit.
    #[must_use]
    pub fn send_attempt_limit(&self) -> u32 { self.max_send_attempts }
}
