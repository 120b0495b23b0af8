//! Error types for detection queue operations and configuration.

use thiserror::Error;

/// Errors that can occur when enqueuing a detection.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was at capacity and the policy was `ReturnError`.
    #[error("detection queue full")]
    Full,
    /// The forwarder side of the queue has been dropped.
    #[error("detection queue closed")]
    Closed,
}

/// Errors returned by [`super::DetectionReceiver::dequeue`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DequeueError {
    /// No detection arrived before the timeout.
    #[error("no detection available")]
    Empty,
    /// Every producer is gone and the queue is drained.
    #[error("detection queue closed")]
    Closed,
}

/// Errors returned when creating a detection queue.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueConfigError {
    /// The provided capacity was zero.
    #[error("invalid capacity {0}; must be >= 1")]
    InvalidCapacity(usize),
}
