//! Builder for configuring the detection queue.

use std::sync::{Arc, atomic::AtomicUsize};

use tokio::sync::mpsc;

use super::{
    DEFAULT_QUEUE_CAPACITY,
    DetectionReceiver,
    DetectionSender,
    OverflowPolicy,
    QueueConfigError,
};

/// Builder for the detection queue.
///
/// Defaults to [`DEFAULT_QUEUE_CAPACITY`] entries and
/// [`OverflowPolicy::ReturnError`]. Construct via
/// [`super::DetectionQueue::builder`] or [`Default::default`].
#[derive(Clone, Copy, Debug)]
pub struct DetectionQueueBuilder {
    capacity: usize,
    policy: OverflowPolicy,
}

impl Default for DetectionQueueBuilder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            policy: OverflowPolicy::default(),
        }
    }
}

impl DetectionQueueBuilder {
    /// Set the maximum number of queued detections.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the behaviour of non-blocking enqueues on a full queue.
    #[must_use]
    pub fn policy(mut self, policy: OverflowPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the receiver and its paired sender.
    ///
    /// # Errors
    ///
    /// Returns [`QueueConfigError::InvalidCapacity`] if the capacity is zero.
    pub fn build(self) -> Result<(DetectionReceiver, DetectionSender), QueueConfigError> {
        if self.capacity == 0 {
            return Err(QueueConfigError::InvalidCapacity(self.capacity));
        }
        let (tx, rx) = mpsc::channel(self.capacity);
        Ok((
            DetectionReceiver { rx },
            DetectionSender {
                tx,
                policy: self.policy,
                dropped: Arc::new(AtomicUsize::new(0)),
            },
        ))
    }
}
