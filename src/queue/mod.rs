//! Bounded hand-off between a detection producer and the forwarder.
//!
//! Producers hold a cloneable [`DetectionSender`]; the forwarder owns the
//! single [`DetectionReceiver`]. Detections are delivered in FIFO order.
//! The queue always has a capacity: [`DetectionSender::enqueue`] waits for
//! space, while [`DetectionSender::try_enqueue`] never waits and applies the
//! configured [`OverflowPolicy`] instead.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{sync::mpsc, time::timeout};
use tracing::{debug, warn};

mod builder;
mod errors;

pub use builder::DetectionQueueBuilder;
pub use errors::{DequeueError, QueueConfigError, QueueError};

use crate::detection::Detection;

/// Capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Behaviour of [`DetectionSender::try_enqueue`] when the queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Return [`QueueError::Full`] and hand the decision to the caller.
    #[default]
    ReturnError,
    /// Silently discard the incoming detection.
    DropNewest,
    /// Discard the incoming detection and emit a warning.
    WarnAndDropNewest,
}

/// Entry point for building a detection queue.
#[derive(Debug)]
pub struct DetectionQueue;

impl DetectionQueue {
    /// Start building a new queue.
    ///
    /// # Examples
    ///
    /// ```
    /// use firerelay::queue::{DetectionQueue, OverflowPolicy};
    ///
    /// let (_receiver, _sender) = DetectionQueue::builder()
    ///     .capacity(16)
    ///     .policy(OverflowPolicy::WarnAndDropNewest)
    ///     .build()
    ///     .expect("valid queue configuration");
    /// ```
    #[must_use]
    pub fn builder() -> DetectionQueueBuilder { DetectionQueueBuilder::default() }
}

/// Cloneable producer handle.
#[derive(Clone, Debug)]
pub struct DetectionSender {
    tx: mpsc::Sender<Detection>,
    policy: OverflowPolicy,
    dropped: Arc<AtomicUsize>,
}

impl DetectionSender {
    /// Enqueue `detection`, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the receiver has been dropped.
    pub async fn enqueue(&self, detection: Detection) -> Result<(), QueueError> {
        let id = detection.id.clone();
        self.tx
            .send(detection)
            .await
            .map_err(|_| QueueError::Closed)?;
        debug!(%id, "detection enqueued");
        Ok(())
    }

    /// Enqueue `detection` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] if the queue is full and the policy is
    /// [`OverflowPolicy::ReturnError`], and [`QueueError::Closed`] if the
    /// receiver has been dropped. Dropping policies report success.
    pub fn try_enqueue(&self, detection: Detection) -> Result<(), QueueError> {
        match self.tx.try_send(detection) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(detection)) => match self.policy {
                OverflowPolicy::ReturnError => Err(QueueError::Full),
                OverflowPolicy::DropNewest | OverflowPolicy::WarnAndDropNewest => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if self.policy == OverflowPolicy::WarnAndDropNewest {
                        warn!(id = %detection.id, dropped, "detection queue full");
                    }
                    Ok(())
                }
            },
            Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// Number of detections discarded by the overflow policy so far.
    #[must_use]
    pub fn dropped(&self) -> usize { self.dropped.load(Ordering::Relaxed) }

    /// Configured overflow policy.
    #[must_use]
    pub fn policy(&self) -> OverflowPolicy { self.policy }
}

/// Consumer end owned by the forwarder.
#[derive(Debug)]
pub struct DetectionReceiver {
    rx: mpsc::Receiver<Detection>,
}

impl DetectionReceiver {
    /// Wait up to `wait` for the next detection.
    ///
    /// # Errors
    ///
    /// Returns [`DequeueError::Empty`] on timeout and [`DequeueError::Closed`]
    /// once every sender is dropped and the queue is drained.
    pub async fn dequeue(&mut self, wait: Duration) -> Result<Detection, DequeueError> {
        match timeout(wait, self.rx.recv()).await {
            Ok(Some(detection)) => Ok(detection),
            Ok(None) => Err(DequeueError::Closed),
            Err(_) => Err(DequeueError::Empty),
        }
    }

    /// Number of detections waiting.
    #[must_use]
    pub fn len(&self) -> usize { self.rx.len() }

    /// Whether no detections are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.rx.is_empty() }

    /// Stop accepting new detections. Queued detections remain available.
    pub fn close(&mut self) { self.rx.close(); }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::detection::{Image, Telemetry};

    fn detection(id: &str) -> Detection {
        Detection::new(
            id,
            Telemetry::default(),
            50.0,
            Image::new(vec![1, 2, 3], "jpg").expect("image"),
        )
    }

    #[fixture]
    fn builder() -> DetectionQueueBuilder { DetectionQueue::builder().capacity(2) }

    #[rstest]
    #[tokio::test]
    async fn delivers_in_fifo_order(builder: DetectionQueueBuilder) {
        let (mut rx, tx) = builder.capacity(8).build().expect("build queue");
        for id in ["a", "b", "c"] {
            tx.enqueue(detection(id)).await.expect("enqueue");
        }
        for id in ["a", "b", "c"] {
            let got = rx.dequeue(Duration::from_secs(1)).await.expect("dequeue");
            assert_eq!(got.id, id);
        }
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn dequeue_times_out_when_empty(builder: DetectionQueueBuilder) {
        let (mut rx, _tx) = builder.build().expect("build queue");
        assert_eq!(
            rx.dequeue(Duration::from_secs(1)).await,
            Err(DequeueError::Empty)
        );
    }

    #[rstest]
    #[tokio::test]
    async fn dequeue_reports_closed_after_drain(builder: DetectionQueueBuilder) {
        let (mut rx, tx) = builder.build().expect("build queue");
        tx.enqueue(detection("a")).await.expect("enqueue");
        drop(tx);
        assert!(rx.dequeue(Duration::from_secs(1)).await.is_ok());
        assert_eq!(
            rx.dequeue(Duration::from_secs(1)).await,
            Err(DequeueError::Closed)
        );
    }

    #[rstest]
    #[case(OverflowPolicy::ReturnError, Err(QueueError::Full), 0)]
    #[case(OverflowPolicy::DropNewest, Ok(()), 1)]
    #[case(OverflowPolicy::WarnAndDropNewest, Ok(()), 1)]
    #[tokio::test]
    async fn overflow_policy_applies_when_full(
        builder: DetectionQueueBuilder,
        #[case] policy: OverflowPolicy,
        #[case] expected: Result<(), QueueError>,
        #[case] dropped: usize,
    ) {
        let (mut rx, tx) = builder.policy(policy).build().expect("build queue");
        tx.try_enqueue(detection("a")).expect("first fits");
        tx.try_enqueue(detection("b")).expect("second fits");
        assert_eq!(tx.try_enqueue(detection("c")), expected);
        assert_eq!(tx.dropped(), dropped);

        let first = rx.dequeue(Duration::from_secs(1)).await.expect("dequeue");
        assert_eq!(first.id, "a");
        assert_eq!(rx.len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn enqueue_waits_for_space(builder: DetectionQueueBuilder) {
        let (mut rx, tx) = builder.capacity(1).build().expect("build queue");
        tx.enqueue(detection("a")).await.expect("enqueue");
        let producer = tokio::spawn({
            let tx = tx.clone();
            async move { tx.enqueue(detection("b")).await }
        });
        tokio::task::yield_now().await;
        assert!(!producer.is_finished());

        assert_eq!(
            rx.dequeue(Duration::from_secs(1)).await.expect("dequeue").id,
            "a"
        );
        producer.await.expect("join").expect("enqueue after space");
        assert_eq!(
            rx.dequeue(Duration::from_secs(1)).await.expect("dequeue").id,
            "b"
        );
    }

    #[rstest]
    #[tokio::test]
    async fn enqueue_fails_once_receiver_is_gone(builder: DetectionQueueBuilder) {
        let (rx, tx) = builder.build().expect("build queue");
        drop(rx);
        assert_eq!(tx.enqueue(detection("a")).await, Err(QueueError::Closed));
        assert_eq!(tx.try_enqueue(detection("a")), Err(QueueError::Closed));
    }
}
