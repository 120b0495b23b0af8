//! Tests for detection queue overflow behaviour and its logging.

use firerelay::queue::{DetectionQueue, DetectionQueueBuilder, OverflowPolicy, QueueError};
use firerelay_testing::{LoggerHandle, logger, sample_detection};
use rstest::{fixture, rstest};
use serial_test::serial;

#[expect(
    unused_braces,
    reason = "rustc false positive for single-line rstest fixtures"
)]
#[allow(unfulfilled_lint_expectations)]
#[fixture]
fn full_queue() -> DetectionQueueBuilder { DetectionQueue::builder().capacity(1) }

#[derive(Clone, Copy)]
struct PolicyCase {
    policy: OverflowPolicy,
    expected: Result<(), QueueError>,
    expect_warning: bool,
}

/// Verifies how overflow policies report and log a full queue.
#[rstest]
#[case::return_error(PolicyCase { policy: OverflowPolicy::ReturnError, expected: Err(QueueError::Full), expect_warning: false })]
#[case::drop_newest(PolicyCase { policy: OverflowPolicy::DropNewest, expected: Ok(()), expect_warning: false })]
#[case::warn_and_drop(PolicyCase { policy: OverflowPolicy::WarnAndDropNewest, expected: Ok(()), expect_warning: true })]
#[serial(queue_policies)]
fn overflow_policy_behaviour(
    mut logger: LoggerHandle,
    full_queue: DetectionQueueBuilder,
    #[case] case: PolicyCase,
) {
    let (_receiver, sender) = full_queue.policy(case.policy).build().expect("queue");
    sender.try_enqueue(sample_detection("kept")).expect("first fits");
    assert_eq!(sender.try_enqueue(sample_detection("overflow")), case.expected);

    let mut warned = false;
    while let Some(record) = logger.pop() {
        let message = record.args().to_string();
        if message.contains("detection queue full") {
            assert_eq!(record.level(), log::Level::Warn);
            assert!(message.contains("overflow"), "missing id in {message}");
            warned = true;
        }
    }
    assert_eq!(warned, case.expect_warning);
}

/// Drop counts accumulate across cloned senders.
#[rstest]
#[serial(queue_policies)]
fn dropped_count_is_shared(mut logger: LoggerHandle, full_queue: DetectionQueueBuilder) {
    let (_receiver, sender) = full_queue
        .policy(OverflowPolicy::WarnAndDropNewest)
        .build()
        .expect("queue");
    let other = sender.clone();
    sender.try_enqueue(sample_detection("kept")).expect("first fits");
    for n in 0..3 {
        other
            .try_enqueue(sample_detection(&format!("extra-{n}")))
            .expect("dropping policy reports success");
    }
    assert_eq!(sender.dropped(), 3);
    assert_eq!(other.dropped(), 3);
    logger.clear();
}
