//! End-to-end tests: real background queue, hosted worker, and drain wait.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::fixtures::{active_test, enqueue_sleepers, make_test_fixture, queue_fixture};
use fixtured_unit::{
    BackgroundQueue, CancellationToken, DrainOutcome, FixtureError, QueuedHostedService,
    WorkKind,
};

#[tokio::test(start_paused = true)]
async fn waits_until_both_lanes_have_drained() {
    let (mut test, output) = active_test(queue_fixture(100)).await;
    let queue = test.resolve::<BackgroundQueue>(false).unwrap();
    let hosted = test.resolve::<QueuedHostedService>(false).unwrap();

    enqueue_sleepers(&queue, WorkKind::Immediate, 3, 300);
    enqueue_sleepers(&queue, WorkKind::Deferred, 2, 200);

    let report = test.wait_on_queue_to_empty().await.unwrap();

    assert_eq!(hosted.completed(), 5);
    assert_eq!(hosted.failed(), 0);
    assert_eq!(queue.pending(WorkKind::Immediate), 0);
    assert_eq!(queue.pending(WorkKind::Deferred), 0);
    assert!(report.elapsed >= Duration::from_millis(900));
    assert!(report.polls > 1);
    assert!(output.contains("Waiting 100ms for background queue to empty..."));
    assert!(output.contains("Background queue is empty; continuing"));

    test.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn an_idle_queue_returns_after_one_poll() {
    let (test, _) = active_test(queue_fixture(100)).await;
    let report = test.wait_on_queue_to_empty().await.unwrap();
    assert_eq!(report.polls, 1);
    assert_eq!(report.elapsed, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn failing_and_panicking_work_still_drains() {
    let (mut test, _) = active_test(queue_fixture(50)).await;
    let queue = test.resolve::<BackgroundQueue>(false).unwrap();
    let hosted = test.resolve::<QueuedHostedService>(false).unwrap();

    queue
        .enqueue(WorkKind::Immediate, async {
            tokio::time::sleep(Duration::from_millis(120)).await;
            anyhow::bail!("downstream unavailable")
        })
        .unwrap();
    queue
        .enqueue(WorkKind::Deferred, async {
            None::<()>.expect("deferred job blew up");
            Ok(())
        })
        .unwrap();
    enqueue_sleepers(&queue, WorkKind::Deferred, 1, 80);

    test.wait_on_queue_to_empty().await.unwrap();
    assert_eq!(hosted.failed(), 2);
    assert_eq!(hosted.completed(), 1);
}

#[tokio::test(start_paused = true)]
async fn work_queued_by_work_is_waited_for() {
    let (mut test, _) = active_test(queue_fixture(100)).await;
    let queue = test.resolve::<BackgroundQueue>(false).unwrap();
    let hosted = test.resolve::<QueuedHostedService>(false).unwrap();

    let follow_up = Arc::clone(&queue);
    queue
        .enqueue(WorkKind::Immediate, async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            follow_up.enqueue(WorkKind::Deferred, async {
                tokio::time::sleep(Duration::from_millis(400)).await;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();

    let report = test.wait_on_queue_to_empty().await.unwrap();
    assert_eq!(hosted.completed(), 2);
    assert!(report.elapsed >= Duration::from_millis(550));
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_wait_on_stuck_work() {
    let (mut test, _) = active_test(queue_fixture(100)).await;
    let queue = test.resolve::<BackgroundQueue>(false).unwrap();
    queue
        .enqueue(
            WorkKind::Immediate,
            std::future::pending::<anyhow::Result<()>>(),
        )
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(750)).await;
        trigger.cancel();
    });

    let outcome = test.wait_until_empty(&cancel).await.unwrap();
    assert!(matches!(outcome, DrainOutcome::Cancelled(_)));
    let last = outcome.report().last.clone().unwrap();
    assert_eq!(last.processing, 1);
}

#[tokio::test(start_paused = true)]
async fn configured_deadline_times_out() {
    let fixture = {
        let mut services = common::fixtures::make_test_services();
        services.add_background_queue();
        let mut config = fixtured_unit::FixtureConfig::default();
        config.drain.poll_interval_ms = 100;
        config.drain.timeout_ms = Some(350);
        Arc::new(fixtured_unit::UnitFixture::from_services(services, config))
    };
    let (mut test, _) = active_test(fixture).await;
    let queue = test.resolve::<BackgroundQueue>(false).unwrap();
    enqueue_sleepers(&queue, WorkKind::Immediate, 1, 10_000);

    let err = test.wait_on_queue_to_empty().await.unwrap_err();
    assert!(matches!(err, FixtureError::DrainTimedOut { .. }));
    assert_eq!(err.error_code(), "FIX-D004");
}

#[tokio::test]
async fn enqueue_fails_after_the_fixture_is_torn_down() {
    let fixture = queue_fixture(100);
    let (mut test, _) = active_test(Arc::clone(&fixture)).await;
    let queue = test.resolve::<BackgroundQueue>(false).unwrap();
    let hosted = test.resolve::<QueuedHostedService>(false).unwrap();
    test.dispose().await;

    fixture.shutdown().await;
    assert!(hosted.is_stopped());

    let err = queue
        .enqueue(WorkKind::Deferred, async { Ok(()) })
        .unwrap_err();
    assert!(matches!(err, FixtureError::QueueClosed { ref kind } if kind == "deferred"));
}

#[tokio::test]
async fn fixture_without_a_queue_cannot_wait() {
    let (test, _) = active_test(make_test_fixture()).await;
    let err = test.wait_on_queue_to_empty().await.unwrap_err();
    assert!(matches!(err, FixtureError::UnregisteredService { .. }));
}
