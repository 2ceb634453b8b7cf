//! Fixture factories for integration tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::fixtures::*;
//!
//! let (test, output) = active_test(queue_fixture(100)).await;
//! enqueue_sleepers(&queue, WorkKind::Immediate, 3, 300);
//! ```
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

pub use fixtured_unit::test_utils::{
    CountingOutput, DisposeLog, ScopeAffinity, ScopeMarker, ScriptedCounts, SingletonMarker, TrackedResource,
    make_queue_fixture, make_test_fixture, make_test_services,
};
use fixtured_unit::{BackgroundQueue, CapturedOutput, FixturedTest, UnitFixture, WorkKind};

/// A fixture with a background queue polling every `poll_ms`.
pub fn queue_fixture(poll_ms: u64) -> Arc<UnitFixture> {
    make_queue_fixture(Duration::from_millis(poll_ms))
}

/// An initialized test bound to a fresh captured output.
pub async fn active_test(fixture: Arc<UnitFixture>) -> (FixturedTest, CapturedOutput) {
    let output = CapturedOutput::new();
    let mut test = FixturedTest::new(fixture);
    test.initialize(Arc::new(output.clone()))
        .await
        .expect("initialize");
    (test, output)
}

/// Enqueue `count` items that each sleep for `ms`.
pub fn enqueue_sleepers(queue: &BackgroundQueue, kind: WorkKind, count: usize, ms: u64) {
    for _ in 0..count {
        queue
            .enqueue(kind, async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(())
            })
            .expect("enqueue");
    }
}
