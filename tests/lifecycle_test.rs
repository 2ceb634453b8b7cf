//! Integration tests for the test lifecycle: initialize, use, dispose.

mod common;

use std::sync::Arc;

use common::fixtures::{
    DisposeLog, ScopeMarker, SingletonMarker, TrackedResource, active_test, make_test_fixture,
};
use fixtured_unit::{
    CancellationToken, CapturedOutput, FixtureError, FixturedTest, LifecycleState, Operation,
    ScopeState, ServiceProviderExt, StdoutOutput,
};

#[tokio::test]
async fn a_new_test_is_uninitialized_and_refuses_work() {
    let mut test = FixturedTest::new(make_test_fixture());
    assert_eq!(test.state(), LifecycleState::Uninitialized);

    assert!(matches!(
        test.resolve::<SingletonMarker>(false),
        Err(FixtureError::NotInitialized {
            operation: Operation::Resolve
        })
    ));
    assert!(matches!(
        test.wait_on_queue_to_empty().await,
        Err(FixtureError::NotInitialized {
            operation: Operation::Wait
        })
    ));
}

#[tokio::test]
async fn initialize_twice_is_a_no_op() {
    let (mut test, _) = active_test(make_test_fixture()).await;
    test.initialize(Arc::new(CapturedOutput::new()))
        .await
        .unwrap();
    assert_eq!(test.state(), LifecycleState::Active);
}

#[tokio::test]
async fn dispose_tears_down_scoped_services_exactly_once() {
    let fixture = make_test_fixture();
    let (mut test, _) = active_test(Arc::clone(&fixture)).await;

    let resource = test.resolve::<TrackedResource>(true).unwrap();
    let log = test.resolve::<DisposeLog>(false).unwrap();
    assert!(log.disposed().is_empty());

    test.dispose().await;
    test.dispose().await;

    assert_eq!(log.disposed(), vec![resource.id]);
    assert_eq!(test.state(), LifecycleState::Disposed);
    assert!(matches!(test.scope_state(), ScopeState::Released));
}

#[tokio::test]
async fn dispose_without_a_scope_succeeds() {
    let (mut test, _) = active_test(make_test_fixture()).await;
    test.resolve::<SingletonMarker>(false).unwrap();
    test.dispose().await;

    assert_eq!(test.state(), LifecycleState::Disposed);
}

#[tokio::test]
async fn dispose_before_initialize_is_safe() {
    let mut test = FixturedTest::new(make_test_fixture());
    test.dispose().await;
    assert_eq!(test.state(), LifecycleState::Disposed);
}

#[tokio::test]
async fn everything_fails_after_dispose() {
    let (mut test, _) = active_test(make_test_fixture()).await;
    test.dispose().await;

    let err = test.resolve::<SingletonMarker>(false).unwrap_err();
    assert!(matches!(
        err,
        FixtureError::Disposed {
            operation: Operation::Resolve
        }
    ));
    assert_eq!(err.error_code(), "FIX-L001");

    assert!(matches!(
        test.create_scope(),
        Err(FixtureError::Disposed {
            operation: Operation::Scope
        })
    ));
    assert!(matches!(
        test.wait_until_empty(&CancellationToken::new()).await,
        Err(FixtureError::Disposed {
            operation: Operation::Wait
        })
    ));
    assert!(matches!(
        test.initialize(Arc::new(CapturedOutput::new())).await,
        Err(FixtureError::Disposed {
            operation: Operation::Lifecycle
        })
    ));
}

#[tokio::test]
async fn run_disposes_after_a_successful_body() {
    let fixture = make_test_fixture();
    let output = Arc::new(CapturedOutput::new());

    let (resource_id, log) = FixturedTest::run(
        Arc::clone(&fixture),
        output,
        async |t: &mut FixturedTest| {
            let resource = t.resolve::<TrackedResource>(true)?;
            let log = t.resolve::<DisposeLog>(false)?;
            Ok::<_, FixtureError>((resource.id, log))
        },
    )
    .await
    .unwrap();

    assert_eq!(log.disposed(), vec![resource_id]);
}

#[tokio::test]
async fn run_disposes_after_a_failing_body_and_returns_its_error() {
    let fixture = make_test_fixture();
    let log = fixture
        .container(Operation::Resolve, "DisposeLog")
        .unwrap()
        .get::<DisposeLog>()
        .unwrap();

    let err = FixturedTest::run(
        Arc::clone(&fixture),
        Arc::new(CapturedOutput::new()),
        async |t: &mut FixturedTest| -> anyhow::Result<()> {
            t.resolve::<TrackedResource>(true)?;
            anyhow::bail!("assertion failed in body")
        },
    )
    .await
    .unwrap_err();

    assert_eq!(err.to_string(), "assertion failed in body");
    assert_eq!(log.disposed().len(), 1);
}

#[tokio::test]
async fn run_reports_initialization_failure_without_running_the_body() {
    let fixture = make_test_fixture();
    fixture.shutdown().await;

    let mut ran = false;
    let err = FixturedTest::run(
        fixture,
        Arc::new(CapturedOutput::new()),
        async |_t: &mut FixturedTest| {
            ran = true;
            Ok::<_, FixtureError>(())
        },
    )
    .await
    .unwrap_err();

    assert!(!ran);
    assert!(matches!(err, FixtureError::ContainerUnavailable { .. }));
}

#[tokio::test]
async fn tests_sharing_a_fixture_dispose_independently() {
    let fixture = make_test_fixture();
    let (mut first, _) = active_test(Arc::clone(&fixture)).await;
    let (mut second, _) = active_test(Arc::clone(&fixture)).await;

    let a = first.resolve::<ScopeMarker>(true).unwrap();
    first.dispose().await;

    let b = second.resolve::<ScopeMarker>(true).unwrap();
    assert_ne!(a.id, b.id);
    assert_eq!(second.state(), LifecycleState::Active);
    assert!(fixture.is_available());
}

#[tokio::test]
async fn run_with_stdout_output() {
    let value = FixturedTest::run(
        make_test_fixture(),
        Arc::new(StdoutOutput),
        async |t: &mut FixturedTest| {
            assert_eq!(t.state(), LifecycleState::Active);
            assert!(!t.logger().is_global());
            Ok::<_, FixtureError>(t.resolve::<ScopeMarker>(true)?.id)
        },
    )
    .await
    .unwrap();
    assert!(value > 0);
}
