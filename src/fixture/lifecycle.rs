//! The per-test lifecycle tying resolution and drain waiting together.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::resolver::{ScopeState, ScopedResolver};
use super::unit::UnitFixture;
use crate::core::{DrainOutcome, DrainReport, DrainWaiter, ProcessingStateSource, QueueStateSource};
use crate::di::ServiceProviderExt;
use crate::error::{FixtureError, Operation, Result};
use crate::output::{InjectableTestOutputSink, TestLogger, TestOutput};
use crate::queue::QueuedHostedService;

/// Where a [`FixturedTest`] is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Created; [`FixturedTest::initialize`] has not run.
    Uninitialized,
    /// Initialized and usable.
    Active,
    /// Torn down. Terminal.
    Disposed,
}

/// One test's view of a shared [`UnitFixture`].
///
/// ```rust,ignore
/// let result = FixturedTest::run(fixture, output, async |t: &mut FixturedTest| {
///     let queue = t.resolve::<BackgroundQueue>(false)?;
///     queue.enqueue(WorkKind::Immediate, async { Ok(()) })?;
///     t.wait_on_queue_to_empty().await?;
///     Ok::<_, FixtureError>(())
/// })
/// .await;
/// ```
pub struct FixturedTest {
    resolver: ScopedResolver,
    state: LifecycleState,
    sink: Option<Arc<InjectableTestOutputSink>>,
    logger: OnceCell<TestLogger>,
    waiter: OnceCell<DrainWaiter>,
}

impl std::fmt::Debug for FixturedTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixturedTest")
            .field("state", &self.state)
            .field("scope", &self.resolver.state())
            .finish_non_exhaustive()
    }
}

impl FixturedTest {
    #[must_use]
    pub fn new(fixture: Arc<UnitFixture>) -> Self {
        Self {
            resolver: ScopedResolver::new(fixture),
            state: LifecycleState::Uninitialized,
            sink: None,
            logger: OnceCell::new(),
            waiter: OnceCell::new(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// The shared fixture.
    #[must_use]
    pub const fn fixture(&self) -> &Arc<UnitFixture> {
        self.resolver.fixture()
    }

    /// The test's scope state.
    #[must_use]
    pub const fn scope_state(&self) -> &ScopeState {
        self.resolver.state()
    }

    /// Wire the container's output sink to `output` and become active.
    ///
    /// Also starts a registered [`QueuedHostedService`] so queued work runs
    /// while the test does. Calling this on an active test does nothing.
    ///
    /// # Errors
    ///
    /// - [`FixtureError::Disposed`] after [`FixturedTest::dispose`]
    /// - [`FixtureError::ContainerUnavailable`] if the fixture was torn down
    /// - [`FixtureError::UnregisteredService`] if no sink is registered
    pub async fn initialize(&mut self, output: Arc<dyn TestOutput>) -> Result<()> {
        match self.state {
            LifecycleState::Active => return Ok(()),
            LifecycleState::Disposed => {
                return Err(FixtureError::Disposed {
                    operation: Operation::Lifecycle,
                });
            }
            LifecycleState::Uninitialized => {}
        }

        let container = self.fixture().container(
            Operation::Lifecycle,
            std::any::type_name::<InjectableTestOutputSink>(),
        )?;
        let sink = container.get::<InjectableTestOutputSink>()?;
        sink.inject(output);
        self.sink = Some(sink);
        // A logger used before now fell back to the global subscriber.
        self.logger = OnceCell::new();

        if container.is_registered::<QueuedHostedService>() {
            container.get::<QueuedHostedService>()?;
        }

        self.state = LifecycleState::Active;
        self.logger().in_scope(|| debug!("Test fixture initialized"));
        Ok(())
    }

    /// The test's logger, built on first use.
    ///
    /// Bound to the injected output sink; before initialization it falls
    /// back to [`TestLogger::global`], which [`FixturedTest::initialize`]
    /// replaces.
    pub fn logger(&self) -> &TestLogger {
        self.logger.get_or_init(|| match &self.sink {
            Some(sink) => {
                let config = self.fixture().config();
                TestLogger::for_sink(
                    Arc::clone(sink) as Arc<dyn TestOutput>,
                    config.log_level(),
                    config.log_format(),
                )
            }
            None => TestLogger::global(),
        })
    }

    /// Resolve `T` from the root, or from the test's scope when `scoped`.
    ///
    /// # Errors
    ///
    /// Lifecycle errors, plus everything [`ScopedResolver::resolve`] raises.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&mut self, scoped: bool) -> Result<Arc<T>> {
        self.ensure_active(Operation::Resolve)?;
        let logger = self.logger().clone();
        logger.in_scope(|| self.resolver.resolve::<T>(scoped))
    }

    /// Create the test's scope explicitly; returns its id.
    ///
    /// # Errors
    ///
    /// Lifecycle errors, plus everything [`ScopedResolver::create_scope`]
    /// raises.
    pub fn create_scope(&mut self) -> Result<u64> {
        self.ensure_active(Operation::Scope)?;
        let logger = self.logger().clone();
        logger.in_scope(|| self.resolver.create_scope())
    }

    /// Wait until the background queue has drained, the token fires, or the
    /// configured deadline passes.
    ///
    /// # Errors
    ///
    /// Lifecycle errors, a missing container or state source, and any
    /// failure the drain wait reports.
    pub async fn wait_until_empty(&self, cancel: &CancellationToken) -> Result<DrainOutcome> {
        self.ensure_active(Operation::Wait)?;
        let waiter = self.drain_waiter()?.clone();
        self.logger()
            .instrument(async move { waiter.wait_until_empty(cancel).await })
            .await
    }

    /// Wait, without a token, until the queue drains.
    ///
    /// # Errors
    ///
    /// As [`FixturedTest::wait_until_empty`], plus
    /// [`FixtureError::DrainTimedOut`] when a deadline is configured.
    pub async fn wait_on_queue_to_empty(&self) -> Result<DrainReport> {
        self.wait_until_empty(&CancellationToken::new())
            .await?
            .into_result()
    }

    /// Release the scope if one exists and become disposed.
    ///
    /// Idempotent and safe before (or after a failed) initialization.
    pub async fn dispose(&mut self) {
        if self.state == LifecycleState::Disposed {
            return;
        }
        let was = std::mem::replace(&mut self.state, LifecycleState::Disposed);

        let logger = self.logger().clone();
        let released = logger.instrument(self.resolver.release()).await;
        logger.in_scope(|| {
            debug!(previous = ?was, scope_released = released, "Test fixture disposed");
        });
    }

    /// Initialize, run `body`, and always dispose.
    ///
    /// The body's error is returned in preference to anything else; an
    /// initialization failure skips the body.
    ///
    /// # Errors
    ///
    /// The initialization error or the body's error.
    pub async fn run<T, E>(
        fixture: Arc<UnitFixture>,
        output: Arc<dyn TestOutput>,
        body: impl AsyncFnOnce(&mut Self) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<FixtureError>,
    {
        let mut test = Self::new(fixture);
        if let Err(e) = test.initialize(output).await {
            test.dispose().await;
            return Err(e.into());
        }

        let result = body(&mut test).await;
        test.dispose().await;
        if result.is_ok() {
            info!("Fixtured test completed");
        }
        result
    }

    fn drain_waiter(&self) -> Result<&DrainWaiter> {
        self.waiter.get_or_try_init(|| {
            let container = self
                .fixture()
                .container(Operation::Wait, std::any::type_name::<DrainWaiter>())?;
            let queue = container.get::<dyn QueueStateSource>()?;
            let processing = container.get::<dyn ProcessingStateSource>()?;
            Ok(DrainWaiter::new(queue, processing).with_policy(self.fixture().drain_policy()))
        })
    }

    const fn ensure_active(&self, operation: Operation) -> Result<()> {
        match self.state {
            LifecycleState::Active => Ok(()),
            LifecycleState::Uninitialized => Err(FixtureError::NotInitialized { operation }),
            LifecycleState::Disposed => Err(FixtureError::Disposed { operation }),
        }
    }
}
