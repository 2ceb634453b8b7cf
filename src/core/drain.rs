//! Drain waiting: block a test until the background queue is quiescent.
//!
//! The waiter polls instead of subscribing to completion events. Several
//! independent producers and consumers report counts on their own schedule,
//! and a poll loop gives one join point no matter how many work kinds exist.
//! Every poll re-samples both sources after the delay; a snapshot is never
//! reused across iterations.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::snapshot::QueueSnapshot;
use super::sources::{ProcessingStateSource, QueueStateSource};
use crate::error::{FixtureError, Operation, Result};

/// Delay between drain polls unless configured otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How the waiter polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPolicy {
    /// Delay between successive samples.
    pub poll_interval: Duration,
    /// Give up after this long. `None` waits until drained or cancelled.
    pub timeout: Option<Duration>,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

impl DrainPolicy {
    /// Builder: sets the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Builder: sets an overall deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// What the waiter observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Number of samples taken.
    pub polls: u32,
    /// Time from the start of the wait to its end.
    pub elapsed: Duration,
    /// The most recent snapshot, if any sample completed.
    pub last: Option<QueueSnapshot>,
}

/// How a drain wait ended.
///
/// `Cancelled` and `TimedOut` never mean the queue is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum DrainOutcome {
    /// Every pending and processing count was zero at the last sample.
    Drained(DrainReport),
    /// The caller's cancellation token fired first.
    Cancelled(DrainReport),
    /// The policy deadline elapsed first.
    TimedOut(DrainReport),
}

impl DrainOutcome {
    /// True only for [`DrainOutcome::Drained`].
    #[must_use]
    pub const fn is_drained(&self) -> bool {
        matches!(self, Self::Drained(_))
    }

    /// The report regardless of how the wait ended.
    #[must_use]
    pub const fn report(&self) -> &DrainReport {
        match self {
            Self::Drained(report) | Self::Cancelled(report) | Self::TimedOut(report) => report,
        }
    }

    /// Convert into a `Result`, turning cancellation and timeout into errors.
    ///
    /// # Errors
    ///
    /// [`FixtureError::Cancelled`] or [`FixtureError::DrainTimedOut`].
    pub fn into_result(self) -> Result<DrainReport> {
        match self {
            Self::Drained(report) => Ok(report),
            Self::Cancelled(_) => Err(FixtureError::Cancelled {
                operation: Operation::Wait,
            }),
            Self::TimedOut(report) => {
                let (pending, processing) = report
                    .last
                    .as_ref()
                    .map_or((0, 0), |s| (s.pending, s.processing));
                Err(FixtureError::DrainTimedOut {
                    elapsed_ms: u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
                    pending,
                    processing,
                })
            }
        }
    }
}

/// Polls the queue and processing sources until both report zero.
#[derive(Clone)]
pub struct DrainWaiter {
    queue: Arc<dyn QueueStateSource>,
    processing: Arc<dyn ProcessingStateSource>,
    policy: DrainPolicy,
}

impl std::fmt::Debug for DrainWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainWaiter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl DrainWaiter {
    /// Create a waiter with the default policy.
    #[must_use]
    pub fn new(
        queue: Arc<dyn QueueStateSource>,
        processing: Arc<dyn ProcessingStateSource>,
    ) -> Self {
        Self {
            queue,
            processing,
            policy: DrainPolicy::default(),
        }
    }

    /// Builder: replaces the policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: DrainPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The active policy.
    #[must_use]
    pub const fn policy(&self) -> DrainPolicy {
        self.policy
    }

    /// Take one validated sample of both sources.
    ///
    /// # Errors
    ///
    /// Propagates source failures unchanged, and reports negative counts as
    /// [`FixtureError::InvariantViolation`].
    pub async fn sample(&self) -> Result<QueueSnapshot> {
        let pending = self.queue.lengths()?;
        let processing = self.processing.processing_counts().await?;
        QueueSnapshot::from_counts(&pending, &processing)
    }

    /// Wait until nothing is pending or processing.
    ///
    /// Returns `Ok(Drained)` as soon as a sample is all zeros. Cancellation is
    /// raced against both the sample and the delay, so a cancelled wait ends
    /// within one poll interval with `Ok(Cancelled)`. Without cancellation or
    /// a policy timeout, work that never finishes means this never returns.
    ///
    /// # Errors
    ///
    /// Any source failure or invariant violation ends the wait immediately.
    /// Errors are never retried.
    pub async fn wait_until_empty(&self, cancel: &CancellationToken) -> Result<DrainOutcome> {
        let started = Instant::now();
        let deadline = self.policy.timeout.map(|timeout| started + timeout);
        let delay_ms = u64::try_from(self.policy.poll_interval.as_millis()).unwrap_or(u64::MAX);
        let mut polls: u32 = 0;
        let mut last: Option<QueueSnapshot> = None;

        let report = |polls: u32, last: &Option<QueueSnapshot>| DrainReport {
            polls,
            elapsed: started.elapsed(),
            last: last.clone(),
        };

        loop {
            if cancel.is_cancelled() {
                debug!(polls, "Drain wait cancelled before sampling");
                return Ok(DrainOutcome::Cancelled(report(polls, &last)));
            }

            let snapshot = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(polls, "Drain wait cancelled while sampling");
                    return Ok(DrainOutcome::Cancelled(report(polls, &last)));
                }
                sampled = self.sample() => sampled?,
            };
            polls = polls.saturating_add(1);
            let quiescent = snapshot.is_quiescent();

            if quiescent {
                debug!(
                    poll = polls,
                    quiescent,
                    pending = snapshot.pending,
                    processing = snapshot.processing,
                    "Background queue is empty; continuing"
                );
                last = Some(snapshot);
                return Ok(DrainOutcome::Drained(report(polls, &last)));
            }

            debug!(
                poll = polls,
                quiescent,
                pending = snapshot.pending,
                processing = snapshot.processing,
                delay_ms,
                "Waiting {delay_ms}ms for background queue to empty..."
            );
            last = Some(snapshot);

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                debug!(polls, "Drain deadline elapsed");
                return Ok(DrainOutcome::TimedOut(report(polls, &last)));
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(polls, "Drain wait cancelled during delay");
                    return Ok(DrainOutcome::Cancelled(report(polls, &last)));
                }
                () = until(deadline) => {
                    debug!(polls, "Drain deadline elapsed");
                    return Ok(DrainOutcome::TimedOut(report(polls, &last)));
                }
                () = tokio::time::sleep(self.policy.poll_interval) => {}
            }
        }
    }
}

/// Resolves at `deadline`, or never when there is none.
fn until(deadline: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
