//! The hosted service that drains the background queue.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::background::BackgroundQueue;
use super::{WorkItem, WorkKind};
use crate::core::{CountsByKind, ProcessingStateSource};
use crate::error::{FixtureError, Result};

#[derive(Default)]
struct Counters {
    immediate: AtomicI64,
    deferred: AtomicI64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    const fn processing(&self, kind: WorkKind) -> &AtomicI64 {
        match kind {
            WorkKind::Immediate => &self.immediate,
            WorkKind::Deferred => &self.deferred,
        }
    }
}

/// Runs queued work, one worker loop per lane.
///
/// An item counts as processing from the moment a worker takes it until it
/// finishes, fails, or panics. Failures are logged and the worker moves on.
pub struct QueuedHostedService {
    queue: Arc<BackgroundQueue>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl std::fmt::Debug for QueuedHostedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedHostedService")
            .field("workers", &self.tracker.len())
            .field("stopped", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl QueuedHostedService {
    /// Spawn the worker loops on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// [`FixtureError::ServiceFactory`] when called outside a runtime, or when
    /// another service already owns the queue's lanes.
    pub fn start(queue: Arc<BackgroundQueue>) -> Result<Arc<Self>> {
        let type_name = std::any::type_name::<Self>();
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            FixtureError::ServiceFactory {
                type_name,
                source: anyhow::Error::new(e).context("hosted service needs a tokio runtime"),
            }
        })?;

        let mut receivers = Vec::with_capacity(WorkKind::ALL.len());
        for kind in WorkKind::ALL {
            let rx = queue
                .take_receiver(kind)
                .ok_or_else(|| FixtureError::ServiceFactory {
                    type_name,
                    source: anyhow::anyhow!("{} lane already has a worker", kind.as_str()),
                })?;
            receivers.push((kind, rx));
        }

        let service = Arc::new(Self {
            queue,
            counters: Arc::new(Counters::default()),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        });

        for (kind, rx) in receivers {
            let worker = run_worker(
                kind,
                rx,
                Arc::clone(&service.queue),
                Arc::clone(&service.counters),
                service.cancel.child_token(),
            );
            service.tracker.spawn_on(worker, &handle);
        }
        info!(workers = WorkKind::ALL.len(), "Started queued hosted service");
        Ok(service)
    }

    /// Items currently running on `kind`'s lane.
    #[must_use]
    pub fn processing(&self, kind: WorkKind) -> i64 {
        self.counters.processing(kind).load(Ordering::SeqCst)
    }

    /// Items that finished successfully.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.counters.completed.load(Ordering::SeqCst)
    }

    /// Items that returned an error or panicked.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::SeqCst)
    }

    /// Whether [`QueuedHostedService::stop`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Signal the workers and wait for them to exit.
    ///
    /// A worker finishes the item it is running; anything still queued is
    /// dropped and later enqueues fail with [`FixtureError::QueueClosed`].
    pub async fn stop(&self) {
        if !self.cancel.is_cancelled() {
            debug!(workers = self.tracker.len(), "Stopping queued hosted service");
        }
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn run_worker(
    kind: WorkKind,
    mut rx: mpsc::UnboundedReceiver<WorkItem>,
    queue: Arc<BackgroundQueue>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            item = rx.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        // Count as processing before leaving pending, so a sample never sees
        // the item in neither bucket.
        let processing = counters.processing(kind);
        processing.fetch_add(1, Ordering::SeqCst);
        queue.mark_dequeued(kind);

        match AssertUnwindSafe(item).catch_unwind().await {
            Ok(Ok(())) => {
                counters.completed.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                warn!(kind = kind.as_str(), error = %e, "Background work failed");
            }
            Err(_) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                warn!(kind = kind.as_str(), "Background work panicked");
            }
        }
        processing.fetch_sub(1, Ordering::SeqCst);
    }

    // Refuse new sends, then discard what is left so pending returns to zero.
    rx.close();
    let mut dropped = 0_usize;
    while rx.try_recv().is_ok() {
        queue.mark_dequeued(kind);
        dropped += 1;
    }
    debug!(kind = kind.as_str(), dropped, "Worker exiting");
}

#[async_trait]
impl ProcessingStateSource for QueuedHostedService {
    async fn processing_counts(&self) -> Result<CountsByKind> {
        Ok(WorkKind::ALL
            .iter()
            .map(|&kind| (kind.as_str().to_string(), self.processing(kind)))
            .collect::<BTreeMap<_, _>>())
    }
}
