//! The pending-work side of the background queue.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::trace;

use super::{WorkItem, WorkKind};
use crate::core::{CountsByKind, QueueStateSource};
use crate::error::{FixtureError, Result};

struct Lane {
    tx: mpsc::UnboundedSender<WorkItem>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<WorkItem>>>,
    pending: AtomicI64,
}

impl Lane {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            pending: AtomicI64::new(0),
        }
    }
}

/// Unbounded two-lane work queue.
///
/// Counts an item as pending from [`BackgroundQueue::enqueue`] until a
/// worker picks it up. Items are run by a
/// [`QueuedHostedService`](super::QueuedHostedService).
pub struct BackgroundQueue {
    immediate: Lane,
    deferred: Lane,
}

impl Default for BackgroundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BackgroundQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundQueue")
            .field("immediate", &self.pending(WorkKind::Immediate))
            .field("deferred", &self.pending(WorkKind::Deferred))
            .finish()
    }
}

impl BackgroundQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            immediate: Lane::new(),
            deferred: Lane::new(),
        }
    }

    const fn lane(&self, kind: WorkKind) -> &Lane {
        match kind {
            WorkKind::Immediate => &self.immediate,
            WorkKind::Deferred => &self.deferred,
        }
    }

    /// Queue a unit of work on `kind`'s lane.
    ///
    /// # Errors
    ///
    /// [`FixtureError::QueueClosed`] once the lane's worker has stopped.
    pub fn enqueue<F>(&self, kind: WorkKind, work: F) -> Result<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let lane = self.lane(kind);
        lane.pending.fetch_add(1, Ordering::SeqCst);
        if lane.tx.send(work.boxed()).is_err() {
            lane.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(FixtureError::QueueClosed {
                kind: kind.as_str().to_string(),
            });
        }
        trace!(kind = kind.as_str(), "Enqueued background work");
        Ok(())
    }

    /// Items waiting on `kind`'s lane.
    #[must_use]
    pub fn pending(&self, kind: WorkKind) -> i64 {
        self.lane(kind).pending.load(Ordering::SeqCst)
    }

    /// Hand the lane's receiver to a worker. Only the first call gets it.
    pub(crate) fn take_receiver(&self, kind: WorkKind) -> Option<mpsc::UnboundedReceiver<WorkItem>> {
        self.lane(kind)
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Called by a worker once it has taken an item off the lane.
    pub(crate) fn mark_dequeued(&self, kind: WorkKind) {
        self.lane(kind).pending.fetch_sub(1, Ordering::SeqCst);
    }
}

impl QueueStateSource for BackgroundQueue {
    fn lengths(&self) -> Result<CountsByKind> {
        Ok(WorkKind::ALL
            .iter()
            .map(|&kind| (kind.as_str().to_string(), self.pending(kind)))
            .collect::<BTreeMap<_, _>>())
    }
}
