//! State sources the drain waiter samples.
//!
//! Both are implemented by the background processor (see
//! [`crate::queue`] for the bundled one). The waiter never caches what they
//! return; every poll asks again.

use std::sync::Arc;

use async_trait::async_trait;

use super::snapshot::CountsByKind;
use crate::error::Result;

/// Reports how many items are waiting to start, per queue kind.
pub trait QueueStateSource: Send + Sync {
    /// Current pending counts.
    ///
    /// # Errors
    ///
    /// Implementations return their own failure; the waiter propagates it as-is.
    fn lengths(&self) -> Result<CountsByKind>;
}

/// Reports how many items are currently running, per work kind.
///
/// Async because a processor may need to take a lock or ask a worker.
#[async_trait]
pub trait ProcessingStateSource: Send + Sync {
    /// Current processing counts.
    ///
    /// # Errors
    ///
    /// Implementations return their own failure; the waiter propagates it as-is.
    async fn processing_counts(&self) -> Result<CountsByKind>;
}

impl<T: QueueStateSource + ?Sized> QueueStateSource for Arc<T> {
    fn lengths(&self) -> Result<CountsByKind> {
        (**self).lengths()
    }
}

#[async_trait]
impl<T: ProcessingStateSource + ?Sized> ProcessingStateSource for Arc<T> {
    async fn processing_counts(&self) -> Result<CountsByKind> {
        (**self).processing_counts().await
    }
}
