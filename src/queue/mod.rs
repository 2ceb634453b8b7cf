//! A two-lane background work queue and the hosted service that drains it.
//!
//! Register both with [`ServiceCollection::add_background_queue`]; the
//! fixture's drain wait then observes them through the
//! [`QueueStateSource`] and [`ProcessingStateSource`] bindings.

pub mod background;
pub mod worker;

use std::sync::Arc;

use futures::future::BoxFuture;

pub use background::BackgroundQueue;
pub use worker::QueuedHostedService;

use crate::core::{ProcessingStateSource, QueueStateSource};
use crate::di::{ServiceCollection, ServiceProviderExt};

/// Queue lane a work item is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkKind {
    /// Run as soon as a worker is free.
    Immediate,
    /// Lower-priority follow-up work.
    Deferred,
}

impl WorkKind {
    /// Every lane, in reporting order.
    pub const ALL: [Self; 2] = [Self::Immediate, Self::Deferred];

    /// Name used as the count key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Deferred => "deferred",
        }
    }
}

impl std::fmt::Display for WorkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) type WorkItem = BoxFuture<'static, anyhow::Result<()>>;

impl ServiceCollection {
    /// Register a [`BackgroundQueue`], its [`QueuedHostedService`], and bind
    /// them as the drain wait's state sources.
    ///
    /// The hosted service starts its workers when first resolved, on the
    /// runtime doing the resolving.
    pub fn add_background_queue(&mut self) -> &mut Self {
        self.add_singleton::<BackgroundQueue, _>(|_| Ok(Arc::new(BackgroundQueue::new())))
            .add_singleton::<QueuedHostedService, _>(|sp| {
                QueuedHostedService::start(sp.get::<BackgroundQueue>()?)
            })
            .add_singleton::<dyn QueueStateSource, _>(|sp| {
                let queue: Arc<dyn QueueStateSource> = sp.get::<BackgroundQueue>()?;
                Ok(queue)
            })
            .add_singleton::<dyn ProcessingStateSource, _>(|sp| {
                let service: Arc<dyn ProcessingStateSource> = sp.get::<QueuedHostedService>()?;
                Ok(service)
            })
    }
}
