//! fixtured-unit - DI-backed test fixtures with background-queue drain waiting
//!
//! Gives each test typed access to a shared service container, one lazily
//! created nested scope, and a way to block until an asynchronous work queue
//! has fully drained before asserting.

// Note: deny (not forbid) to allow #[allow(unsafe_code)] in test helpers for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod core;
pub mod di;
pub mod error;
pub mod fixture;
pub mod output;
pub mod queue;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::config::FixtureConfig;
pub use crate::core::{
    DrainOutcome, DrainPolicy, DrainReport, DrainWaiter, ProcessingStateSource, QueueSnapshot,
    QueueStateSource,
};
pub use di::{Lifetime, ServiceCollection, ServiceContainer, ServiceProviderExt, ServiceScope};
pub use error::{FixtureError, Operation, Result};
pub use fixture::{FixturedTest, LifecycleState, ScopeState, ScopedResolver, UnitFixture};
pub use output::{CapturedOutput, InjectableTestOutputSink, StdoutOutput, TestLogger, TestOutput};
pub use queue::{BackgroundQueue, QueuedHostedService, WorkKind};
pub use tokio_util::sync::CancellationToken;

// Re-export test utilities for external test crates
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
