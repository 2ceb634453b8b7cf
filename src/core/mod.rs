//! Drain protocol core: state sources, snapshots, the waiter, and global logging.

pub mod drain;
pub mod logging;
pub mod snapshot;
pub mod sources;

pub use drain::{DEFAULT_POLL_INTERVAL, DrainOutcome, DrainPolicy, DrainReport, DrainWaiter};
pub use snapshot::{CountsByKind, PROCESSING_SOURCE, QUEUE_SOURCE, QueueSnapshot};
pub use sources::{ProcessingStateSource, QueueStateSource};
