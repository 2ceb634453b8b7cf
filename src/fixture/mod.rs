//! Test fixtures: the shared [`UnitFixture`], the per-test
//! [`ScopedResolver`], and the [`FixturedTest`] lifecycle.

pub mod lifecycle;
pub mod resolver;
pub mod unit;

pub use lifecycle::{FixturedTest, LifecycleState};
pub use resolver::{ScopeState, ScopedResolver};
pub use unit::UnitFixture;
