//! Per-test service resolution with one lazily created scope.

use std::sync::Arc;

use tracing::debug;

use super::unit::UnitFixture;
use crate::di::{ServiceProviderExt, ServiceScope};
use crate::error::{FixtureError, Operation, Result};

/// The test's nested scope.
#[derive(Debug, Default)]
pub enum ScopeState {
    /// No scope has been created yet.
    #[default]
    NoScope,
    /// The live scope; reused for every scoped resolution.
    Active(ServiceScope),
    /// The scope was disposed and will not be recreated.
    Released,
}

impl ScopeState {
    /// Whether a scope is live.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }
}

/// Resolves services for one test, from the root or from the test's scope.
///
/// Owned by a single test; the `&mut self` API keeps the scope from being
/// created twice.
#[derive(Debug)]
pub struct ScopedResolver {
    fixture: Arc<UnitFixture>,
    scope: ScopeState,
}

impl ScopedResolver {
    #[must_use]
    pub fn new(fixture: Arc<UnitFixture>) -> Self {
        Self {
            fixture,
            scope: ScopeState::NoScope,
        }
    }

    /// The fixture this resolver reads from.
    #[must_use]
    pub const fn fixture(&self) -> &Arc<UnitFixture> {
        &self.fixture
    }

    /// Current scope state.
    #[must_use]
    pub const fn state(&self) -> &ScopeState {
        &self.scope
    }

    /// The live scope, if any.
    #[must_use]
    pub const fn scope(&self) -> Option<&ServiceScope> {
        match &self.scope {
            ScopeState::Active(scope) => Some(scope),
            ScopeState::NoScope | ScopeState::Released => None,
        }
    }

    /// Resolve `T` from the root, or from the test's scope when `scoped`.
    ///
    /// The scope is created on the first scoped resolution and reused after.
    ///
    /// # Errors
    ///
    /// - [`FixtureError::ContainerUnavailable`] if the fixture was torn down
    /// - [`FixtureError::UnregisteredService`] if `T` has no registration
    /// - [`FixtureError::ScopeDisposed`] for a scoped resolution after release
    /// - whatever the container raises for `T`
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&mut self, scoped: bool) -> Result<Arc<T>> {
        let type_name = std::any::type_name::<T>();
        let container = self.fixture.container(Operation::Resolve, type_name)?;

        if !scoped {
            return container.get::<T>();
        }

        match &self.scope {
            ScopeState::Active(scope) => return scope.get::<T>(),
            ScopeState::Released => return Err(FixtureError::ScopeDisposed { type_name }),
            ScopeState::NoScope => {}
        }

        debug!(service = type_name, "Creating scope for first scoped resolution");
        let scope = container.create_scope();
        let resolved = scope.get::<T>();
        self.scope = ScopeState::Active(scope);
        resolved
    }

    /// Create the test's scope explicitly; returns its id.
    ///
    /// Usually unnecessary; [`ScopedResolver::resolve`] with `scoped = true`
    /// creates it on demand.
    ///
    /// # Errors
    ///
    /// - [`FixtureError::ScopeAlreadyExists`] if a scope is live
    /// - [`FixtureError::ScopeDisposed`] after [`ScopedResolver::release`]
    /// - [`FixtureError::ContainerUnavailable`] if the fixture was torn down
    pub fn create_scope(&mut self) -> Result<u64> {
        match self.scope {
            ScopeState::Active(_) => return Err(FixtureError::ScopeAlreadyExists),
            ScopeState::Released => {
                return Err(FixtureError::ScopeDisposed {
                    type_name: std::any::type_name::<ServiceScope>(),
                });
            }
            ScopeState::NoScope => {}
        }

        let container = self
            .fixture
            .container(Operation::Scope, std::any::type_name::<ServiceScope>())?;
        let scope = container.create_scope();
        let id = scope.id();
        self.scope = ScopeState::Active(scope);
        Ok(id)
    }

    /// Dispose the scope if one is live. Returns whether one was.
    ///
    /// Only the first call does anything; the resolver never creates another
    /// scope afterwards.
    pub async fn release(&mut self) -> bool {
        match std::mem::replace(&mut self.scope, ScopeState::Released) {
            ScopeState::Active(scope) => {
                debug!(scope_id = scope.id(), "Releasing test scope");
                scope.dispose().await;
                true
            }
            ScopeState::NoScope | ScopeState::Released => false,
        }
    }
}
