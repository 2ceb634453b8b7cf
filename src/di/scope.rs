//! Nested resolution scopes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use super::collection::Lifetime;
use super::container::ContainerInner;
use super::provider::{
    ConstructionGuard, ErasedService, ServiceKey, ServiceProvider, construct,
    ensure_not_constructing,
};
use crate::error::{FixtureError, Result};

/// A child of the root container with its own scoped instances.
///
/// Singletons still come from the root. Scoped services are built once per
/// scope; transients are built fresh but may depend on this scope's scoped
/// services. Disposal runs registered teardown hooks in reverse creation
/// order.
pub struct ServiceScope {
    id: u64,
    root: Arc<ContainerInner>,
    slots: Vec<OnceCell<ErasedService>>,
    created: Mutex<Vec<usize>>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceScope")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl ServiceScope {
    pub(crate) fn new(id: u64, root: Arc<ContainerInner>) -> Self {
        let slots = root.registrations.iter().map(|_| OnceCell::new()).collect();
        Self {
            id,
            root,
            slots,
            created: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Identifier unique within the root container.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Whether [`ServiceScope::dispose`] has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Number of scoped instances this scope has built.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Tear down scoped instances. Safe to call more than once; only the
    /// first call runs teardown hooks.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            debug!(scope_id = self.id, "Scope already disposed");
            return;
        }

        let created = std::mem::take(
            &mut *self
                .created
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        debug!(scope_id = self.id, instances = created.len(), "Disposing scope");

        for idx in created.into_iter().rev() {
            let registration = &self.root.registrations[idx];
            let (Some(disposer), Some(instance)) = (&registration.disposer, self.slots[idx].get())
            else {
                continue;
            };
            debug!(
                scope_id = self.id,
                service = registration.key.type_name(),
                "Running scoped teardown"
            );
            disposer(Arc::clone(instance)).await;
        }
    }

    fn scoped(&self, idx: usize, key: ServiceKey) -> Result<ErasedService> {
        let cell = &self.slots[idx];
        if let Some(existing) = cell.get() {
            return Ok(Arc::clone(existing));
        }

        ensure_not_constructing(key)?;
        let mut built = false;
        let instance = cell.get_or_try_init(|| {
            let _guard = ConstructionGuard::enter(key);
            let instance = (self.root.registrations[idx].factory)(self)?;
            built = true;
            Ok::<_, FixtureError>(instance)
        })?;

        if built {
            self.created
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(idx);
        }
        Ok(Arc::clone(instance))
    }
}

impl ServiceProvider for ServiceScope {
    fn resolve_erased(&self, key: ServiceKey) -> Result<ErasedService> {
        if self.is_disposed() {
            return Err(FixtureError::ScopeDisposed {
                type_name: key.type_name(),
            });
        }

        let (idx, registration) = self.root.lookup(key)?;
        match registration.lifetime {
            Lifetime::Singleton => self.root.singleton(idx, registration),
            Lifetime::Scoped => self.scoped(idx, key),
            Lifetime::Transient => construct(key, || (registration.factory)(self)),
        }
    }
}

impl Drop for ServiceScope {
    fn drop(&mut self) {
        if !self.is_disposed() && self.created_count() > 0 {
            warn!(
                scope_id = self.id,
                "Scope dropped without dispose; teardown hooks skipped"
            );
        }
    }
}
