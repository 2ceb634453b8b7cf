//! The root container.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::OnceCell;

use super::collection::{Lifetime, Registration};
use super::provider::{
    ConstructionGuard, ErasedService, ServiceKey, ServiceProvider, construct, downcast,
    ensure_not_constructing,
};
use super::scope::ServiceScope;
use crate::error::{FixtureError, Result};

/// Root service container.
///
/// Cheap to clone; clones share registrations and singletons. Singletons
/// are built exactly once even when first requested from several threads
/// at the same time.
#[derive(Clone)]
pub struct ServiceContainer {
    inner: Arc<ContainerInner>,
}

pub(crate) struct ContainerInner {
    pub(crate) registrations: Vec<Registration>,
    pub(crate) index: HashMap<TypeId, usize>,
    singletons: Vec<OnceCell<ErasedService>>,
    next_scope_id: AtomicU64,
}

impl std::fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("registrations", &self.inner.registrations.len())
            .finish_non_exhaustive()
    }
}

impl ServiceContainer {
    pub(crate) fn from_registrations(
        registrations: Vec<Registration>,
        index: HashMap<TypeId, usize>,
    ) -> Self {
        let singletons = registrations.iter().map(|_| OnceCell::new()).collect();
        Self {
            inner: Arc::new(ContainerInner {
                registrations,
                index,
                singletons,
                next_scope_id: AtomicU64::new(1),
            }),
        }
    }

    /// Open a nested scope.
    #[must_use]
    pub fn create_scope(&self) -> ServiceScope {
        let id = self.inner.next_scope_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(scope_id = id, "Creating service scope");
        ServiceScope::new(id, Arc::clone(&self.inner))
    }

    /// Whether `T` has a registration.
    #[must_use]
    pub fn is_registered<T: ?Sized + 'static>(&self) -> bool {
        self.inner.index.contains_key(&TypeId::of::<T>())
    }

    /// The singleton `T` if it has already been built. Never builds it.
    #[must_use]
    pub fn existing<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let key = ServiceKey::of::<T>();
        let (idx, registration) = self.inner.lookup(key).ok()?;
        if registration.lifetime != Lifetime::Singleton {
            return None;
        }
        let erased = self.inner.singletons[idx].get()?;
        downcast::<T>(erased, key).ok()
    }
}

impl ServiceProvider for ServiceContainer {
    fn resolve_erased(&self, key: ServiceKey) -> Result<ErasedService> {
        self.inner.resolve_erased(key)
    }
}

impl ContainerInner {
    pub(crate) fn lookup(&self, key: ServiceKey) -> Result<(usize, &Registration)> {
        self.index
            .get(&key.type_id())
            .map(|&idx| (idx, &self.registrations[idx]))
            .ok_or(FixtureError::UnregisteredService {
                type_name: key.type_name(),
            })
    }

    /// Singletons always resolve their dependencies from the root.
    pub(crate) fn singleton(&self, idx: usize, registration: &Registration) -> Result<ErasedService> {
        let cell = &self.singletons[idx];
        if let Some(existing) = cell.get() {
            return Ok(Arc::clone(existing));
        }

        ensure_not_constructing(registration.key)?;
        cell.get_or_try_init(|| {
            let _guard = ConstructionGuard::enter(registration.key);
            tracing::trace!(service = registration.key.type_name(), "Building singleton");
            (registration.factory)(self)
        })
        .map(Arc::clone)
    }
}

impl ServiceProvider for ContainerInner {
    fn resolve_erased(&self, key: ServiceKey) -> Result<ErasedService> {
        let (idx, registration) = self.lookup(key)?;
        match registration.lifetime {
            Lifetime::Singleton => self.singleton(idx, registration),
            Lifetime::Transient => construct(key, || (registration.factory)(self)),
            Lifetime::Scoped => Err(FixtureError::ScopeRequired {
                type_name: key.type_name(),
            }),
        }
    }
}
