//! Service registrations.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::container::ServiceContainer;
use super::provider::{ErasedService, ServiceKey, ServiceProvider};
use crate::error::Result;

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// One instance per root container, created on first resolution.
    Singleton,
    /// One instance per scope; refused by the root container.
    Scoped,
    /// A fresh instance on every resolution.
    Transient,
}

pub(crate) type Factory = Arc<dyn Fn(&dyn ServiceProvider) -> Result<ErasedService> + Send + Sync>;
pub(crate) type Disposer = Arc<dyn Fn(ErasedService) -> BoxFuture<'static, ()> + Send + Sync>;

pub(crate) struct Registration {
    pub(crate) key: ServiceKey,
    pub(crate) lifetime: Lifetime,
    pub(crate) factory: Factory,
    pub(crate) disposer: Option<Disposer>,
}

/// Builder for a [`ServiceContainer`].
///
/// Registering a type twice replaces the earlier registration.
///
/// ```rust,ignore
/// let mut services = ServiceCollection::new();
/// services
///     .add_singleton::<Clock, _>(|_| Ok(Arc::new(Clock::default())))
///     .add_scoped::<UnitOfWork, _>(|sp| Ok(Arc::new(UnitOfWork::new(sp.get::<Clock>()?))));
/// let container = services.build();
/// ```
#[derive(Default)]
pub struct ServiceCollection {
    registrations: Vec<Registration>,
    index: HashMap<TypeId, usize>,
}

impl std::fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.registrations
                    .iter()
                    .map(|r| (r.key.type_name(), r.lifetime)),
            )
            .finish()
    }
}

impl ServiceCollection {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lazily-built singleton.
    pub fn add_singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn ServiceProvider) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        self.insert::<T>(Lifetime::Singleton, erase(factory), None)
    }

    /// Register an already-built singleton.
    pub fn add_singleton_instance<T>(&mut self, instance: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.add_singleton::<T, _>(move |_| Ok(Arc::clone(&instance)))
    }

    /// Register a service with one instance per scope.
    pub fn add_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn ServiceProvider) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        self.insert::<T>(Lifetime::Scoped, erase(factory), None)
    }

    /// Register a scoped service with an async teardown hook.
    ///
    /// The hook runs once, when the owning scope is disposed, for each
    /// instance that scope actually created.
    pub fn add_scoped_with_dispose<T, F, D, Fut>(&mut self, factory: F, dispose: D) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn ServiceProvider) -> Result<Arc<T>> + Send + Sync + 'static,
        D: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let disposer: Disposer = Arc::new(move |erased: ErasedService| {
            match erased.downcast_ref::<Arc<T>>() {
                Some(service) => dispose(Arc::clone(service)).boxed(),
                None => async {}.boxed(),
            }
        });
        self.insert::<T>(Lifetime::Scoped, erase(factory), Some(disposer))
    }

    /// Register a service built fresh on every resolution.
    pub fn add_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn ServiceProvider) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        self.insert::<T>(Lifetime::Transient, erase(factory), None)
    }

    /// Whether `T` has a registration.
    #[must_use]
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.index.contains_key(&TypeId::of::<T>())
    }

    /// The lifetime `T` is registered with.
    #[must_use]
    pub fn lifetime_of<T: ?Sized + 'static>(&self) -> Option<Lifetime> {
        self.index
            .get(&TypeId::of::<T>())
            .map(|&idx| self.registrations[idx].lifetime)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Freeze the registrations into a root container.
    #[must_use]
    pub fn build(self) -> ServiceContainer {
        ServiceContainer::from_registrations(self.registrations, self.index)
    }

    fn insert<T: ?Sized + 'static>(
        &mut self,
        lifetime: Lifetime,
        factory: Factory,
        disposer: Option<Disposer>,
    ) -> &mut Self {
        let registration = Registration {
            key: ServiceKey::of::<T>(),
            lifetime,
            factory,
            disposer,
        };

        match self.index.get(&TypeId::of::<T>()) {
            Some(&idx) => {
                tracing::debug!(service = registration.key.type_name(), "Replacing registration");
                self.registrations[idx] = registration;
            }
            None => {
                self.index
                    .insert(TypeId::of::<T>(), self.registrations.len());
                self.registrations.push(registration);
            }
        }
        self
    }
}

fn erase<T, F>(factory: F) -> Factory
where
    T: ?Sized + Send + Sync + 'static,
    F: Fn(&dyn ServiceProvider) -> Result<Arc<T>> + Send + Sync + 'static,
{
    Arc::new(move |provider: &dyn ServiceProvider| {
        let service: Arc<T> = factory(provider)?;
        Ok(Arc::new(service) as Arc<dyn Any + Send + Sync>)
    })
}
