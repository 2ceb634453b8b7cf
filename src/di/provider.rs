//! The resolution contract shared by the root container and its scopes.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::sync::Arc;

use crate::error::{FixtureError, Result};

/// A resolved service with its type erased. Always holds an `Arc<T>`.
pub type ErasedService = Arc<dyn Any + Send + Sync>;

/// Identifies a registration: the type id plus its name for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    id: TypeId,
    name: &'static str,
}

impl ServiceKey {
    /// Key for `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The type id.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.id
    }

    /// The type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.name
    }
}

/// Something services can be resolved from.
///
/// Object safe, so factories receive `&dyn ServiceProvider`; typed access
/// goes through [`ServiceProviderExt::get`].
pub trait ServiceProvider: Send + Sync {
    /// Resolve the registration for `key`.
    ///
    /// # Errors
    ///
    /// [`FixtureError::UnregisteredService`] when nothing is registered, or
    /// whatever the lifetime rules and the factory produce.
    fn resolve_erased(&self, key: ServiceKey) -> Result<ErasedService>;
}

/// Typed resolution on top of [`ServiceProvider`].
pub trait ServiceProviderExt {
    /// Resolve `T`.
    ///
    /// # Errors
    ///
    /// Propagates the provider's error; never substitutes a default.
    fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>>;
}

impl<P: ServiceProvider + ?Sized> ServiceProviderExt for P {
    fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let key = ServiceKey::of::<T>();
        let erased = self.resolve_erased(key)?;
        downcast::<T>(&erased, key)
    }
}

pub(crate) fn downcast<T: ?Sized + Send + Sync + 'static>(
    erased: &ErasedService,
    key: ServiceKey,
) -> Result<Arc<T>> {
    erased
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or_else(|| FixtureError::ServiceFactory {
            type_name: key.type_name(),
            source: anyhow::anyhow!("registered value has a different type"),
        })
}

thread_local! {
    static CONSTRUCTING: RefCell<Vec<TypeId>> = const { RefCell::new(Vec::new()) };
}

/// Fail if `key` is already being built further up this thread's stack.
///
/// Must be checked before touching a compute-once cell: re-entering a cell
/// that is mid-initialization would block forever.
pub(crate) fn ensure_not_constructing(key: ServiceKey) -> Result<()> {
    let cyclic = CONSTRUCTING.with(|stack| stack.borrow().contains(&key.id));
    if cyclic {
        Err(FixtureError::CircularDependency {
            type_name: key.type_name(),
        })
    } else {
        Ok(())
    }
}

/// Marks `key` as under construction until dropped.
pub(crate) struct ConstructionGuard(TypeId);

impl ConstructionGuard {
    pub(crate) fn enter(key: ServiceKey) -> Self {
        CONSTRUCTING.with(|stack| stack.borrow_mut().push(key.id));
        Self(key.id)
    }
}

impl Drop for ConstructionGuard {
    fn drop(&mut self) {
        CONSTRUCTING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|id| *id == self.0) {
                stack.remove(pos);
            }
        });
    }
}

/// Run `factory` for `key` with cycle detection.
pub(crate) fn construct<F>(key: ServiceKey, factory: F) -> Result<ErasedService>
where
    F: FnOnce() -> Result<ErasedService>,
{
    ensure_not_constructing(key)?;
    let _guard = ConstructionGuard::enter(key);
    factory()
}
