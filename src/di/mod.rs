//! A small dependency-injection container.
//!
//! Services are registered on a [`ServiceCollection`] with a [`Lifetime`],
//! frozen into a [`ServiceContainer`], and resolved through the
//! [`ServiceProvider`] trait. Scoped services need a [`ServiceScope`].

pub mod collection;
pub mod container;
pub mod provider;
pub mod scope;

pub use collection::{Lifetime, ServiceCollection};
pub use container::ServiceContainer;
pub use provider::{ErasedService, ServiceKey, ServiceProvider, ServiceProviderExt};
pub use scope::ServiceScope;
