//! The shared fixture: one root container for many tests.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::config::FixtureConfig;
use crate::core::DrainPolicy;
use crate::di::{ServiceCollection, ServiceContainer};
use crate::error::{FixtureError, Operation, Result};
use crate::output::InjectableTestOutputSink;
use crate::queue::QueuedHostedService;

/// Owns the root container shared read-only by every test using it.
///
/// The container handle can be torn down with [`UnitFixture::shutdown`];
/// tests still holding the fixture then fail with
/// [`FixtureError::ContainerUnavailable`].
pub struct UnitFixture {
    container: RwLock<Option<ServiceContainer>>,
    config: FixtureConfig,
}

impl std::fmt::Debug for UnitFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitFixture")
            .field("available", &self.is_available())
            .field("config", &self.config)
            .finish()
    }
}

impl UnitFixture {
    /// Wrap an already-built container with default settings.
    #[must_use]
    pub fn new(container: ServiceContainer) -> Self {
        Self::with_config(container, FixtureConfig::default())
    }

    /// Wrap a container with explicit settings.
    #[must_use]
    pub fn with_config(container: ServiceContainer, config: FixtureConfig) -> Self {
        Self {
            container: RwLock::new(Some(container)),
            config,
        }
    }

    /// Build the container from `services`, adding the output sink when the
    /// caller did not register one.
    #[must_use]
    pub fn from_services(mut services: ServiceCollection, config: FixtureConfig) -> Self {
        if !services.contains::<InjectableTestOutputSink>() {
            services.add_singleton::<InjectableTestOutputSink, _>(|_| {
                Ok(Arc::new(InjectableTestOutputSink::new()))
            });
        }
        Self::with_config(services.build(), config)
    }

    /// Like [`UnitFixture::from_services`], with settings from
    /// `fixture.toml` and the environment.
    ///
    /// # Errors
    ///
    /// Propagates [`FixtureConfig::resolve`] failures.
    pub fn from_environment(services: ServiceCollection) -> Result<Self> {
        let config = FixtureConfig::resolve()?;
        info!(
            poll_interval_ms = config.drain.poll_interval_ms,
            "Loaded fixture configuration"
        );
        Ok(Self::from_services(services, config))
    }

    /// The root container, or `ContainerUnavailable` if it was torn down.
    ///
    /// # Errors
    ///
    /// [`FixtureError::ContainerUnavailable`] naming `operation` and the
    /// type being handled.
    pub fn container(
        &self,
        operation: Operation,
        type_name: &'static str,
    ) -> Result<ServiceContainer> {
        self.container
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(FixtureError::ContainerUnavailable {
                operation,
                type_name,
            })
    }

    /// Whether the root container is still present.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.container
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Settings in effect.
    #[must_use]
    pub const fn config(&self) -> &FixtureConfig {
        &self.config
    }

    /// Drain policy derived from the settings.
    #[must_use]
    pub fn drain_policy(&self) -> DrainPolicy {
        self.config.drain_policy()
    }

    /// Drop the root container and stop a hosted queue service if one was
    /// started. Later calls are no-ops.
    pub async fn shutdown(&self) {
        let container = self
            .container
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(container) = container else {
            return;
        };

        if let Some(service) = container.existing::<QueuedHostedService>() {
            service.stop().await;
        }
        debug!("Fixture container torn down");
    }
}
