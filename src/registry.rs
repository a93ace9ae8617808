use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock, RwLock};

use async_trait::async_trait;
use tracing::info;

use crate::backend::ConnectionBackend;
use crate::error::SqlFluentError;
use crate::session::Db;

/// Opens backend connections for one provider.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn open(
        &self,
        driver: &str,
        dsn: &str,
    ) -> Result<Arc<dyn ConnectionBackend>, SqlFluentError>;
}

/// Any `Fn(driver, dsn) -> impl Future<Output = Result<Arc<dyn ConnectionBackend>, _>>` is a
/// factory.
#[async_trait]
impl<F, Fut> ProviderFactory for F
where
    F: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Arc<dyn ConnectionBackend>, SqlFluentError>> + Send + 'static,
{
    async fn open(
        &self,
        driver: &str,
        dsn: &str,
    ) -> Result<Arc<dyn ConnectionBackend>, SqlFluentError> {
        (self)(driver.to_string(), dsn.to_string()).await
    }
}

/// Provider name to factory mapping.
///
/// Registries are plain values so tests and embedders can keep their own; [`global`] holds
/// the process-wide instance used by [`register_provider`] and [`open`].
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn ProviderFactory>>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn ProviderFactory>>> {
        match self.providers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register `factory` under `name`.
    ///
    /// # Errors
    ///
    /// Returns `ProviderAlreadyRegistered` if `name` is taken, `ConfigError` if it is empty.
    pub fn register(
        &self,
        name: &str,
        factory: impl ProviderFactory + 'static,
    ) -> Result<(), SqlFluentError> {
        if name.trim().is_empty() {
            return Err(SqlFluentError::ConfigError("provider name is empty".into()));
        }
        let mut providers = match self.providers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if providers.contains_key(name) {
            return Err(SqlFluentError::ProviderAlreadyRegistered(name.to_string()));
        }
        providers.insert(name.to_string(), Arc::new(factory));
        info!(provider = name, "registered provider");
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered provider names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Open a session through the named provider.
    ///
    /// # Errors
    ///
    /// Returns `ProviderNotFound` for an unknown provider, otherwise the factory's error.
    pub async fn open(&self, provider: &str, driver: &str, dsn: &str) -> Result<Db, SqlFluentError> {
        let factory = self
            .read()
            .get(provider)
            .cloned()
            .ok_or_else(|| SqlFluentError::ProviderNotFound(provider.to_string()))?;
        let backend = factory.open(driver, dsn).await?;
        info!(provider, driver, "opened session");
        Ok(Db::new(provider, backend))
    }
}

static GLOBAL: LazyLock<ProviderRegistry> = LazyLock::new(ProviderRegistry::new);

/// The process-wide registry.
#[must_use]
pub fn global() -> &'static ProviderRegistry {
    &GLOBAL
}

/// Register a provider in the process-wide registry.
///
/// # Errors
///
/// See [`ProviderRegistry::register`].
pub fn register_provider(
    name: &str,
    factory: impl ProviderFactory + 'static,
) -> Result<(), SqlFluentError> {
    GLOBAL.register(name, factory)
}

/// Open a session through the process-wide registry.
///
/// # Errors
///
/// See [`ProviderRegistry::open`].
pub async fn open(provider: &str, driver: &str, dsn: &str) -> Result<Db, SqlFluentError> {
    GLOBAL.open(provider, driver, dsn).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBackend;

    fn factory(
        driver: String,
        _dsn: String,
    ) -> impl Future<Output = Result<Arc<dyn ConnectionBackend>, SqlFluentError>> + Send {
        async move {
            let backend: Arc<dyn ConnectionBackend> = Arc::new(RecordingBackend::new(&driver));
            Ok(backend)
        }
    }

    #[tokio::test]
    async fn opens_registered_provider() {
        let registry = ProviderRegistry::new();
        registry.register("mock", factory).unwrap();
        assert!(registry.contains("mock"));
        let db = registry.open("mock", "mockdriver", "dsn").await.unwrap();
        assert_eq!(db.provider_name(), "mock");
        assert_eq!(db.driver_name(), "mockdriver");
    }

    #[tokio::test]
    async fn unknown_provider_is_recoverable() {
        let registry = ProviderRegistry::new();
        let err = registry.open("nope", "d", "dsn").await.unwrap_err();
        assert!(matches!(err, SqlFluentError::ProviderNotFound(name) if name == "nope"));
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = ProviderRegistry::new();
        registry.register("mock", factory).unwrap();
        let err = registry.register("mock", factory).unwrap_err();
        assert!(matches!(err, SqlFluentError::ProviderAlreadyRegistered(_)));
        assert_eq!(registry.names(), vec!["mock".to_string()]);
    }
}
