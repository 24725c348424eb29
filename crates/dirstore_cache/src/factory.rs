//! Provider selection from configuration.

use std::sync::Arc;

use dirstore_core::PersistenceEngine;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfiguration;
use crate::error::{CacheError, CacheResult};
use crate::memory::InMemoryCacheProvider;
use crate::native::NativePersistenceCacheProvider;
use crate::provider::{CacheProvider, CacheProviderType};
use crate::remote::{RemoteCacheClient, RemoteCacheProvider};

/// Builds the provider a [`CacheConfiguration`] selects.
///
/// ```rust,ignore
/// let provider = CacheProviderFactory::new(config)
///     .with_engine(engine.clone())
///     .create()?;
/// ```
pub struct CacheProviderFactory {
    config: CacheConfiguration,
    engine: Option<Arc<dyn PersistenceEngine>>,
    remote: Option<Arc<dyn RemoteCacheClient>>,
    clock: Arc<dyn Clock>,
}

impl CacheProviderFactory {
    /// A factory for `config`.
    pub fn new(config: CacheConfiguration) -> Self {
        Self {
            config,
            engine: None,
            remote: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Engine for [`CacheProviderType::NativePersistence`].
    #[must_use]
    pub fn with_engine(mut self, engine: Arc<dyn PersistenceEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Client for [`CacheProviderType::Remote`].
    #[must_use]
    pub fn with_remote_client(mut self, client: Arc<dyn RemoteCacheClient>) -> Self {
        self.remote = Some(client);
        self
    }

    /// Clock for expiry decisions made in this process.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the configured provider.
    ///
    /// # Errors
    ///
    /// Fails if the selected backend was not supplied or cannot be set up.
    pub fn create(self) -> CacheResult<Arc<dyn CacheProvider>> {
        let kind = self.config.cache_provider_type;
        let provider: Arc<dyn CacheProvider> = match kind {
            CacheProviderType::InMemory => Arc::new(InMemoryCacheProvider::with_clock(
                &self.config.in_memory_configuration,
                self.clock,
            )),
            CacheProviderType::NativePersistence => {
                let engine = self.engine.ok_or_else(|| {
                    CacheError::configuration("native persistence cache needs a persistence engine")
                })?;
                Arc::new(
                    NativePersistenceCacheProvider::create(engine, &self.config.native_persistence_configuration)?
                        .with_clock(self.clock),
                )
            }
            CacheProviderType::Remote => {
                let client = self
                    .remote
                    .ok_or_else(|| CacheError::configuration("remote cache needs a client"))?;
                Arc::new(RemoteCacheProvider::new(client, &self.config.remote_configuration))
            }
        };
        info!(provider = ?kind, "cache provider created");
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_by_default() {
        let provider = CacheProviderFactory::new(CacheConfiguration::default()).create().unwrap();
        assert_eq!(provider.provider_type(), CacheProviderType::InMemory);
    }

    #[test]
    fn missing_backends_are_configuration_errors() {
        for kind in [CacheProviderType::NativePersistence, CacheProviderType::Remote] {
            let err = CacheProviderFactory::new(CacheConfiguration::new(kind))
                .create()
                .err()
                .unwrap();
            assert!(matches!(err, CacheError::Configuration { .. }), "{kind:?}: {err}");
        }
    }
}
