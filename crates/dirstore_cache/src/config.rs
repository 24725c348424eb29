//! Cache configuration.
//!
//! The field names follow the JSON documents the configuration loader
//! stores, so a configuration can be read with `serde_json` directly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};
use crate::provider::CacheProviderType;

/// Default time to live, in seconds, when a write names none.
pub const DEFAULT_PUT_EXPIRATION: u64 = 60;
/// Default number of expired entries reaped per cleanup pass.
pub const DEFAULT_CLEANUP_BATCH_SIZE: usize = 1000;
/// Default seconds between cleanup passes.
pub const DEFAULT_CLEANUP_INTERVAL: u64 = 30;

/// Cache backend selection and per-backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfiguration {
    /// Which provider to build.
    pub cache_provider_type: CacheProviderType,
    /// Settings for [`CacheProviderType::InMemory`].
    pub in_memory_configuration: InMemoryConfiguration,
    /// Settings for [`CacheProviderType::NativePersistence`].
    pub native_persistence_configuration: NativePersistenceConfiguration,
    /// Settings for [`CacheProviderType::Remote`].
    #[serde(alias = "redisConfiguration")]
    pub remote_configuration: RemoteConfiguration,
    /// Seconds between background cleanup passes.
    pub cleanup_interval: u64,
}

impl Default for CacheConfiguration {
    fn default() -> Self {
        Self {
            cache_provider_type: CacheProviderType::InMemory,
            in_memory_configuration: InMemoryConfiguration::default(),
            native_persistence_configuration: NativePersistenceConfiguration::default(),
            remote_configuration: RemoteConfiguration::default(),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

impl CacheConfiguration {
    /// Configuration selecting `provider_type` with default settings.
    pub fn new(provider_type: CacheProviderType) -> Self {
        Self {
            cache_provider_type: provider_type,
            ..Self::default()
        }
    }

    /// Parse a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed JSON or unknown provider
    /// types.
    pub fn from_json(text: &str) -> CacheResult<Self> {
        serde_json::from_str(text).map_err(|e| CacheError::configuration(e.to_string()))
    }

    /// Time between background cleanup passes.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval.max(1))
    }
}

/// Settings of the in-process provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InMemoryConfiguration {
    /// Seconds to live when a write names no time to live.
    pub default_put_expiration: u64,
}

impl Default for InMemoryConfiguration {
    fn default() -> Self {
        Self {
            default_put_expiration: DEFAULT_PUT_EXPIRATION,
        }
    }
}

/// Settings of the persistence-backed provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NativePersistenceConfiguration {
    /// Seconds to live when a write names no time to live.
    pub default_put_expiration: u64,
    /// Entries reaped per cleanup pass.
    pub default_cleanup_batch_size: usize,
    /// Delete an expired entry as soon as a read finds it.
    #[serde(alias = "deleteExpiredOnGetRequest")]
    pub delete_expired_on_get: bool,
    /// DN under which the `ou=cache` branch lives.
    pub base_dn: String,
}

impl Default for NativePersistenceConfiguration {
    fn default() -> Self {
        Self {
            default_put_expiration: DEFAULT_PUT_EXPIRATION,
            default_cleanup_batch_size: DEFAULT_CLEANUP_BATCH_SIZE,
            delete_expired_on_get: false,
            base_dn: String::new(),
        }
    }
}

/// Settings of the remote provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteConfiguration {
    /// Seconds to live when a write names no time to live.
    pub default_put_expiration: u64,
    /// Servers as `host:port`, comma separated.
    pub servers: String,
}

impl Default for RemoteConfiguration {
    fn default() -> Self {
        Self {
            default_put_expiration: DEFAULT_PUT_EXPIRATION,
            servers: String::new(),
        }
    }
}
