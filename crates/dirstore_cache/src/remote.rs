//! Cache provider over a remote key-value server.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::RemoteConfiguration;
use crate::error::CacheResult;
use crate::provider::{effective_ttl, CacheProvider, CacheProviderType};

/// Client for a key-value server with native expiry.
///
/// Implementations wrap a concrete client library and map its failures to
/// [`CacheError::Remote`](crate::CacheError::Remote).
pub trait RemoteCacheClient: Send + Sync {
    /// Fetch a live value.
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store a value that the server drops after `ttl`.
    fn set_with_expiry(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Delete a key.
    fn delete(&self, key: &str) -> CacheResult<()>;

    /// Returns true if the server holds `key`.
    fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Drop every key.
    fn flush(&self) -> CacheResult<()>;
}

/// Cache provider delegating to a [`RemoteCacheClient`].
pub struct RemoteCacheProvider {
    client: Arc<dyn RemoteCacheClient>,
    default_ttl: Duration,
}

impl RemoteCacheProvider {
    /// Wrap `client`.
    pub fn new(client: Arc<dyn RemoteCacheClient>, config: &RemoteConfiguration) -> Self {
        Self {
            client,
            default_ttl: Duration::from_secs(config.default_put_expiration),
        }
    }
}

impl CacheProvider for RemoteCacheProvider {
    fn provider_type(&self) -> CacheProviderType {
        CacheProviderType::Remote
    }

    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.client.get(key)
    }

    fn put(&self, ttl: Option<Duration>, key: &str, value: &[u8]) -> CacheResult<()> {
        let ttl = effective_ttl(ttl, self.default_ttl);
        debug!(key, ttl_secs = ttl.as_secs(), "remote cache put");
        self.client.set_with_expiry(key, value, ttl)
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        self.client.delete(key)
    }

    fn clear(&self) -> CacheResult<()> {
        self.client.flush()
    }

    fn has_key(&self, key: &str) -> CacheResult<bool> {
        self.client.exists(key)
    }

    fn cleanup(&self, _now: DateTime<Utc>, _batch_size: usize) -> CacheResult<usize> {
        Ok(0)
    }
}
