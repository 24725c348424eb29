//! The contract shared by every cache backend.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Which backend holds the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheProviderType {
    /// An expiring map inside the process.
    #[default]
    InMemory,
    /// Entries stored through a persistence engine.
    NativePersistence,
    /// A remote key-value server.
    #[serde(alias = "REDIS", alias = "MEMCACHED")]
    Remote,
}

/// A key-value cache with per-entry time to live.
///
/// Values are opaque bytes; [`CacheProviderExt`] adds typed access. A write
/// to an existing key replaces the value and restarts its time to live from
/// the moment of that write. Reads never extend it.
pub trait CacheProvider: Send + Sync {
    /// The backend kind.
    fn provider_type(&self) -> CacheProviderType;

    /// The live value under `key`.
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store `value` under `key` for `ttl`, or for the provider default
    /// when `ttl` is `None` or zero.
    fn put(&self, ttl: Option<Duration>, key: &str, value: &[u8]) -> CacheResult<()>;

    /// Drop `key`. Missing keys are not an error.
    fn remove(&self, key: &str) -> CacheResult<()>;

    /// Drop every entry.
    fn clear(&self) -> CacheResult<()>;

    /// Returns true if a value is stored under `key`.
    fn has_key(&self, key: &str) -> CacheResult<bool>;

    /// Reap up to `batch_size` entries expired at `now`; 0 means no limit.
    ///
    /// Returns the number removed. Providers whose backend expires entries
    /// on its own return 0.
    fn cleanup(&self, now: DateTime<Utc>, batch_size: usize) -> CacheResult<usize>;
}

/// Typed access to any [`CacheProvider`], encoding values as CBOR.
pub trait CacheProviderExt: CacheProvider {
    /// Decode the value under `key`.
    fn get_value<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        self.get(key)?.map(|bytes| decode(&bytes)).transpose()
    }

    /// Encode and store `value`.
    fn put_value<T: Serialize>(&self, ttl: Option<Duration>, key: &str, value: &T) -> CacheResult<()> {
        self.put(ttl, key, &encode(value)?)
    }
}

impl<P: CacheProvider + ?Sized> CacheProviderExt for P {}

pub(crate) fn encode<T: Serialize>(value: &T) -> CacheResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::into_writer(value, &mut buffer).map_err(|e| CacheError::serialization(e.to_string()))?;
    Ok(buffer)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CacheResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CacheError::serialization(e.to_string()))
}

/// `ttl` unless it is missing or zero, then `default`.
pub(crate) fn effective_ttl(ttl: Option<Duration>, default: Duration) -> Duration {
    ttl.filter(|t| !t.is_zero()).unwrap_or(default)
}
