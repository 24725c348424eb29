//! The cache facade used by callers.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use crate::error::CacheResult;
use crate::provider::{decode, encode, CacheProvider, CacheProviderType};

/// Read a region name as a time to live in whole seconds.
///
/// Anything that is not a positive integer selects the provider default.
pub fn region_ttl(region: &str) -> Option<Duration> {
    region
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Facade over an optional [`CacheProvider`].
///
/// Writes take a `region` that is read as the time to live; see
/// [`region_ttl`]. Without a provider every read misses and every write is
/// dropped.
#[derive(Clone, Default)]
pub struct CacheService {
    provider: Option<Arc<dyn CacheProvider>>,
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("provider", &self.provider_type())
            .finish()
    }
}

impl CacheService {
    /// A service over `provider`.
    pub fn new(provider: Arc<dyn CacheProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// A service without a provider.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Kind of the configured provider.
    pub fn provider_type(&self) -> Option<CacheProviderType> {
        self.provider.as_ref().map(|p| p.provider_type())
    }

    /// Returns true if entries are stored through a persistence engine.
    pub fn is_native_persistence(&self) -> bool {
        self.provider_type() == Some(CacheProviderType::NativePersistence)
    }

    /// The live value under `key`.
    pub fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        match &self.provider {
            Some(provider) => provider.get(key),
            None => Ok(None),
        }
    }

    /// Store `value` under `key`, living for `region` seconds.
    pub fn put(&self, region: &str, key: &str, value: &[u8]) -> CacheResult<()> {
        let Some(provider) = &self.provider else {
            trace!(key, "no cache provider, dropping write");
            return Ok(());
        };
        provider.put(region_ttl(region), key, value)
    }

    /// Drop `key`.
    pub fn remove(&self, key: &str) -> CacheResult<()> {
        match &self.provider {
            Some(provider) => provider.remove(key),
            None => Ok(()),
        }
    }

    /// Drop every entry.
    pub fn clear(&self) -> CacheResult<()> {
        match &self.provider {
            Some(provider) => provider.clear(),
            None => Ok(()),
        }
    }

    /// Decode the value under `key`.
    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        self.get(key)?.map(|bytes| decode(&bytes)).transpose()
    }

    /// Encode `value` and store it under `key` for `region` seconds.
    pub fn put_value<T: Serialize>(&self, region: &str, key: &str, value: &T) -> CacheResult<()> {
        if self.provider.is_none() {
            return Ok(());
        }
        self.put(region, key, &encode(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::InMemoryConfiguration;
    use crate::memory::InMemoryCacheProvider;
    use chrono::{TimeDelta, Utc};

    #[test]
    fn regions_are_seconds() {
        assert_eq!(region_ttl("300"), Some(Duration::from_secs(300)));
        assert_eq!(region_ttl(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(region_ttl("0"), None);
        assert_eq!(region_ttl("-5"), None);
        assert_eq!(region_ttl("sessions"), None);
        assert_eq!(region_ttl(""), None);
    }

    #[test]
    fn region_sets_lifetime() {
        let clock = ManualClock::new(Utc::now());
        let provider = InMemoryCacheProvider::with_clock(&InMemoryConfiguration::default(), Arc::new(clock.clone()));
        let cache = CacheService::new(Arc::new(provider));

        cache.put("5", "short", b"a").unwrap();
        cache.put("sessions", "default", b"b").unwrap();
        clock.advance(TimeDelta::seconds(5));
        assert_eq!(cache.get("short").unwrap(), None);
        assert_eq!(cache.get("default").unwrap().as_deref(), Some(&b"b"[..]));
        clock.advance(TimeDelta::seconds(55));
        assert_eq!(cache.get("default").unwrap(), None);
    }

    #[test]
    fn typed_round_trip_through_service() {
        let cache = CacheService::new(Arc::new(InMemoryCacheProvider::new(&InMemoryConfiguration::default())));
        cache.put_value("60", "n", &7u64).unwrap();
        assert_eq!(cache.get_value::<u64>("n").unwrap(), Some(7));
        cache.remove("n").unwrap();
        assert_eq!(cache.get_value::<u64>("n").unwrap(), None);
    }

    #[test]
    fn disabled_service_misses() {
        let cache = CacheService::disabled();
        cache.put("60", "k", b"v").unwrap();
        cache.put_value("60", "t", &1u8).unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
        assert_eq!(cache.provider_type(), None);
        assert!(!cache.is_native_persistence());
        cache.clear().unwrap();
    }
}
