//! In-process cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::config::InMemoryConfiguration;
use crate::error::CacheResult;
use crate::provider::{effective_ttl, CacheProvider, CacheProviderType};

#[derive(Debug, Clone)]
struct CachedValue {
    value: Vec<u8>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// An expiring map. Entries expire a fixed time after they were written.
pub struct InMemoryCacheProvider {
    entries: Mutex<HashMap<String, CachedValue>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl InMemoryCacheProvider {
    /// A provider using the wall clock.
    pub fn new(config: &InMemoryConfiguration) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// A provider judging expiry by `clock`.
    pub fn with_clock(config: &InMemoryConfiguration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl: Duration::from_secs(config.default_put_expiration),
            clock,
        }
    }

    /// Number of stored entries, expired ones included until reaped.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// When the entry under `key` was last written.
    pub fn created_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.lock().get(key).map(|v| v.created_at)
    }
}

impl CacheProvider for InMemoryCacheProvider {
    fn provider_type(&self) -> CacheProviderType {
        CacheProviderType::InMemory
    }

    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(cached) if cached.expires_at > now => Ok(Some(cached.value.clone())),
            Some(_) => {
                entries.remove(key);
                trace!(key, "expired on read");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put(&self, ttl: Option<Duration>, key: &str, value: &[u8]) -> CacheResult<()> {
        let ttl = effective_ttl(ttl, self.default_ttl);
        let created_at = self.clock.now();
        let expires_at = created_at + TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let mut entries = self.entries.lock();
        // Drop the old record first so the new one starts a fresh lifetime.
        entries.remove(key);
        entries.insert(
            key.to_string(),
            CachedValue {
                value: value.to_vec(),
                created_at,
                expires_at,
            },
        );
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> CacheResult<()> {
        self.entries.lock().clear();
        Ok(())
    }

    fn has_key(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn cleanup(&self, now: DateTime<Utc>, batch_size: usize) -> CacheResult<usize> {
        let mut entries = self.entries.lock();
        let limit = if batch_size == 0 { usize::MAX } else { batch_size };
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, v)| v.expires_at <= now)
            .map(|(k, _)| k.clone())
            .take(limit)
            .collect();
        for key in &expired {
            entries.remove(key);
        }
        if !expired.is_empty() {
            debug!(removed = expired.len(), "reaped expired cache entries");
        }
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::provider::CacheProviderExt;

    fn provider() -> (InMemoryCacheProvider, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let provider = InMemoryCacheProvider::with_clock(
            &InMemoryConfiguration {
                default_put_expiration: 60,
            },
            Arc::new(clock.clone()),
        );
        (provider, clock)
    }

    #[test]
    fn values_expire_after_ttl() {
        let (cache, clock) = provider();
        cache.put(Some(Duration::from_secs(5)), "k", b"v").unwrap();
        clock.advance(TimeDelta::seconds(4));
        assert_eq!(cache.get("k").unwrap().as_deref(), Some(&b"v"[..]));
        clock.advance(TimeDelta::seconds(1));
        assert_eq!(cache.get("k").unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn rewrite_restarts_lifetime() {
        let (cache, clock) = provider();
        cache.put(Some(Duration::from_secs(5)), "k", b"v1").unwrap();
        clock.advance(TimeDelta::seconds(3));
        cache.put(Some(Duration::from_secs(5)), "k", b"v2").unwrap();
        let second = clock.now();
        assert_eq!(cache.created_at("k"), Some(second));

        clock.advance(TimeDelta::milliseconds(4_999));
        assert_eq!(cache.get("k").unwrap().as_deref(), Some(&b"v2"[..]));
        clock.set(second + TimeDelta::milliseconds(5_001));
        assert!(!cache.has_key("k").unwrap());
    }

    #[test]
    fn reads_do_not_extend_lifetime() {
        let (cache, clock) = provider();
        cache.put(Some(Duration::from_secs(2)), "k", b"v").unwrap();
        for _ in 0..3 {
            clock.advance(TimeDelta::milliseconds(500));
            assert!(cache.has_key("k").unwrap());
        }
        clock.advance(TimeDelta::milliseconds(500));
        assert!(!cache.has_key("k").unwrap());
    }

    #[test]
    fn missing_ttl_uses_default() {
        let (cache, clock) = provider();
        cache.put(None, "a", b"1").unwrap();
        cache.put(Some(Duration::ZERO), "b", b"2").unwrap();
        clock.advance(TimeDelta::seconds(59));
        assert!(cache.has_key("a").unwrap() && cache.has_key("b").unwrap());
        clock.advance(TimeDelta::seconds(1));
        assert!(!cache.has_key("a").unwrap());
        assert!(!cache.has_key("b").unwrap());
    }

    #[test]
    fn cleanup_is_bounded() {
        let (cache, clock) = provider();
        for i in 0..5 {
            cache.put(Some(Duration::from_secs(1)), &format!("k{i}"), b"v").unwrap();
        }
        cache.put(Some(Duration::from_secs(100)), "keep", b"v").unwrap();
        clock.advance(TimeDelta::seconds(2));

        assert_eq!(cache.cleanup(clock.now(), 3).unwrap(), 3);
        assert_eq!(cache.cleanup(clock.now(), 0).unwrap(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.has_key("keep").unwrap());
    }

    #[test]
    fn typed_values() {
        let (cache, _) = provider();
        cache.put_value(None, "grant", &vec!["read".to_string(), "write".to_string()]).unwrap();
        let scopes: Option<Vec<String>> = cache.get_value("grant").unwrap();
        assert_eq!(scopes.unwrap(), ["read", "write"]);
        cache.remove("grant").unwrap();
        assert_eq!(cache.get_value::<Vec<String>>("grant").unwrap(), None);
        cache.put(None, "x", b"y").unwrap();
        cache.clear().unwrap();
        assert!(cache.is_empty());
    }
}
