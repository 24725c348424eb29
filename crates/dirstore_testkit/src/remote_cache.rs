//! A simulated remote key-value cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dirstore_cache::{CacheError, CacheResult, RemoteCacheClient};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct RemoteState {
    values: HashMap<String, (Vec<u8>, DateTime<Utc>)>,
    now: Option<DateTime<Utc>>,
    down: bool,
    writes: Vec<(String, Duration)>,
}

impl RemoteState {
    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }

    fn check(&self) -> CacheResult<()> {
        if self.down {
            Err(CacheError::remote("connection refused"))
        } else {
            Ok(())
        }
    }
}

/// In-memory stand-in for a key-value server with native expiry.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteCache {
    shared: Arc<Mutex<RemoteState>>,
}

impl MemoryRemoteCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the server clock.
    pub fn set_now(&self, now: DateTime<Utc>) {
        self.shared.lock().now = Some(now);
    }

    /// Make every call fail.
    pub fn set_down(&self, down: bool) {
        self.shared.lock().down = down;
    }

    /// Keys and time to live of every write, in order.
    pub fn writes(&self) -> Vec<(String, Duration)> {
        self.shared.lock().writes.clone()
    }
}

impl RemoteCacheClient for MemoryRemoteCache {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let state = self.shared.lock();
        state.check()?;
        let now = state.now();
        Ok(state
            .values
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone()))
    }

    fn set_with_expiry(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let mut state = self.shared.lock();
        state.check()?;
        let expires_at = state.now() + TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        state.values.insert(key.to_string(), (value.to_vec(), expires_at));
        state.writes.push((key.to_string(), ttl));
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        let mut state = self.shared.lock();
        state.check()?;
        state.values.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn flush(&self) -> CacheResult<()> {
        let mut state = self.shared.lock();
        state.check()?;
        state.values.clear();
        Ok(())
    }
}
