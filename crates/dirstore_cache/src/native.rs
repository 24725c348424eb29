//! Cache entries stored through a persistence engine.
//!
//! Each key becomes one entry `uuid=<sha256(key)>,ou=cache,<base DN>`
//! holding the base64 payload with its creation and expiry times. Backends
//! that expire entries natively get the time to live passed along; the
//! others are swept by [`CacheProvider::cleanup`] in bounded batches.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, TimeDelta, Utc};
use dirstore_core::mapping::EntrySchema;
use dirstore_core::{DataEntry, EntryManager, PersistenceEngine};
use dirstore_model::{dn, Attribute, Entry, Filter, OBJECT_CLASS};
use sha2::{Digest, Sha256};
use tracing::{debug, info, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::NativePersistenceConfiguration;
use crate::error::{CacheError, CacheResult};
use crate::provider::{effective_ttl, CacheProvider, CacheProviderType};

/// RDN value of the branch holding cache entries.
pub const CACHE_BRANCH: &str = "cache";

/// A cache entry as stored in the backend.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheRecord {
    /// Entry DN.
    pub dn: String,
    /// SHA-256 of the key, hex encoded.
    pub uuid: String,
    /// Time of the write.
    pub created_at: Option<DateTime<Utc>>,
    /// Time after which the entry is dead.
    pub expires_at: Option<DateTime<Utc>>,
    /// Seconds to live.
    pub ttl: Option<i64>,
    /// Base64 payload.
    pub data: String,
    /// Whether sweeps may delete the entry.
    pub deletable: bool,
}

impl DataEntry for CacheRecord {
    fn schema() -> &'static EntrySchema<Self> {
        static SCHEMA: OnceLock<EntrySchema<CacheRecord>> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            EntrySchema::<CacheRecord>::builder("CacheRecord")
                .object_classes(["cache"])
                .dn(|r| &r.dn, |r, dn| r.dn = dn)
                .attribute("uuid", |r| &r.uuid, |r, v| r.uuid = v)
                .attribute("iat", |r| &r.created_at, |r, v| r.created_at = v)
                .attribute("exp", |r| &r.expires_at, |r, v| r.expires_at = v)
                .attribute("ttl", |r| &r.ttl, |r, v| r.ttl = v)
                .attribute("dat", |r| &r.data, |r, v| r.data = v)
                .attribute("del", |r| &r.deletable, |r, v| r.deletable = v)
                .ttl(|r| r.ttl)
                .build()
        })
    }
}

impl CacheRecord {
    /// Returns true if sweeps may delete the entry and it expired by `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deletable && self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Hex SHA-256 of a cache key.
pub fn hash_key(key: &str) -> String {
    Sha256::digest(key.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Cache provider over a [`PersistenceEngine`].
pub struct NativePersistenceCacheProvider {
    engine: Arc<dyn PersistenceEngine>,
    branch: String,
    default_ttl: Duration,
    cleanup_batch_size: usize,
    delete_expired_on_get: bool,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for NativePersistenceCacheProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativePersistenceCacheProvider")
            .field("backend", &self.engine.backend_name())
            .field("branch", &self.branch)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl NativePersistenceCacheProvider {
    /// Create the provider, adding the cache branch if the backend has
    /// branches and it is missing.
    ///
    /// # Errors
    ///
    /// Fails if the base DN is empty or the branch cannot be created.
    pub fn create(engine: Arc<dyn PersistenceEngine>, config: &NativePersistenceConfiguration) -> CacheResult<Self> {
        let base_dn = config.base_dn.trim();
        if base_dn.is_empty() {
            return Err(CacheError::configuration(
                "native persistence cache needs a base DN",
            ));
        }
        let branch = dn::child("ou", CACHE_BRANCH, base_dn);

        if engine.has_branches_support(&branch) && !engine.exists(&branch)? {
            let entry = Entry::with_attributes(
                branch.clone(),
                vec![
                    Attribute::multi(OBJECT_CLASS, ["top", "organizationalUnit"]),
                    Attribute::single("ou", CACHE_BRANCH),
                ],
            );
            engine.add(&entry, None)?;
            info!(branch = %branch, "created cache branch");
        }

        debug!(
            backend = engine.backend_name(),
            branch = %branch,
            default_put_expiration = config.default_put_expiration,
            "native persistence cache ready"
        );
        Ok(Self {
            engine,
            branch,
            default_ttl: Duration::from_secs(config.default_put_expiration),
            cleanup_batch_size: config.default_cleanup_batch_size,
            delete_expired_on_get: config.delete_expired_on_get,
            clock: Arc::new(SystemClock),
        })
    }

    /// Judge expiry by `clock` instead of the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// DN of the branch holding the entries.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Entries reaped per scheduled cleanup pass.
    pub fn cleanup_batch_size(&self) -> usize {
        self.cleanup_batch_size
    }

    /// DN of the entry holding `key`.
    pub fn entry_dn(&self, key: &str) -> String {
        dn::child("uuid", &hash_key(key), &self.branch)
    }

    fn remove_quietly(&self, entry_dn: &str) {
        if let Err(err) = self.engine.delete(entry_dn) {
            warn!(dn = %entry_dn, error = %err, "failed to delete cache entry");
        }
    }
}

impl CacheProvider for NativePersistenceCacheProvider {
    fn provider_type(&self) -> CacheProviderType {
        CacheProviderType::NativePersistence
    }

    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let entry_dn = self.entry_dn(key);
        let record = match self.engine.find::<CacheRecord>(&entry_dn) {
            Ok(record) => record,
            Err(err) => {
                trace!(dn = %entry_dn, error = %err, "cache miss");
                return Ok(None);
            }
        };

        if record.is_expired(self.clock.now()) {
            if self.delete_expired_on_get {
                self.remove_quietly(&entry_dn);
            }
            return Ok(None);
        }

        match BASE64.decode(record.data.as_bytes()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) => {
                warn!(dn = %entry_dn, error = %err, "unreadable cache payload");
                Ok(None)
            }
        }
    }

    fn put(&self, ttl: Option<Duration>, key: &str, value: &[u8]) -> CacheResult<()> {
        let ttl = effective_ttl(ttl, self.default_ttl);
        let now = self.clock.now();
        let uuid = hash_key(key);
        let record = CacheRecord {
            dn: dn::child("uuid", &uuid, &self.branch),
            uuid,
            created_at: Some(now),
            expires_at: Some(now + TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX)),
            ttl: Some(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
            data: BASE64.encode(value),
            deletable: true,
        };

        if self.engine.exists(&record.dn)? {
            self.remove_quietly(&record.dn);
        }
        self.engine.persist(&record)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        let entry_dn = self.entry_dn(key);
        if self.engine.exists(&entry_dn)? {
            self.engine.delete(&entry_dn)?;
        }
        Ok(())
    }

    fn clear(&self) -> CacheResult<()> {
        let removed = self.engine.remove_by_filter::<CacheRecord>(&self.branch, None, 0)?;
        debug!(branch = %self.branch, removed, "cleared cache");
        Ok(())
    }

    fn has_key(&self, key: &str) -> CacheResult<bool> {
        Ok(self.engine.contains::<CacheRecord>(&self.entry_dn(key))?)
    }

    fn cleanup(&self, now: DateTime<Utc>, batch_size: usize) -> CacheResult<usize> {
        if self.engine.has_expiration_support(&self.branch) {
            return Ok(0);
        }
        let filter = Filter::and(vec![
            Filter::equality("del", true),
            Filter::less_or_equal("exp", now),
        ]);
        match self
            .engine
            .remove_by_filter::<CacheRecord>(&self.branch, Some(filter), batch_size)
        {
            Ok(removed) => {
                debug!(branch = %self.branch, removed, "swept expired cache entries");
                Ok(removed)
            }
            Err(err) => {
                warn!(branch = %self.branch, error = %err, "cache sweep failed");
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_hash_to_hex() {
        let hash = hash_key("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash_key("abd"), hash);
    }

    #[test]
    fn expiry_needs_the_deletable_flag() {
        let now = Utc::now();
        let mut record = CacheRecord {
            expires_at: Some(now),
            deletable: true,
            ..CacheRecord::default()
        };
        assert!(record.is_expired(now));
        assert!(!record.is_expired(now - TimeDelta::seconds(1)));
        record.deletable = false;
        assert!(!record.is_expired(now + TimeDelta::days(1)));
    }
}
