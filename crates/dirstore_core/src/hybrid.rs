//! Routing between engines by DN branch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dirstore_model::{dn, Entry, Modification, PagedResult, SearchRequest};
use tracing::{debug, info};

use crate::batch::{BatchCursor, ScanOutcome};
use crate::engine::PersistenceEngine;
use crate::error::{PersistError, PersistResult};
use crate::hints::SchemaHints;
use crate::mapping::MappingProfile;
use crate::notify::DeleteNotifier;

const DEFAULT_KEY: &str = "storage.default";

/// A [`PersistenceEngine`] that delegates each call to one of several
/// engines.
///
/// The branch of a DN is the value of the RDN directly below the naming
/// context: `people` for `uid=alice,ou=people,o=example`. Branches without
/// a route go to the default engine.
pub struct HybridPersistenceEngine {
    default_name: String,
    default: Arc<dyn PersistenceEngine>,
    engines: HashMap<String, Arc<dyn PersistenceEngine>>,
    routes: HashMap<String, String>,
}

impl std::fmt::Debug for HybridPersistenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridPersistenceEngine")
            .field("default", &self.default_name)
            .field("routes", &self.routes)
            .finish()
    }
}

impl HybridPersistenceEngine {
    /// Create a router with only a default engine.
    pub fn new(default_name: impl Into<String>, engine: Arc<dyn PersistenceEngine>) -> Self {
        let default_name = default_name.into();
        let mut engines = HashMap::new();
        engines.insert(default_name.clone(), Arc::clone(&engine));
        Self {
            default_name,
            default: engine,
            engines,
            routes: HashMap::new(),
        }
    }

    /// Register an engine and the branches it serves.
    #[must_use]
    pub fn with_engine<S: AsRef<str>>(
        mut self,
        name: impl Into<String>,
        engine: Arc<dyn PersistenceEngine>,
        branches: impl IntoIterator<Item = S>,
    ) -> Self {
        let name = name.into();
        for branch in branches {
            self.routes
                .insert(branch.as_ref().trim().to_lowercase(), name.clone());
        }
        self.engines.insert(name, engine);
        self
    }

    /// Build a router from `storage.default` and `storage.<name>.mapping`
    /// properties over already constructed engines.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the default or a mapped engine is
    /// missing from `engines`.
    pub fn from_properties(
        properties: &HashMap<String, String>,
        mut engines: HashMap<String, Arc<dyn PersistenceEngine>>,
    ) -> PersistResult<Self> {
        let default_name = properties
            .get(DEFAULT_KEY)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PersistError::configuration(format!("{DEFAULT_KEY} is not set")))?;
        let default = engines
            .remove(&default_name)
            .ok_or_else(|| PersistError::configuration(format!("no engine named {default_name}")))?;

        let mut hybrid = Self::new(default_name, default);
        for (key, value) in properties {
            let Some(name) = key
                .strip_prefix("storage.")
                .and_then(|rest| rest.strip_suffix(".mapping"))
            else {
                continue;
            };
            let engine = match engines.remove(name) {
                Some(engine) => engine,
                None => hybrid
                    .engines
                    .get(name)
                    .cloned()
                    .ok_or_else(|| PersistError::configuration(format!("no engine named {name}")))?,
            };
            let branches: Vec<&str> = value.split(',').filter(|b| !b.trim().is_empty()).collect();
            hybrid = hybrid.with_engine(name, engine, branches);
        }
        info!(default = %hybrid.default_name, routes = hybrid.routes.len(), "hybrid engine ready");
        Ok(hybrid)
    }

    /// Branch name of a DN, lowercased.
    pub fn branch_of(entry_dn: &str) -> Option<String> {
        let rdns = dn::rdns(entry_dn);
        let rdn = rdns.len().checked_sub(2).map(|i| rdns[i])?;
        dn::rdn_parts(rdn).ok().map(|(_, value)| value.to_lowercase())
    }

    /// Engine serving `entry_dn`.
    pub fn engine_for(&self, entry_dn: &str) -> &Arc<dyn PersistenceEngine> {
        let routed = Self::branch_of(entry_dn)
            .and_then(|branch| self.routes.get(&branch))
            .and_then(|name| self.engines.get(name));
        match routed {
            Some(engine) => engine,
            None => self.default_engine(),
        }
    }

    fn default_engine(&self) -> &Arc<dyn PersistenceEngine> {
        &self.default
    }
}

impl PersistenceEngine for HybridPersistenceEngine {
    fn backend_name(&self) -> &'static str {
        "hybrid"
    }

    fn mapping_profile(&self) -> MappingProfile {
        self.default_engine().mapping_profile()
    }

    fn authenticate(&self, base_dn: Option<&str>, identifier: &str, secret: &str) -> PersistResult<bool> {
        let target = if dn::looks_like_dn(identifier) {
            identifier
        } else {
            base_dn.unwrap_or_default()
        };
        self.engine_for(target).authenticate(base_dn, identifier, secret)
    }

    fn add(&self, entry: &Entry, ttl: Option<Duration>) -> PersistResult<()> {
        let engine = self.engine_for(&entry.dn);
        debug!(dn = %entry.dn, backend = engine.backend_name(), "routing add");
        engine.add(entry, ttl)
    }

    fn modify(&self, dn: &str, changes: &[Modification]) -> PersistResult<()> {
        self.engine_for(dn).modify(dn, changes)
    }

    fn lookup(&self, dn: &str, attributes: &[String]) -> PersistResult<Entry> {
        self.engine_for(dn).lookup(dn, attributes)
    }

    fn exists(&self, dn: &str) -> PersistResult<bool> {
        self.engine_for(dn).exists(dn)
    }

    fn delete(&self, dn: &str) -> PersistResult<()> {
        self.engine_for(dn).delete(dn)
    }

    fn delete_subtree(&self, dn: &str) -> PersistResult<()> {
        self.engine_for(dn).delete_subtree(dn)
    }

    fn delete_matching(&self, request: &SearchRequest, hints: &SchemaHints, limit: usize) -> PersistResult<usize> {
        self.engine_for(&request.base_dn)
            .delete_matching(request, hints, limit)
    }

    fn search(&self, request: &SearchRequest, hints: &SchemaHints) -> PersistResult<Vec<Entry>> {
        self.engine_for(&request.base_dn).search(request, hints)
    }

    fn search_paged(&self, request: &SearchRequest, hints: &SchemaHints) -> PersistResult<PagedResult<Entry>> {
        self.engine_for(&request.base_dn).search_paged(request, hints)
    }

    fn scan(
        &self,
        request: &SearchRequest,
        hints: &SchemaHints,
        cursor: Option<BatchCursor>,
        collect: &mut dyn FnMut(&[Entry]) -> bool,
        process: &mut dyn FnMut(&[Entry]),
    ) -> PersistResult<ScanOutcome> {
        self.engine_for(&request.base_dn)
            .scan(request, hints, cursor, collect, process)
    }

    fn count(&self, request: &SearchRequest, hints: &SchemaHints) -> PersistResult<usize> {
        self.engine_for(&request.base_dn).count(request, hints)
    }

    fn has_branches_support(&self, dn: &str) -> bool {
        self.engine_for(dn).has_branches_support(dn)
    }

    fn has_expiration_support(&self, dn: &str) -> bool {
        self.engine_for(dn).has_expiration_support(dn)
    }

    fn encode_time(&self, at: &DateTime<Utc>) -> String {
        self.default_engine().encode_time(at)
    }

    fn decode_time(&self, text: &str) -> Option<DateTime<Utc>> {
        self.default_engine().decode_time(text).or_else(|| {
            self.engines
                .values()
                .find_map(|engine| engine.decode_time(text))
        })
    }

    fn add_delete_notifier(&self, notifier: Arc<dyn DeleteNotifier>) {
        for engine in self.engines.values() {
            engine.add_delete_notifier(Arc::clone(&notifier));
        }
    }

    fn close(&self) {
        for engine in self.engines.values() {
            engine.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_is_the_rdn_below_the_naming_context() {
        assert_eq!(
            HybridPersistenceEngine::branch_of("uid=alice,ou=People,o=example").as_deref(),
            Some("people")
        );
        assert_eq!(
            HybridPersistenceEngine::branch_of("ou=sessions,o=example").as_deref(),
            Some("sessions")
        );
        assert_eq!(HybridPersistenceEngine::branch_of("o=example"), None);
    }
}
