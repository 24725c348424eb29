//! The directory persistence engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dirstore_model::{time, Entry, Modification, PagedResult, SearchRequest};
use dirstore_pool::{ConnectionPool, Connector, PoolConfig};
use tracing::{debug, info};

use super::connection::DirectoryConnection;
use super::operations::OperationsFacade;
use crate::batch::{BatchCursor, ScanOutcome};
use crate::config::EngineConfig;
use crate::engine::PersistenceEngine;
use crate::error::PersistResult;
use crate::hints::{AttributeTypeCache, SchemaHints};
use crate::mapping::MappingProfile;
use crate::notify::{DeleteNotifier, DeleteNotifiers};

/// [`PersistenceEngine`] over a hierarchical directory.
///
/// Entries keep every object class, children are supported, and native
/// expiry is not.
pub struct LdapEntryManager<K: Connector> {
    facade: OperationsFacade<K>,
    attribute_types: AttributeTypeCache,
    notifiers: DeleteNotifiers,
}

impl<K: Connector> std::fmt::Debug for LdapEntryManager<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapEntryManager")
            .field("facade", &self.facade)
            .field("notifiers", &self.notifiers)
            .finish()
    }
}

impl<K> LdapEntryManager<K>
where
    K: Connector,
    K::Connection: DirectoryConnection,
{
    /// Wrap an operations facade.
    pub fn new(facade: OperationsFacade<K>) -> Self {
        Self {
            facade,
            attribute_types: AttributeTypeCache::new(),
            notifiers: DeleteNotifiers::new(),
        }
    }

    /// Build the engine and its pools from a properties map.
    ///
    /// A `bindConnection.servers` key adds a separate pool for user
    /// authentication.
    ///
    /// # Errors
    ///
    /// Configuration errors for malformed properties, connection errors
    /// when no server could be reached within the creation window.
    pub fn from_properties(connector: K, properties: &HashMap<String, String>) -> PersistResult<Self>
    where
        K: Clone,
    {
        let config = EngineConfig::from_properties(properties);
        let pool = ConnectionPool::create(connector.clone(), PoolConfig::from_properties(properties)?)?;
        let mut facade = OperationsFacade::new(pool, config);
        if let Some(bind_config) = PoolConfig::bind_pool_from_properties(properties)? {
            facade = facade.with_bind_pool(ConnectionPool::create(connector, bind_config)?);
        }
        info!(
            hosts = facade.pool().config().hosts.len(),
            security = ?facade.pool().security(),
            "directory engine ready"
        );
        Ok(Self::new(facade))
    }

    /// The operations facade.
    pub fn operations(&self) -> &OperationsFacade<K> {
        &self.facade
    }

    /// One window by virtual list view.
    ///
    /// # Errors
    ///
    /// Unsupported when the request is unsorted.
    pub fn search_virtual_list_view(
        &self,
        request: &SearchRequest,
        hints: &SchemaHints,
    ) -> PersistResult<PagedResult<Entry>> {
        self.facade
            .search_virtual_list_view(request, hints, Some(&self.attribute_types))
    }
}

impl<K> PersistenceEngine for LdapEntryManager<K>
where
    K: Connector,
    K::Connection: DirectoryConnection,
{
    fn backend_name(&self) -> &'static str {
        "ldap"
    }

    fn mapping_profile(&self) -> MappingProfile {
        MappingProfile {
            single_object_class: false,
        }
    }

    fn authenticate(&self, base_dn: Option<&str>, identifier: &str, secret: &str) -> PersistResult<bool> {
        self.facade.authenticate(identifier, secret, base_dn)
    }

    fn add(&self, entry: &Entry, ttl: Option<Duration>) -> PersistResult<()> {
        if let Some(ttl) = ttl {
            debug!(dn = %entry.dn, ttl_secs = ttl.as_secs(), "directory has no native expiry; ignoring ttl");
        }
        self.facade.add(entry)
    }

    fn modify(&self, dn: &str, changes: &[Modification]) -> PersistResult<()> {
        self.facade.modify(dn, changes)
    }

    fn lookup(&self, dn: &str, attributes: &[String]) -> PersistResult<Entry> {
        self.facade.lookup(dn, attributes)
    }

    fn exists(&self, dn: &str) -> PersistResult<bool> {
        self.facade.contains(dn)
    }

    fn delete(&self, dn: &str) -> PersistResult<()> {
        self.notifiers.around(dn, false, || self.facade.delete(dn))
    }

    fn delete_subtree(&self, dn: &str) -> PersistResult<()> {
        self.notifiers.around(dn, true, || self.facade.delete_subtree(dn))
    }

    fn delete_matching(&self, request: &SearchRequest, hints: &SchemaHints, limit: usize) -> PersistResult<usize> {
        let request = request
            .clone()
            .with_attributes(vec!["dn".to_string()])
            .with_size_limit(limit);
        let matches = self.search(&request, hints)?;
        let mut removed = 0;
        for entry in &matches {
            self.delete(&entry.dn)?;
            removed += 1;
        }
        debug!(base = %request.base_dn, removed, "deleted matching entries");
        Ok(removed)
    }

    fn search(&self, request: &SearchRequest, hints: &SchemaHints) -> PersistResult<Vec<Entry>> {
        self.facade.search(request, hints, Some(&self.attribute_types))
    }

    fn search_paged(&self, request: &SearchRequest, hints: &SchemaHints) -> PersistResult<PagedResult<Entry>> {
        self.facade
            .search_paged(request, hints, Some(&self.attribute_types))
    }

    fn scan(
        &self,
        request: &SearchRequest,
        hints: &SchemaHints,
        cursor: Option<BatchCursor>,
        collect: &mut dyn FnMut(&[Entry]) -> bool,
        process: &mut dyn FnMut(&[Entry]),
    ) -> PersistResult<ScanOutcome> {
        self.facade.scan(
            request,
            hints,
            Some(&self.attribute_types),
            cursor,
            collect,
            process,
        )
    }

    fn count(&self, request: &SearchRequest, hints: &SchemaHints) -> PersistResult<usize> {
        self.facade.count(request, hints, Some(&self.attribute_types))
    }

    fn has_branches_support(&self, _dn: &str) -> bool {
        true
    }

    fn has_expiration_support(&self, _dn: &str) -> bool {
        false
    }

    fn encode_time(&self, at: &DateTime<Utc>) -> String {
        time::format_generalized_time(at)
    }

    fn decode_time(&self, text: &str) -> Option<DateTime<Utc>> {
        time::parse_generalized_time(text).ok()
    }

    fn add_delete_notifier(&self, notifier: Arc<dyn DeleteNotifier>) {
        self.notifiers.register(notifier);
    }

    fn close(&self) {
        self.facade.close();
    }
}
