//! The document store persistence engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dirstore_model::{dn, time, Entry, Filter, Modification, PagedResult, SearchRequest};
use dirstore_pool::{ConnectionPool, Connector};
use tracing::{debug, warn};

use super::connection::{Document, DocumentConnection, DocumentQuery, ScanConsistency};
use super::convert::{DocumentCodec, DN_FIELD};
use super::key::document_key;
use crate::backend::{OperationError, OperationResult};
use crate::batch::{self, BatchCursor, ScanOutcome};
use crate::config::EngineConfig;
use crate::engine::PersistenceEngine;
use crate::error::{PersistError, PersistResult};
use crate::filter::{DocumentExpression, DocumentFilterTranslator, FilterTranslator, Translated};
use crate::hints::{AttributeHints, SchemaHints};
use crate::ldap::effective_page_size;
use crate::mapping::MappingProfile;
use crate::notify::{DeleteNotifier, DeleteNotifiers};
use crate::password::PasswordEncoding;

/// [`PersistenceEngine`] over a document store.
///
/// Documents are flat: there are no branches, only the first object class
/// is stored, and entries may expire natively.
pub struct DocumentEntryManager<K: Connector> {
    pool: ConnectionPool<K>,
    config: EngineConfig,
    translator: DocumentFilterTranslator,
    notifiers: DeleteNotifiers,
}

impl<K: Connector> std::fmt::Debug for DocumentEntryManager<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentEntryManager")
            .field("pool", &self.pool)
            .field("config", &self.config)
            .finish()
    }
}

struct PreparedQuery {
    base_key: String,
    translated: Translated<DocumentExpression>,
    fields: Vec<String>,
}

impl PreparedQuery {
    fn query<'a>(&'a self, request: &'a SearchRequest, offset: usize, limit: usize) -> DocumentQuery<'a> {
        DocumentQuery {
            base_key: &self.base_key,
            scope: request.scope,
            filter: &self.translated.expression,
            fields: &self.fields,
            order_by: &request.sort_by,
            order: request.sort_order,
            offset,
            limit,
            consistency: if self.translated.consistency_required {
                ScanConsistency::RequestPlus
            } else {
                ScanConsistency::NotBounded
            },
        }
    }
}

/// Fields to fetch. Empty means the whole document; otherwise the DN field
/// is always included so the document can be decoded.
fn projection(attributes: &[String]) -> Vec<String> {
    if attributes.is_empty() || attributes.iter().any(|a| a == "*") {
        return Vec::new();
    }
    let mut fields = attributes.to_vec();
    if !fields.iter().any(|f| f.eq_ignore_ascii_case(DN_FIELD)) {
        fields.push(DN_FIELD.to_string());
    }
    fields
}

impl<K> DocumentEntryManager<K>
where
    K: Connector,
    K::Connection: DocumentConnection,
{
    /// Create an engine over a pool.
    pub fn new(pool: ConnectionPool<K>, config: EngineConfig) -> Self {
        Self {
            pool,
            config,
            translator: DocumentFilterTranslator,
            notifiers: DeleteNotifiers::new(),
        }
    }

    /// Default configuration: passwords are hashed client side, since the
    /// store does not hash them.
    pub fn default_config() -> EngineConfig {
        EngineConfig::new().password_encoding(PasswordEncoding::Ssha256)
    }

    /// The pool.
    pub fn pool(&self) -> &ConnectionPool<K> {
        &self.pool
    }

    fn codec(&self) -> DocumentCodec<'_> {
        DocumentCodec::new(&self.config)
    }

    fn with_connection<T>(
        &self,
        operation: &'static str,
        target: &str,
        classify: fn(&str, OperationError) -> PersistError,
        run: impl FnOnce(&mut K::Connection) -> OperationResult<T>,
    ) -> PersistResult<T> {
        let started = Instant::now();
        let mut conn = self.pool.acquire()?;
        let result = run(&mut *conn);
        debug!(
            operation,
            target,
            connection = %conn.id(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "document operation finished"
        );
        result.map_err(|err| {
            if err.is_connection_loss() {
                self.pool.release_defunct(conn);
            }
            classify(target, err)
        })
    }

    fn prepare(&self, request: &SearchRequest, hints: &SchemaHints, fields: Vec<String>) -> PersistResult<PreparedQuery> {
        Ok(PreparedQuery {
            base_key: document_key(&request.base_dn)?,
            translated: self.translator.translate(&request.filter, hints)?,
            fields: projection(&fields),
        })
    }

    fn entries(&self, documents: &[Document], hints: &dyn AttributeHints) -> PersistResult<Vec<Entry>> {
        let codec = self.codec();
        documents.iter().map(|d| codec.from_document(d, hints)).collect()
    }

    fn find_user(&self, base_dn: Option<&str>, identifier: &str) -> PersistResult<Option<Entry>> {
        let mut fields = self.config.password_attributes.clone();
        fields.push(DN_FIELD.to_string());

        if dn::looks_like_dn(identifier) {
            let key = document_key(identifier)?;
            let found = self.with_connection("get", identifier, PersistError::from_read, |c| {
                c.get(&key, &fields)
            })?;
            return found
                .map(|d| self.codec().from_document(&d, &SchemaHints::empty()))
                .transpose();
        }

        let Some(base_dn) = base_dn else {
            return Ok(None);
        };
        let request = SearchRequest::new(base_dn, Filter::equality("uid", identifier)).with_size_limit(1);
        let prepared = self.prepare(&request, &SchemaHints::empty(), fields)?;
        let found = self.with_connection("find_user", base_dn, PersistError::from_read, |c| {
            c.query(&prepared.query(&request, 0, 1))
        })?;
        Ok(self.entries(&found, &SchemaHints::empty())?.into_iter().next())
    }

    fn remove_subtree_documents(&self, dn: &str) -> PersistResult<usize> {
        let request = SearchRequest::new(dn, Filter::any_entry());
        let prepared = PreparedQuery {
            base_key: document_key(dn)?,
            translated: Translated {
                expression: DocumentExpression::Exists {
                    field: DN_FIELD.to_string(),
                },
                consistency_required: true,
            },
            fields: vec![DN_FIELD.to_string()],
        };
        let found = self.with_connection("delete_subtree", dn, PersistError::from_read, |c| {
            c.query(&prepared.query(&request, 0, 0))
        })?;
        // Children first, the base last.
        let mut keys: Vec<&str> = found.iter().map(|d| d.key.as_str()).collect();
        keys.sort_by_key(|k| std::cmp::Reverse(k.len()));
        for key in &keys {
            self.with_connection("delete", key, PersistError::from_write, |c| c.remove(key))?;
        }
        Ok(keys.len())
    }
}

impl<K> PersistenceEngine for DocumentEntryManager<K>
where
    K: Connector,
    K::Connection: DocumentConnection,
{
    fn backend_name(&self) -> &'static str {
        "document"
    }

    fn mapping_profile(&self) -> MappingProfile {
        MappingProfile {
            single_object_class: true,
        }
    }

    fn authenticate(&self, base_dn: Option<&str>, identifier: &str, secret: &str) -> PersistResult<bool> {
        if secret.is_empty() {
            return Ok(false);
        }
        let Some(user) = self.find_user(base_dn, identifier)? else {
            debug!(identifier, "user not found");
            return Ok(false);
        };
        let verified = self.config.password_attributes.iter().any(|name| {
            user.get(name)
                .is_some_and(|a| a.values.iter().any(|v| PasswordEncoding::verify(&v.to_text(), secret)))
        });
        debug!(dn = %user.dn, verified, "authenticate finished");
        Ok(verified)
    }

    fn add(&self, entry: &Entry, ttl: Option<Duration>) -> PersistResult<()> {
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);
        let document = self.codec().to_document(entry, expires_at)?;
        self.with_connection("add", &entry.dn, PersistError::from_write, |c| c.insert(document))
    }

    fn modify(&self, dn: &str, changes: &[Modification]) -> PersistResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let key = document_key(dn)?;
        let mutations = self.codec().to_mutations(changes);
        self.with_connection("modify", dn, PersistError::from_write, |c| c.mutate(&key, &mutations))
    }

    fn lookup(&self, dn: &str, attributes: &[String]) -> PersistResult<Entry> {
        let key = document_key(dn)?;
        let fields = projection(attributes);
        let found = self.with_connection("lookup", dn, PersistError::from_read, |c| c.get(&key, &fields))?;
        let document = found.ok_or_else(|| PersistError::connection(format!("{dn}: entry not found")))?;
        let mut entry = self.codec().from_document(&document, &SchemaHints::empty())?;
        entry.retain_attributes(attributes);
        Ok(entry)
    }

    fn exists(&self, dn: &str) -> PersistResult<bool> {
        let key = document_key(dn)?;
        let fields = vec![DN_FIELD.to_string()];
        self.with_connection("exists", dn, PersistError::from_read, |c| match c.get(&key, &fields) {
            Ok(found) => Ok(found.is_some()),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        })
    }

    fn delete(&self, dn: &str) -> PersistResult<()> {
        let key = document_key(dn)?;
        self.notifiers.around(dn, false, || {
            self.with_connection("delete", dn, PersistError::from_write, |c| c.remove(&key))
        })
    }

    fn delete_subtree(&self, dn: &str) -> PersistResult<()> {
        self.notifiers.around(dn, true, || {
            let removed = self.remove_subtree_documents(dn)?;
            debug!(dn, removed, "removed documents below key");
            Ok(())
        })
    }

    fn delete_matching(&self, request: &SearchRequest, hints: &SchemaHints, limit: usize) -> PersistResult<usize> {
        let prepared = self.prepare(request, hints, vec![DN_FIELD.to_string()])?;
        let found = self.with_connection("delete_matching", &request.base_dn, PersistError::from_read, |c| {
            c.query(&prepared.query(request, 0, limit))
        })?;
        let mut removed = 0;
        for document in &found {
            let dn = document
                .body
                .get(DN_FIELD)
                .and_then(|v| v.as_str())
                .unwrap_or(&document.key)
                .to_string();
            self.notifiers.around(&dn, false, || {
                self.with_connection("delete", &dn, PersistError::from_write, |c| c.remove(&document.key))
            })?;
            removed += 1;
        }
        Ok(removed)
    }

    fn search(&self, request: &SearchRequest, hints: &SchemaHints) -> PersistResult<Vec<Entry>> {
        let prepared = self.prepare(request, hints, request.return_attributes.clone())?;
        let found = self.with_connection("search", &request.base_dn, PersistError::from_read, |c| {
            c.query(&prepared.query(request, 0, request.size_limit))
        })?;
        self.entries(&found, hints)
    }

    fn search_paged(&self, request: &SearchRequest, hints: &SchemaHints) -> PersistResult<PagedResult<Entry>> {
        let prepared = self.prepare(request, hints, request.return_attributes.clone())?;
        let (found, total) = self.with_connection("search_paged", &request.base_dn, PersistError::from_read, |c| {
            let query = prepared.query(request, request.start_index, request.size_limit);
            let found = c.query(&query)?;
            let total = c.count(&query)?;
            Ok((found, total))
        })?;
        Ok(PagedResult::new(self.entries(&found, hints)?, total, request.start_index))
    }

    fn scan(
        &self,
        request: &SearchRequest,
        hints: &SchemaHints,
        cursor: Option<BatchCursor>,
        collect: &mut dyn FnMut(&[Entry]) -> bool,
        process: &mut dyn FnMut(&[Entry]),
    ) -> PersistResult<ScanOutcome> {
        let (mut offset, mut delivered) = match &cursor {
            Some(cursor) => {
                let offset = std::str::from_utf8(cursor.token())
                    .ok()
                    .and_then(|t| t.parse::<usize>().ok())
                    .ok_or_else(|| PersistError::configuration("batch cursor does not belong to this engine"))?;
                (offset, cursor.delivered())
            }
            None => (request.start_index, 0),
        };
        let page_size = effective_page_size(request.page_size);
        let prepared = self.prepare(request, hints, request.return_attributes.clone())?;

        let mut outcome = ScanOutcome::default();
        let mut this_call = 0;
        loop {
            let page = self
                .with_connection("scan", &request.base_dn, PersistError::from_read, |c| {
                    c.query(&prepared.query(request, offset, page_size))
                })
                .map_err(|err| {
                    warn!(base = %request.base_dn, delivered, error = %err, "scan aborted");
                    err
                })?;
            let exhausted = page.len() < page_size;
            let entries = self.entries(&page, hints)?;
            offset += entries.len();
            this_call += entries.len();
            delivered += entries.len();
            if !entries.is_empty() {
                batch::deliver(entries, &mut outcome, collect, process);
            }
            if exhausted {
                return Ok(outcome);
            }
            if request.size_limit > 0 && this_call >= request.size_limit {
                break;
            }
        }

        outcome.cursor = Some(BatchCursor::new(offset.to_string().into_bytes(), None, delivered));
        Ok(outcome)
    }

    fn count(&self, request: &SearchRequest, hints: &SchemaHints) -> PersistResult<usize> {
        let prepared = self.prepare(request, hints, vec![DN_FIELD.to_string()])?;
        self.with_connection("count", &request.base_dn, PersistError::from_read, |c| {
            c.count(&prepared.query(request, 0, 0))
        })
    }

    fn has_branches_support(&self, _dn: &str) -> bool {
        false
    }

    fn has_expiration_support(&self, _dn: &str) -> bool {
        true
    }

    fn encode_time(&self, at: &DateTime<Utc>) -> String {
        time::format_document_time(at)
    }

    fn decode_time(&self, text: &str) -> Option<DateTime<Utc>> {
        time::parse_document_time(text).ok()
    }

    fn add_delete_notifier(&self, notifier: Arc<dyn DeleteNotifier>) {
        self.notifiers.register(notifier);
    }

    fn close(&self) {
        self.pool.close();
    }
}

