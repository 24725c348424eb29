//! The directory operation surface.

use std::time::Instant;

use dirstore_model::{dn, Attribute, Entry, Filter, Modification, PagedResult, SearchRequest, SearchScope, Value};
use dirstore_pool::{ConnectionPool, Connector, PooledConnection, ServerCapabilities};
use tracing::{debug, warn};

use super::connection::{DirectoryConnection, RawSearch};
use super::paging::{self, PagedScroll, PagingSupport, DN_ONLY};
use crate::backend::{OperationError, OperationResult};
use crate::batch::{self, BatchCursor, ScanOutcome};
use crate::config::{strip_binary_option, EngineConfig};
use crate::error::{PersistError, PersistResult};
use crate::filter::{FilterTranslator, LdapFilterTranslator};
use crate::hints::{AttributeTypeCache, AttributeTypes, SchemaHints};

const ANY_OBJECT: &str = "(objectClass=*)";
const BINARY_OPTION: &str = ";binary";

/// Operations against one directory backend.
///
/// Every call borrows a connection from the pool for its duration. A
/// connection that fails with a transport error is discarded, never
/// recycled.
pub struct OperationsFacade<K: Connector> {
    pool: ConnectionPool<K>,
    bind_pool: Option<ConnectionPool<K>>,
    config: EngineConfig,
    translator: LdapFilterTranslator,
}

impl<K: Connector> std::fmt::Debug for OperationsFacade<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationsFacade")
            .field("pool", &self.pool)
            .field("bind_pool", &self.bind_pool)
            .field("config", &self.config)
            .finish()
    }
}

impl<K> OperationsFacade<K>
where
    K: Connector,
    K::Connection: DirectoryConnection,
{
    /// Create a facade over a pool.
    pub fn new(pool: ConnectionPool<K>, config: EngineConfig) -> Self {
        Self {
            pool,
            bind_pool: None,
            config,
            translator: LdapFilterTranslator,
        }
    }

    /// Authenticate end users on a dedicated pool.
    #[must_use]
    pub fn with_bind_pool(mut self, bind_pool: ConnectionPool<K>) -> Self {
        self.bind_pool = Some(bind_pool);
        self
    }

    /// The shared pool.
    pub fn pool(&self) -> &ConnectionPool<K> {
        &self.pool
    }

    /// Engine options.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// What the server advertised when the pool was created.
    pub fn capabilities(&self) -> &ServerCapabilities {
        self.pool.capabilities()
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
            "directory operation finished"
        );
        result.map_err(|err| {
            if err.is_connection_loss() {
                self.pool.release_defunct(conn);
            }
            classify(target, err)
        })
    }

    /// Check a user's secret by binding as the user.
    ///
    /// Non-DN identifiers are resolved with an equality search on `uid`
    /// under `base_dn`. The connection used for the bind is discarded
    /// afterwards whatever the outcome.
    ///
    /// # Errors
    ///
    /// Only transport failures and pool errors; unknown users and rejected
    /// credentials give `Ok(false)`.
    pub fn authenticate(&self, identifier: &str, secret: &str, base_dn: Option<&str>) -> PersistResult<bool> {
        if secret.is_empty() {
            debug!(identifier, "refusing bind with an empty secret");
            return Ok(false);
        }
        let bind_dn = if dn::looks_like_dn(identifier) {
            identifier.to_string()
        } else {
            let Some(base_dn) = base_dn else {
                debug!(identifier, "identifier is not a DN and no base DN was given");
                return Ok(false);
            };
            match self.lookup_dn_by_uid(base_dn, identifier)? {
                Some(found) => found,
                None => {
                    debug!(identifier, base_dn, "user not found");
                    return Ok(false);
                }
            }
        };

        let pool = self.bind_pool.as_ref().unwrap_or(&self.pool);
        let started = Instant::now();
        let mut conn: PooledConnection<K> = pool.acquire()?;
        let id = conn.id();
        let result = conn.bind(&bind_dn, secret);
        pool.release_defunct(conn);
        debug!(
            dn = %bind_dn,
            connection = %id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "authenticate finished"
        );

        match result {
            Ok(()) => Ok(true),
            Err(OperationError::Result { code, message }) => {
                debug!(dn = %bind_dn, %code, message, "bind rejected");
                Ok(false)
            }
            Err(err @ OperationError::Transport { .. }) => Err(PersistError::from_read(&bind_dn, err)),
        }
    }

    /// DN of the entry whose `uid` equals `uid`, if exactly one is found
    /// first.
    pub fn lookup_dn_by_uid(&self, base_dn: &str, uid: &str) -> PersistResult<Option<String>> {
        let filter = self
            .translator
            .translate(&Filter::equality("uid", uid), &SchemaHints::empty())?
            .expression;
        let attributes: Vec<String> = DN_ONLY.iter().map(|s| s.to_string()).collect();
        let search = RawSearch {
            base_dn,
            scope: SearchScope::Subtree,
            filter: &filter,
            attributes: &attributes,
            size_limit: 1,
        };
        let found = self.with_connection("lookup_dn", base_dn, PersistError::from_read, |c| {
            match c.raw_search(&search, &[]) {
                Err(err) if err.is_not_found() => Ok(Vec::new()),
                other => other.map(|r| r.entries),
            }
        })?;
        Ok(found.into_iter().next().map(|e| e.dn))
    }

    /// Create an entry.
    ///
    /// # Errors
    ///
    /// Duplicate, access and schema failures get their own variants; any
    /// other failure is a connection error.
    pub fn add(&self, entry: &Entry) -> PersistResult<()> {
        let wire = self.to_wire_entry(entry);
        self.with_connection("add", &entry.dn, PersistError::from_write, |c| c.raw_add(&wire))
    }

    /// Modify an entry. An empty change list is a no-op.
    pub fn modify(&self, dn: &str, changes: &[Modification]) -> PersistResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let wire: Vec<Modification> = changes
            .iter()
            .map(|m| Modification {
                kind: m.kind,
                attribute: self.to_wire_attribute(&m.attribute),
            })
            .collect();
        self.with_connection("modify", dn, PersistError::from_write, |c| c.raw_modify(dn, &wire))
    }

    /// Delete one entry.
    pub fn delete(&self, dn: &str) -> PersistResult<()> {
        self.with_connection("delete", dn, PersistError::from_write, |c| c.raw_delete(dn, false))
    }

    /// Delete an entry and its descendants in one operation.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Unsupported`] without a round trip when the
    /// server did not advertise the subtree delete control.
    pub fn delete_subtree(&self, dn: &str) -> PersistResult<()> {
        if !self.capabilities().supports_subtree_delete() {
            return Err(PersistError::unsupported(format!(
                "server does not advertise subtree delete; refusing to delete {dn} alone"
            )));
        }
        self.with_connection("delete_subtree", dn, PersistError::from_write, |c| {
            c.raw_delete(dn, true)
        })
    }

    /// Read one entry.
    ///
    /// # Errors
    ///
    /// A missing entry and a transport failure are both connection errors.
    pub fn lookup(&self, dn: &str, attributes: &[String]) -> PersistResult<Entry> {
        let attributes = self.wire_attributes(attributes);
        let search = RawSearch {
            base_dn: dn,
            scope: SearchScope::Base,
            filter: ANY_OBJECT,
            attributes: &attributes,
            size_limit: 0,
        };
        let entries = self.with_connection("lookup", dn, PersistError::from_read, |c| {
            c.raw_search(&search, &[]).map(|r| r.entries)
        })?;
        entries
            .into_iter()
            .next()
            .map(|e| self.from_wire_entry(e))
            .ok_or_else(|| PersistError::connection(format!("{dn}: entry not found")))
    }

    /// Returns true if the entry exists. Not found is `Ok(false)`.
    pub fn contains(&self, dn: &str) -> PersistResult<bool> {
        let attributes: Vec<String> = DN_ONLY.iter().map(|s| s.to_string()).collect();
        let search = RawSearch {
            base_dn: dn,
            scope: SearchScope::Base,
            filter: ANY_OBJECT,
            attributes: &attributes,
            size_limit: 0,
        };
        self.with_connection("contains", dn, PersistError::from_read, |c| {
            match c.raw_search(&search, &[]) {
                Ok(result) => Ok(!result.entries.is_empty()),
                Err(err) if err.is_not_found() => Ok(false),
                Err(err) => Err(err),
            }
        })
    }

    /// Every match of a search, or the first `size_limit`.
    pub fn search(
        &self,
        request: &SearchRequest,
        hints: &SchemaHints,
        types: Option<&AttributeTypeCache>,
    ) -> PersistResult<Vec<Entry>> {
        let layered = hints.layered(self.server_types(types));
        let filter = self.translator.translate(&request.filter, &layered)?.expression;
        let attributes = self.wire_attributes(&request.return_attributes);
        let search = raw_search(request, &filter, &attributes);
        let support = self.paging_support();

        let entries = self.with_connection("search", &request.base_dn, PersistError::from_read, |c| {
            paging::search_all(c, search, request, support, &layered)
        })?;
        Ok(entries.into_iter().map(|e| self.from_wire_entry(e)).collect())
    }

    /// One window of results and the total count.
    ///
    /// Uses the virtual list view when the server supports it and the
    /// request is sorted, cookie scrolling otherwise.
    pub fn search_paged(
        &self,
        request: &SearchRequest,
        hints: &SchemaHints,
        types: Option<&AttributeTypeCache>,
    ) -> PersistResult<PagedResult<Entry>> {
        if self.capabilities().supports_virtual_list_view() && !request.sort_by.is_empty() {
            return self.search_virtual_list_view(request, hints, types);
        }
        self.search_window(request, hints, types)
    }

    /// One window by cookie scrolling.
    pub fn search_window(
        &self,
        request: &SearchRequest,
        hints: &SchemaHints,
        types: Option<&AttributeTypeCache>,
    ) -> PersistResult<PagedResult<Entry>> {
        let layered = hints.layered(self.server_types(types));
        let filter = self.translator.translate(&request.filter, &layered)?.expression;
        let attributes = self.wire_attributes(&request.return_attributes);
        let search = raw_search(request, &filter, &attributes);
        let support = self.paging_support();

        let window = self.with_connection("search_window", &request.base_dn, PersistError::from_read, |c| {
            paging::search_window(c, search, request, support, &layered)
        })?;
        Ok(self.window_from_wire(window))
    }

    /// One window by virtual list view.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Unsupported`] when the request has no sort
    /// attribute.
    pub fn search_virtual_list_view(
        &self,
        request: &SearchRequest,
        hints: &SchemaHints,
        types: Option<&AttributeTypeCache>,
    ) -> PersistResult<PagedResult<Entry>> {
        if request.sort_by.is_empty() {
            return Err(PersistError::unsupported(
                "virtual list view needs at least one sort attribute",
            ));
        }
        let layered = hints.layered(self.server_types(types));
        let filter = self.translator.translate(&request.filter, &layered)?.expression;
        let attributes = self.wire_attributes(&request.return_attributes);
        let search = raw_search(request, &filter, &attributes);

        let window = self.with_connection("search_vlv", &request.base_dn, PersistError::from_read, |c| {
            paging::search_virtual_list_view(c, search, request)
        })?;
        Ok(self.window_from_wire(window))
    }

    /// Number of matches, counted with DN-only pages.
    pub fn count(
        &self,
        request: &SearchRequest,
        hints: &SchemaHints,
        types: Option<&AttributeTypeCache>,
    ) -> PersistResult<usize> {
        let layered = hints.layered(self.server_types(types));
        let filter = self.translator.translate(&request.filter, &layered)?.expression;
        let attributes: Vec<String> = DN_ONLY.iter().map(|s| s.to_string()).collect();
        let search = RawSearch {
            size_limit: 0,
            ..raw_search(request, &filter, &attributes)
        };
        let paged = self.capabilities().supports_paged_results();

        self.with_connection("count", &request.base_dn, PersistError::from_read, |c| {
            if paged {
                PagedScroll::new(search, 0, 0).count_rest(c)
            } else {
                c.raw_search(&search, &[]).map(|r| r.entries.len())
            }
        })
    }

    /// Deliver results page by page; see [`crate::PersistenceEngine::scan`].
    ///
    /// A returned cursor owns the connection the scan runs on.
    ///
    /// # Errors
    ///
    /// A failed round trip aborts the call. Pages delivered before the
    /// failure stay delivered.
    pub fn scan(
        &self,
        request: &SearchRequest,
        hints: &SchemaHints,
        types: Option<&AttributeTypeCache>,
        cursor: Option<BatchCursor>,
        collect: &mut dyn FnMut(&[Entry]) -> bool,
        process: &mut dyn FnMut(&[Entry]),
    ) -> PersistResult<ScanOutcome> {
        let layered = hints.layered(self.server_types(types));
        let filter = self.translator.translate(&request.filter, &layered)?.expression;
        let attributes = self.wire_attributes(&request.return_attributes);
        let search = raw_search(request, &filter, &attributes);
        let search = RawSearch {
            size_limit: 0,
            ..search
        };

        let (mut conn, mut scroll, mut delivered) = match cursor {
            Some(mut cursor) => {
                let conn = cursor
                    .take_lease()
                    .and_then(|lease| lease.downcast::<PooledConnection<K>>().ok())
                    .ok_or_else(|| {
                        PersistError::configuration("batch cursor does not belong to this engine")
                    })?;
                let scroll = PagedScroll::resume(search, request.page_size, cursor.token().to_vec());
                (*conn, scroll, cursor.delivered())
            }
            None => (
                self.pool.acquire()?,
                PagedScroll::new(search, request.page_size, request.start_index),
                0,
            ),
        };

        let mut outcome = ScanOutcome::default();
        let mut this_call = 0;
        loop {
            let page = match scroll.next_page(&mut *conn) {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(err) => {
                    warn!(base = %request.base_dn, delivered, error = %err, "scan aborted");
                    if err.is_connection_loss() {
                        self.pool.release_defunct(conn);
                    }
                    return Err(PersistError::from_read(&request.base_dn, err));
                }
            };
            let page: Vec<Entry> = page.into_iter().map(|e| self.from_wire_entry(e)).collect();
            this_call += page.len();
            delivered += page.len();
            batch::deliver(page, &mut outcome, collect, process);

            if request.size_limit > 0 && this_call >= request.size_limit {
                break;
            }
        }

        if let Some(cookie) = scroll.cookie() {
            debug!(base = %request.base_dn, delivered, "scan paused");
            outcome.cursor = Some(BatchCursor::new(cookie.to_vec(), Some(Box::new(conn)), delivered));
        }
        Ok(outcome)
    }

    /// Attribute types published in the server's subschema entry.
    pub fn attribute_types(&self) -> PersistResult<AttributeTypes> {
        let subschema = self.capabilities().subschema_subentry.clone();
        let attributes = vec!["attributeTypes".to_string()];
        let search = RawSearch {
            base_dn: &subschema,
            scope: SearchScope::Base,
            filter: ANY_OBJECT,
            attributes: &attributes,
            size_limit: 0,
        };
        let entries = self.with_connection("attribute_types", &subschema, PersistError::from_read, |c| {
            c.raw_search(&search, &[]).map(|r| r.entries)
        })?;
        let definitions: Vec<String> = entries
            .iter()
            .filter_map(|e| e.get("attributeTypes"))
            .flat_map(Attribute::texts)
            .collect();
        Ok(AttributeTypes::from_definitions(&definitions))
    }

    /// Close both pools.
    pub fn close(&self) {
        self.pool.close();
        if let Some(bind_pool) = &self.bind_pool {
            bind_pool.close();
        }
    }

    fn server_types<'c>(&self, types: Option<&'c AttributeTypeCache>) -> Option<&'c AttributeTypes> {
        let cache = types?;
        match cache.get_or_load(|| self.attribute_types()) {
            Ok(loaded) => Some(loaded),
            Err(err) => {
                warn!(error = %err, "attribute types unavailable, using declared hints only");
                None
            }
        }
    }

    fn paging_support(&self) -> PagingSupport {
        let capabilities = self.capabilities();
        PagingSupport {
            paged_results: capabilities.supports_paged_results(),
            server_side_sort: capabilities.supports_server_side_sort(),
        }
    }

    fn wire_attributes(&self, requested: &[String]) -> Vec<String> {
        let mut attributes = Vec::with_capacity(requested.len());
        for name in requested {
            attributes.push(name.clone());
            if self.config.is_certificate(name) && !name.ends_with(BINARY_OPTION) {
                attributes.push(format!("{name}{BINARY_OPTION}"));
            }
        }
        attributes
    }

    fn to_wire_attribute(&self, attribute: &Attribute) -> Attribute {
        let name = &attribute.name;
        let values = if self.config.is_password(name) {
            let encoding = self.config.password_encoding;
            attribute
                .values
                .iter()
                .map(|v| Value::Text(encoding.encode(&v.to_text())))
                .collect()
        } else if self.config.is_binary(name) {
            attribute
                .values
                .iter()
                .map(|v| Value::Bytes(v.as_bytes().into_owned()))
                .collect()
        } else {
            attribute.values.clone()
        };
        let name = if self.config.is_certificate(name) && !name.ends_with(BINARY_OPTION) {
            format!("{name}{BINARY_OPTION}")
        } else {
            name.clone()
        };
        Attribute {
            name,
            values,
            multi_valued: attribute.multi_valued,
        }
    }

    fn to_wire_entry(&self, entry: &Entry) -> Entry {
        Entry::with_attributes(
            entry.dn.clone(),
            entry
                .attributes
                .iter()
                .map(|a| self.to_wire_attribute(a))
                .collect(),
        )
    }

    fn from_wire_entry(&self, mut entry: Entry) -> Entry {
        for attribute in &mut entry.attributes {
            let base = strip_binary_option(&attribute.name);
            if base.len() != attribute.name.len() {
                attribute.name = base.to_string();
            }
            if self.config.is_binary(&attribute.name) {
                for value in &mut attribute.values {
                    if !value.is_binary() {
                        *value = Value::Bytes(value.as_bytes().into_owned());
                    }
                }
            }
        }
        entry
    }

    fn window_from_wire(&self, window: PagedResult<Entry>) -> PagedResult<Entry> {
        PagedResult {
            entries: window
                .entries
                .into_iter()
                .map(|e| self.from_wire_entry(e))
                .collect(),
            ..window
        }
    }
}

fn raw_search<'a>(request: &'a SearchRequest, filter: &'a str, attributes: &'a [String]) -> RawSearch<'a> {
    RawSearch {
        base_dn: &request.base_dn,
        scope: request.scope,
        filter,
        attributes,
        size_limit: request.size_limit,
    }
}
