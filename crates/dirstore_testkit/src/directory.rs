//! A simulated directory server.
//!
//! [`MemoryDirectory`] is a [`Connector`] whose connections implement
//! [`DirectoryConnection`] against one shared in-memory tree. Clones share
//! the tree, so a test keeps a handle to inspect and steer the server while
//! a pool owns another.
//!
//! Besides the data operations it supports the paged results, server-side
//! sort, virtual list view and subtree delete controls, a root metadata
//! probe, and fault injection:
//!
//! - hosts marked unreachable refuse connections
//! - TLS protocols marked rejected fail the handshake
//! - the next N operations fail with a transport error
//!
//! Every connect attempt, bind and disconnect is recorded so tests can
//! follow connection identity.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use dirstore_core::ldap::{
    compare_entries, DirectoryConnection, RawSearch, RawSearchResult, SearchControl, SortKey, VlvResponse,
};
use dirstore_core::{AttributeTypes, OperationError, OperationResult, PasswordEncoding, SchemaHints};
use dirstore_model::{dn, Attribute, Entry, Modification, ModificationKind, ResultCode, SearchScope, OBJECT_CLASS};
use dirstore_pool::{
    ConnectError, ConnectRequest, Connector, ServerCapabilities, TlsProtocol, TransportSecurity, PAGED_RESULTS_OID,
    SERVER_SIDE_SORT_OID, SUBTREE_DELETE_OID, VIRTUAL_LIST_VIEW_OID,
};
use parking_lot::Mutex;
use tracing::trace;

use crate::filter::{entry_matches, parse_filter};

/// Service account every new directory accepts.
pub const SERVICE_DN: &str = "cn=manager,o=example";
/// Secret of [`SERVICE_DN`].
pub const SERVICE_SECRET: &str = "manager-secret";
/// DN of the subschema entry.
pub const SUBSCHEMA_DN: &str = "cn=schema";

const PASSWORD_ATTRIBUTE: &str = "userPassword";

/// One connection attempt as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    /// Host the client dialed.
    pub host: String,
    /// TLS protocol offered, if any.
    pub protocol: Option<TlsProtocol>,
    /// Serial of the opened connection, if the attempt succeeded.
    pub serial: Option<u64>,
}

/// One bind as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRecord {
    /// Serial of the connection that sent it.
    pub serial: u64,
    /// Bind DN.
    pub dn: String,
    /// Whether the credentials were accepted.
    pub accepted: bool,
}

#[derive(Debug)]
struct DirectoryState {
    entries: BTreeMap<String, Entry>,
    service: (String, String),
    controls: Vec<String>,
    attribute_types: Vec<String>,
    unreachable: HashSet<String>,
    rejected_protocols: HashSet<TlsProtocol>,
    host_rejected_protocols: HashMap<String, HashSet<TlsProtocol>>,
    probe_fails: bool,
    pending_failures: usize,
    next_serial: u64,
    attempts: Vec<ConnectAttempt>,
    binds: Vec<BindRecord>,
    closed: Vec<u64>,
    searches: usize,
}

impl DirectoryState {
    fn credentials_valid(&self, bind_dn: &str, secret: &str) -> bool {
        if secret.is_empty() {
            return false;
        }
        if dn::normalize(bind_dn) == dn::normalize(&self.service.0) {
            return secret == self.service.1;
        }
        self.entries
            .get(&dn::normalize(bind_dn))
            .and_then(|entry| entry.get(PASSWORD_ATTRIBUTE))
            .is_some_and(|attribute| {
                attribute
                    .values
                    .iter()
                    .any(|stored| PasswordEncoding::verify(&stored.to_text(), secret))
            })
    }

    fn types(&self) -> AttributeTypes {
        AttributeTypes::from_definitions(&self.attribute_types)
    }

    fn subschema_entry(&self) -> Entry {
        Entry::with_attributes(
            SUBSCHEMA_DN,
            vec![
                Attribute::multi(OBJECT_CLASS, ["top", "subschema"]),
                Attribute::multi("attributeTypes", self.attribute_types.iter().cloned()),
            ],
        )
    }

    fn in_scope(&self, entry_dn: &str, base: &str, scope: SearchScope) -> bool {
        match (scope, dn::depth_below(entry_dn, base)) {
            (SearchScope::Base, Some(0)) => true,
            (SearchScope::OneLevel, Some(1)) => true,
            (SearchScope::Subtree, Some(_)) => true,
            _ => false,
        }
    }
}

/// Handle to a simulated directory server.
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    shared: Arc<Mutex<DirectoryState>>,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDirectory {
    /// An empty directory advertising every supported control.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(DirectoryState {
                entries: BTreeMap::new(),
                service: (SERVICE_DN.to_string(), SERVICE_SECRET.to_string()),
                controls: vec![
                    PAGED_RESULTS_OID.to_string(),
                    SERVER_SIDE_SORT_OID.to_string(),
                    VIRTUAL_LIST_VIEW_OID.to_string(),
                    SUBTREE_DELETE_OID.to_string(),
                ],
                attribute_types: Vec::new(),
                unreachable: HashSet::new(),
                rejected_protocols: HashSet::new(),
                host_rejected_protocols: HashMap::new(),
                probe_fails: false,
                pending_failures: 0,
                next_serial: 1,
                attempts: Vec::new(),
                binds: Vec::new(),
                closed: Vec::new(),
                searches: 0,
            })),
        }
    }

    /// Replace the advertised controls.
    #[must_use]
    pub fn with_controls<S: Into<String>>(self, oids: impl IntoIterator<Item = S>) -> Self {
        self.shared.lock().controls = oids.into_iter().map(Into::into).collect();
        self
    }

    /// Stop advertising one control. The server still honors it.
    #[must_use]
    pub fn without_control(self, oid: &str) -> Self {
        self.shared.lock().controls.retain(|c| c != oid);
        self
    }

    /// Publish `attributeTypes` definitions in the subschema entry.
    #[must_use]
    pub fn with_attribute_types<S: Into<String>>(self, definitions: impl IntoIterator<Item = S>) -> Self {
        self.shared
            .lock()
            .attribute_types
            .extend(definitions.into_iter().map(Into::into));
        self
    }

    /// Make a host refuse or accept connections.
    pub fn set_unreachable(&self, host: &str, unreachable: bool) {
        let mut state = self.shared.lock();
        if unreachable {
            state.unreachable.insert(host.to_string());
        } else {
            state.unreachable.remove(host);
        }
    }

    /// Reject TLS handshakes offering any of `protocols`.
    pub fn reject_tls(&self, protocols: impl IntoIterator<Item = TlsProtocol>) {
        self.shared.lock().rejected_protocols.extend(protocols);
    }

    /// Reject TLS handshakes offering any of `protocols` on one host only.
    pub fn reject_tls_on(&self, host: &str, protocols: impl IntoIterator<Item = TlsProtocol>) {
        self.shared
            .lock()
            .host_rejected_protocols
            .entry(host.to_string())
            .or_default()
            .extend(protocols);
    }

    /// Make the root metadata probe fail.
    pub fn set_probe_failure(&self, fails: bool) {
        self.shared.lock().probe_fails = fails;
    }

    /// Fail the next `count` operations with a transport error. The
    /// connection that sees the failure is broken from then on.
    pub fn fail_next_operations(&self, count: usize) {
        self.shared.lock().pending_failures = count;
    }

    /// Store an entry, replacing any entry with the same DN.
    pub fn insert(&self, entry: Entry) {
        self.shared.lock().entries.insert(dn::normalize(&entry.dn), entry);
    }

    /// Stored entry by DN.
    pub fn entry(&self, entry_dn: &str) -> Option<Entry> {
        self.shared.lock().entries.get(&dn::normalize(entry_dn)).cloned()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    /// Returns true if no entry is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored DNs in server order.
    pub fn dns(&self) -> Vec<String> {
        self.shared.lock().entries.values().map(|e| e.dn.clone()).collect()
    }

    /// Every connect attempt so far.
    pub fn attempts(&self) -> Vec<ConnectAttempt> {
        self.shared.lock().attempts.clone()
    }

    /// Every bind so far, including the service binds made on connect.
    pub fn binds(&self) -> Vec<BindRecord> {
        self.shared.lock().binds.clone()
    }

    /// Serials of disconnected connections.
    pub fn closed(&self) -> Vec<u64> {
        self.shared.lock().closed.clone()
    }

    /// Number of search round trips served.
    pub fn searches(&self) -> usize {
        self.shared.lock().searches
    }
}

impl Connector for MemoryDirectory {
    type Connection = MemoryDirectoryConnection;

    fn connect(&self, request: &ConnectRequest<'_>) -> Result<Self::Connection, ConnectError> {
        let mut state = self.shared.lock();
        let host = request.target.host.clone();
        let protocol = request.security.protocol();
        let mut attempt = ConnectAttempt {
            host: host.clone(),
            protocol,
            serial: None,
        };

        if state.unreachable.contains(&host) {
            state.attempts.push(attempt);
            return Err(ConnectError::unreachable(request.target, "connection refused"));
        }
        if let TransportSecurity::Tls { protocol, .. } = request.security {
            let host_rejects = state
                .host_rejected_protocols
                .get(&host)
                .is_some_and(|rejected| rejected.contains(protocol));
            if host_rejects || state.rejected_protocols.contains(protocol) {
                state.attempts.push(attempt);
                return Err(ConnectError::HandshakeRejected {
                    target: request.target.to_string(),
                    protocol: *protocol,
                    message: "protocol version not supported".to_string(),
                });
            }
        }

        let serial = state.next_serial;
        state.next_serial += 1;
        let mut bound_dn = None;
        if let Some(credentials) = request.credentials {
            let accepted = state.credentials_valid(credentials.dn(), credentials.secret());
            state.binds.push(BindRecord {
                serial,
                dn: credentials.dn().to_string(),
                accepted,
            });
            if !accepted {
                state.attempts.push(attempt);
                return Err(ConnectError::InvalidCredentials {
                    dn: credentials.dn().to_string(),
                });
            }
            bound_dn = Some(credentials.dn().to_string());
        }
        attempt.serial = Some(serial);
        state.attempts.push(attempt);
        trace!(serial, %host, "simulated directory accepted connection");

        Ok(MemoryDirectoryConnection {
            serial,
            shared: Arc::clone(&self.shared),
            bound_dn,
            broken: false,
        })
    }

    fn probe(&self, _connection: &mut Self::Connection) -> Result<ServerCapabilities, ConnectError> {
        let state = self.shared.lock();
        if state.probe_fails {
            return Err(ConnectError::other("root DSE is not readable"));
        }
        Ok(ServerCapabilities::from_root_metadata(
            &["2".to_string(), "3".to_string()],
            Some(SUBSCHEMA_DN),
            state.controls.clone(),
        ))
    }

    fn is_usable(&self, connection: &Self::Connection) -> bool {
        !connection.broken
    }

    fn disconnect(&self, connection: Self::Connection) {
        self.shared.lock().closed.push(connection.serial);
    }
}

/// One connection to a [`MemoryDirectory`].
#[derive(Debug)]
pub struct MemoryDirectoryConnection {
    serial: u64,
    shared: Arc<Mutex<DirectoryState>>,
    bound_dn: Option<String>,
    broken: bool,
}

impl MemoryDirectoryConnection {
    /// Server-side identity of this connection.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// DN of the last successful bind.
    pub fn bound_dn(&self) -> Option<&str> {
        self.bound_dn.as_deref()
    }

    fn enter(&mut self) -> OperationResult<parking_lot::MutexGuard<'_, DirectoryState>> {
        if self.broken {
            return Err(OperationError::transport("connection is closed"));
        }
        let mut state = self.shared.lock();
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            self.broken = true;
            return Err(OperationError::transport("connection reset by peer"));
        }
        Ok(state)
    }

    fn resume_offset(&self, cookie: &[u8]) -> OperationResult<usize> {
        if cookie.is_empty() {
            return Ok(0);
        }
        let invalid = || OperationError::result(ResultCode::UnwillingToPerform, "invalid paged results cookie");
        let text = std::str::from_utf8(cookie).map_err(|_| invalid())?;
        let (serial, offset) = text.split_once(':').ok_or_else(invalid)?;
        if serial.parse::<u64>().ok() != Some(self.serial) {
            return Err(OperationError::result(
                ResultCode::UnwillingToPerform,
                "paged results cookie was issued on another connection",
            ));
        }
        offset.parse().map_err(|_| invalid())
    }
}

fn cookie(serial: u64, offset: usize) -> Vec<u8> {
    format!("{serial}:{offset}").into_bytes()
}

fn project(entry: &Entry, attributes: &[String]) -> Entry {
    let mut projected = entry.clone();
    if let [only] = attributes {
        if only.eq_ignore_ascii_case("dn") || only == "1.1" {
            projected.attributes.clear();
            return projected;
        }
    }
    if attributes.is_empty() || attributes.iter().any(|a| a == "*") {
        return projected;
    }
    projected
        .attributes
        .retain(|attr| attributes.iter().any(|wanted| attr.is_named(wanted)));
    projected
}

fn apply(entry: &mut Entry, change: &Modification) -> OperationResult<()> {
    let name = change.attribute.name.clone();
    match change.kind {
        ModificationKind::Replace => {
            if change.attribute.is_empty() {
                entry.remove(&name);
            } else {
                entry.set(change.attribute.clone());
            }
        }
        ModificationKind::Add => match entry.get_mut(&name) {
            Some(existing) => {
                for value in &change.attribute.values {
                    if existing.values.contains(value) {
                        return Err(OperationError::result(
                            ResultCode::AttributeOrValueExists,
                            format!("{name} already has that value"),
                        ));
                    }
                    existing.values.push(value.clone());
                }
                existing.multi_valued = existing.values.len() > 1 || existing.multi_valued;
            }
            None => entry.set(change.attribute.clone()),
        },
        ModificationKind::Remove => {
            if change.attribute.is_empty() {
                if entry.remove(&name).is_none() {
                    return Err(OperationError::result(
                        ResultCode::NoSuchAttribute,
                        format!("no attribute {name}"),
                    ));
                }
                return Ok(());
            }
            let Some(existing) = entry.get_mut(&name) else {
                return Err(OperationError::result(
                    ResultCode::NoSuchAttribute,
                    format!("no attribute {name}"),
                ));
            };
            existing.values.retain(|v| !change.attribute.values.contains(v));
            if existing.values.is_empty() {
                entry.remove(&name);
            }
        }
    }
    Ok(())
}

impl DirectoryConnection for MemoryDirectoryConnection {
    fn bind(&mut self, bind_dn: &str, secret: &str) -> OperationResult<()> {
        let serial = self.serial;
        let mut state = self.enter()?;
        let accepted = state.credentials_valid(bind_dn, secret);
        state.binds.push(BindRecord {
            serial,
            dn: bind_dn.to_string(),
            accepted,
        });
        drop(state);
        if accepted {
            self.bound_dn = Some(bind_dn.to_string());
            Ok(())
        } else {
            self.bound_dn = None;
            Err(OperationError::result(
                ResultCode::InvalidCredentials,
                format!("invalid credentials for {bind_dn}"),
            ))
        }
    }

    fn raw_search(
        &mut self,
        search: &RawSearch<'_>,
        controls: &[SearchControl],
    ) -> OperationResult<RawSearchResult> {
        let filter = parse_filter(search.filter)
            .map_err(|message| OperationError::result(ResultCode::ProtocolError, message))?;
        let mut paged = None;
        let mut sort: Option<&[SortKey]> = None;
        let mut vlv = None;
        for control in controls {
            match control {
                SearchControl::PagedResults { size, cookie } => paged = Some((*size, cookie.as_slice())),
                SearchControl::ServerSideSort { keys } => sort = Some(keys.as_slice()),
                SearchControl::VirtualListView {
                    target_offset,
                    before_count,
                    after_count,
                    ..
                } => vlv = Some((*target_offset, *before_count, *after_count)),
            }
        }
        let offset = match paged {
            Some((_, cookie)) => self.resume_offset(cookie)?,
            None => 0,
        };
        let serial = self.serial;

        let mut state = self.enter()?;
        state.searches += 1;

        if dn::normalize(search.base_dn) == dn::normalize(SUBSCHEMA_DN) && search.scope == SearchScope::Base {
            let entry = project(&state.subschema_entry(), search.attributes);
            return Ok(RawSearchResult {
                entries: vec![entry],
                ..RawSearchResult::default()
            });
        }
        if !search.base_dn.is_empty() && !state.entries.contains_key(&dn::normalize(search.base_dn)) {
            return Err(OperationError::result(
                ResultCode::NoSuchObject,
                format!("{} does not exist", search.base_dn),
            ));
        }

        let mut matches: Vec<&Entry> = state
            .entries
            .values()
            .filter(|e| state.in_scope(&e.dn, search.base_dn, search.scope))
            .filter(|e| entry_matches(&filter, e))
            .collect();

        if let Some(keys) = sort {
            let types = state.types();
            let empty = SchemaHints::empty();
            let hints = empty.layered(Some(&types));
            matches.sort_by(|a, b| {
                let mut ordering = std::cmp::Ordering::Equal;
                for key in keys {
                    let by_key = compare_entries(a, b, std::slice::from_ref(&key.attribute), &hints);
                    let by_key = if key.reverse { by_key.reverse() } else { by_key };
                    if by_key != std::cmp::Ordering::Equal {
                        ordering = by_key;
                        break;
                    }
                }
                ordering
            });
        }
        let total = matches.len();

        if let Some((target, before, after)) = vlv {
            if sort.is_none() {
                return Err(OperationError::result(
                    ResultCode::UnavailableCriticalExtension,
                    "virtual list view requires server-side sort",
                ));
            }
            let target = target.clamp(1, total.max(1));
            let from = (target - 1).saturating_sub(before);
            let to = (target + after).min(total);
            let entries = matches[from.min(to)..to]
                .iter()
                .map(|e| project(e, search.attributes))
                .collect();
            return Ok(RawSearchResult {
                entries,
                cookie: None,
                vlv: Some(VlvResponse {
                    target_position: target,
                    content_count: total,
                }),
            });
        }

        let (entries, cookie) = match paged {
            Some((size, _)) => {
                let size = if size == 0 { total } else { size };
                let from = offset.min(total);
                let to = (from + size).min(total);
                let page = matches[from..to].iter().map(|e| project(e, search.attributes)).collect();
                (page, Some(if to < total { cookie(serial, to) } else { Vec::new() }))
            }
            None => {
                if search.size_limit > 0 && total > search.size_limit {
                    trace!(total, limit = search.size_limit, "size limit truncated results");
                }
                let limit = if search.size_limit == 0 { total } else { search.size_limit.min(total) };
                let all = matches[..limit].iter().map(|e| project(e, search.attributes)).collect();
                (all, None)
            }
        };
        Ok(RawSearchResult {
            entries,
            cookie,
            vlv: None,
        })
    }

    fn raw_add(&mut self, entry: &Entry) -> OperationResult<()> {
        let mut state = self.enter()?;
        let key = dn::normalize(&entry.dn);
        if state.entries.contains_key(&key) {
            return Err(OperationError::result(
                ResultCode::EntryAlreadyExists,
                format!("{} already exists", entry.dn),
            ));
        }
        if entry.object_classes().is_empty() {
            return Err(OperationError::result(
                ResultCode::ObjectClassViolation,
                format!("{} has no object class", entry.dn),
            ));
        }
        if let Some(parent) = dn::parent(&entry.dn) {
            let parent_known = state.entries.contains_key(&dn::normalize(&parent));
            let is_suffix = dn::rdns(&parent).len() <= 1;
            if !parent_known && !is_suffix {
                return Err(OperationError::result(
                    ResultCode::NoSuchObject,
                    format!("parent {parent} does not exist"),
                ));
            }
        }
        state.entries.insert(key, entry.clone());
        Ok(())
    }

    fn raw_modify(&mut self, entry_dn: &str, changes: &[Modification]) -> OperationResult<()> {
        let mut state = self.enter()?;
        let Some(stored) = state.entries.get(&dn::normalize(entry_dn)) else {
            return Err(OperationError::result(
                ResultCode::NoSuchObject,
                format!("{entry_dn} does not exist"),
            ));
        };
        let mut updated = stored.clone();
        for change in changes {
            apply(&mut updated, change)?;
        }
        if updated.object_classes().is_empty() {
            return Err(OperationError::result(
                ResultCode::ObjectClassViolation,
                format!("{entry_dn} would lose its object class"),
            ));
        }
        state.entries.insert(dn::normalize(entry_dn), updated);
        Ok(())
    }

    fn raw_delete(&mut self, entry_dn: &str, subtree: bool) -> OperationResult<()> {
        let mut state = self.enter()?;
        let key = dn::normalize(entry_dn);
        if !state.entries.contains_key(&key) {
            return Err(OperationError::result(
                ResultCode::NoSuchObject,
                format!("{entry_dn} does not exist"),
            ));
        }
        let descendants: Vec<String> = state
            .entries
            .keys()
            .filter(|k| **k != key && dn::is_within(k, &key))
            .cloned()
            .collect();
        if !descendants.is_empty() && !subtree {
            return Err(OperationError::result(
                ResultCode::NotAllowedOnNonLeaf,
                format!("{entry_dn} has children"),
            ));
        }
        if subtree && !state.controls.iter().any(|c| c == SUBTREE_DELETE_OID) {
            return Err(OperationError::result(
                ResultCode::UnavailableCriticalExtension,
                "subtree delete control is not supported",
            ));
        }
        for descendant in descendants {
            state.entries.remove(&descendant);
        }
        state.entries.remove(&key);
        Ok(())
    }
}
