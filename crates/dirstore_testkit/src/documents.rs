//! A simulated document store.
//!
//! [`MemoryDocumentStore`] keeps JSON documents by key and answers queries
//! by evaluating [`DocumentExpression`]s directly. Expired documents are
//! invisible. With [`MemoryDocumentStore::with_lagging_index`] writes stay
//! out of unbounded queries until a `RequestPlus` query catches the index
//! up, which is how real stores behave under load.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dirstore_core::document::{
    key_in_scope, Document, DocumentConnection, DocumentMutation, DocumentQuery, ScanConsistency,
};
use dirstore_core::{OperationError, OperationResult};
use dirstore_model::{ResultCode, SortOrder};
use dirstore_pool::{ConnectError, ConnectRequest, Connector};
use parking_lot::Mutex;
use serde_json::{Map, Value as Json};

#[derive(Debug, Default)]
struct StoreState {
    documents: BTreeMap<String, Document>,
    unindexed: BTreeSet<String>,
    lagging_index: bool,
    unreachable: HashSet<String>,
    pending_failures: usize,
    queries: Vec<ScanConsistency>,
    now: Option<DateTime<Utc>>,
}

impl StoreState {
    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }

    fn live(&self, key: &str) -> Option<&Document> {
        let now = self.now();
        self.documents
            .get(key)
            .filter(|d| d.expires_at.map_or(true, |at| at > now))
    }

    fn touched(&mut self, key: &str) {
        if self.lagging_index {
            self.unindexed.insert(key.to_string());
        }
    }
}

/// Handle to a simulated document store.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    shared: Arc<Mutex<StoreState>>,
}

impl MemoryDocumentStore {
    /// An empty store with an always current index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep writes out of `NotBounded` queries until a `RequestPlus` query.
    #[must_use]
    pub fn with_lagging_index(self) -> Self {
        self.shared.lock().lagging_index = true;
        self
    }

    /// Pin the store clock. Expiry is judged against it.
    pub fn set_now(&self, now: DateTime<Utc>) {
        self.shared.lock().now = Some(now);
    }

    /// Make a host refuse connections.
    pub fn set_unreachable(&self, host: &str, unreachable: bool) {
        let mut state = self.shared.lock();
        if unreachable {
            state.unreachable.insert(host.to_string());
        } else {
            state.unreachable.remove(host);
        }
    }

    /// Fail the next `count` operations with a transport error.
    pub fn fail_next_operations(&self, count: usize) {
        self.shared.lock().pending_failures = count;
    }

    /// Stored document by key, expired or not.
    pub fn document(&self, key: &str) -> Option<Document> {
        self.shared.lock().documents.get(key).cloned()
    }

    /// Keys of all stored documents.
    pub fn keys(&self) -> Vec<String> {
        self.shared.lock().documents.keys().cloned().collect()
    }

    /// Number of stored documents, expired or not.
    pub fn len(&self) -> usize {
        self.shared.lock().documents.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consistency of every query served so far.
    pub fn query_consistency(&self) -> Vec<ScanConsistency> {
        self.shared.lock().queries.clone()
    }
}

impl Connector for MemoryDocumentStore {
    type Connection = MemoryDocumentConnection;

    fn connect(&self, request: &ConnectRequest<'_>) -> Result<Self::Connection, ConnectError> {
        if self.shared.lock().unreachable.contains(&request.target.host) {
            return Err(ConnectError::unreachable(request.target, "connection refused"));
        }
        Ok(MemoryDocumentConnection {
            shared: Arc::clone(&self.shared),
            broken: false,
        })
    }

    fn is_usable(&self, connection: &Self::Connection) -> bool {
        !connection.broken
    }
}

/// One connection to a [`MemoryDocumentStore`].
#[derive(Debug)]
pub struct MemoryDocumentConnection {
    shared: Arc<Mutex<StoreState>>,
    broken: bool,
}

impl MemoryDocumentConnection {
    fn enter(&mut self) -> OperationResult<parking_lot::MutexGuard<'_, StoreState>> {
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
}

fn not_found(key: &str) -> OperationError {
    OperationError::result(ResultCode::NoSuchObject, format!("document {key} does not exist"))
}

fn project(document: &Document, fields: &[String]) -> Document {
    if fields.is_empty() {
        return document.clone();
    }
    let body: Map<String, Json> = document
        .body
        .iter()
        .filter(|(name, _)| fields.iter().any(|f| f.eq_ignore_ascii_case(name)))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    Document {
        key: document.key.clone(),
        body,
        expires_at: document.expires_at,
    }
}

fn sort_value(value: Option<&Json>) -> Option<&Json> {
    match value {
        Some(Json::Array(items)) => items.first(),
        Some(Json::Null) | None => None,
        other => other,
    }
}

fn compare_fields(a: &Document, b: &Document, order_by: &[String]) -> Ordering {
    for field in order_by {
        let left = sort_value(a.body.get(field));
        let right = sort_value(b.body.get(field));
        let ordering = match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(Json::Number(x)), Some(Json::Number(y))) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Some(Json::String(x)), Some(Json::String(y))) => x.to_lowercase().cmp(&y.to_lowercase()),
            (Some(Json::Bool(x)), Some(Json::Bool(y))) => x.cmp(y),
            (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn matching<'s>(state: &'s StoreState, query: &DocumentQuery<'_>) -> Vec<&'s Document> {
    let hide_unindexed = query.consistency == ScanConsistency::NotBounded;
    let mut found: Vec<&Document> = state
        .documents
        .keys()
        .filter(|key| key_in_scope(key, query.base_key, query.scope))
        .filter(|key| !(hide_unindexed && state.unindexed.contains(*key)))
        .filter_map(|key| state.live(key))
        .filter(|d| query.filter.matches(&d.body))
        .collect();
    if !query.order_by.is_empty() {
        found.sort_by(|a, b| {
            let ordering = compare_fields(a, b, query.order_by);
            match query.order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
    }
    found
}

impl DocumentConnection for MemoryDocumentConnection {
    fn get(&mut self, key: &str, fields: &[String]) -> OperationResult<Option<Document>> {
        let state = self.enter()?;
        Ok(state.live(key).map(|d| project(d, fields)))
    }

    fn insert(&mut self, document: Document) -> OperationResult<()> {
        let mut state = self.enter()?;
        if state.live(&document.key).is_some() {
            return Err(OperationError::result(
                ResultCode::EntryAlreadyExists,
                format!("document {} already exists", document.key),
            ));
        }
        let key = document.key.clone();
        state.documents.insert(key.clone(), document);
        state.touched(&key);
        Ok(())
    }

    fn mutate(&mut self, key: &str, mutations: &[DocumentMutation]) -> OperationResult<()> {
        let mut state = self.enter()?;
        if state.live(key).is_none() {
            return Err(not_found(key));
        }
        let Some(document) = state.documents.get_mut(key) else {
            return Err(not_found(key));
        };
        let mut body = document.body.clone();
        for mutation in mutations {
            match mutation {
                DocumentMutation::Upsert { field, value } => {
                    body.insert(field.clone(), value.clone());
                }
                DocumentMutation::Append { field, values } => {
                    let merged = match body.remove(field) {
                        Some(Json::Array(mut items)) => {
                            items.extend(values.iter().cloned());
                            items
                        }
                        Some(Json::Null) | None => values.clone(),
                        Some(scalar) => std::iter::once(scalar).chain(values.iter().cloned()).collect(),
                    };
                    body.insert(field.clone(), Json::Array(merged));
                }
                DocumentMutation::Remove { field, values: None } => {
                    body.remove(field);
                }
                DocumentMutation::Remove {
                    field,
                    values: Some(values),
                } => {
                    let remaining = match body.remove(field) {
                        Some(Json::Array(items)) => items.into_iter().filter(|v| !values.contains(v)).collect(),
                        Some(scalar) if !values.contains(&scalar) => vec![scalar],
                        _ => Vec::new(),
                    };
                    if !remaining.is_empty() {
                        body.insert(field.clone(), Json::Array(remaining));
                    }
                }
            }
        }
        document.body = body;
        state.touched(key);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> OperationResult<()> {
        let mut state = self.enter()?;
        if state.live(key).is_none() {
            return Err(not_found(key));
        }
        state.documents.remove(key);
        state.unindexed.remove(key);
        Ok(())
    }

    fn query(&mut self, query: &DocumentQuery<'_>) -> OperationResult<Vec<Document>> {
        let mut state = self.enter()?;
        state.queries.push(query.consistency);
        if query.consistency == ScanConsistency::RequestPlus {
            state.unindexed.clear();
        }
        let found = matching(&state, query);
        let limit = if query.limit == 0 { usize::MAX } else { query.limit };
        Ok(found
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .map(|d| project(d, query.fields))
            .collect())
    }

    fn count(&mut self, query: &DocumentQuery<'_>) -> OperationResult<usize> {
        let mut state = self.enter()?;
        state.queries.push(query.consistency);
        if query.consistency == ScanConsistency::RequestPlus {
            state.unindexed.clear();
        }
        Ok(matching(&state, query).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as TimeDelta;
    use dirstore_core::filter::DocumentExpression;
    use dirstore_model::SearchScope;
    use dirstore_pool::HostPort;
    use dirstore_pool::TransportSecurity;
    use serde_json::json;
    use std::time::Duration;

    fn open(store: &MemoryDocumentStore) -> MemoryDocumentConnection {
        let target = HostPort::new("couch", 8091);
        store
            .connect(&ConnectRequest {
                target: &target,
                security: &TransportSecurity::Plain,
                credentials: None,
                connect_timeout: Duration::from_secs(1),
            })
            .unwrap()
    }

    fn doc(key: &str, body: Json) -> Document {
        Document {
            key: key.to_string(),
            body: body.as_object().cloned().unwrap(),
            expires_at: None,
        }
    }

    fn everything() -> DocumentExpression {
        DocumentExpression::Exists { field: "dn".into() }
    }

    fn query<'a>(filter: &'a DocumentExpression, consistency: ScanConsistency) -> DocumentQuery<'a> {
        DocumentQuery {
            base_key: "people",
            scope: SearchScope::OneLevel,
            filter,
            fields: &[],
            order_by: &[],
            order: SortOrder::Ascending,
            offset: 0,
            limit: 0,
            consistency,
        }
    }

    #[test]
    fn mutations_edit_arrays() {
        let store = MemoryDocumentStore::new();
        let mut conn = open(&store);
        conn.insert(doc("people_a", json!({"dn": "uid=a", "mail": "x@a"}))).unwrap();
        conn.mutate(
            "people_a",
            &[
                DocumentMutation::Append {
                    field: "mail".into(),
                    values: vec![json!("y@a")],
                },
                DocumentMutation::Remove {
                    field: "mail".into(),
                    values: Some(vec![json!("x@a")]),
                },
            ],
        )
        .unwrap();
        assert_eq!(store.document("people_a").unwrap().body["mail"], json!(["y@a"]));
        assert!(conn.mutate("people_missing", &[]).unwrap_err().is_not_found());
    }

    #[test]
    fn lagging_index_needs_request_plus() {
        let store = MemoryDocumentStore::new().with_lagging_index();
        let mut conn = open(&store);
        conn.insert(doc("people_a", json!({"dn": "uid=a"}))).unwrap();
        let filter = everything();
        assert_eq!(conn.count(&query(&filter, ScanConsistency::NotBounded)).unwrap(), 0);
        assert_eq!(conn.count(&query(&filter, ScanConsistency::RequestPlus)).unwrap(), 1);
        assert_eq!(conn.count(&query(&filter, ScanConsistency::NotBounded)).unwrap(), 1);
    }

    #[test]
    fn expired_documents_are_invisible() {
        let store = MemoryDocumentStore::new();
        let now = Utc::now();
        store.set_now(now);
        let mut conn = open(&store);
        let mut expiring = doc("people_a", json!({"dn": "uid=a"}));
        expiring.expires_at = Some(now + TimeDelta::seconds(5));
        conn.insert(expiring).unwrap();
        assert!(conn.get("people_a", &[]).unwrap().is_some());

        store.set_now(now + TimeDelta::seconds(5));
        assert!(conn.get("people_a", &[]).unwrap().is_none());
        conn.insert(doc("people_a", json!({"dn": "uid=a"}))).unwrap();
    }
}
