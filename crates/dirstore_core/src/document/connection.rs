//! The narrow adapter a document store client implements.

use chrono::{DateTime, Utc};
use dirstore_model::{SearchScope, SortOrder};
use serde_json::{Map, Value as Json};

use crate::backend::OperationResult;
use crate::filter::DocumentExpression;

/// A stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document key.
    pub key: String,
    /// JSON body.
    pub body: Map<String, Json>,
    /// Native expiry, if any.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Read consistency of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanConsistency {
    /// Whatever the index has.
    #[default]
    NotBounded,
    /// Wait for the index to include every write acknowledged before the
    /// query.
    RequestPlus,
}

/// One query round trip.
#[derive(Debug, Clone, Copy)]
pub struct DocumentQuery<'a> {
    /// Key of the base document; empty for the whole store.
    pub base_key: &'a str,
    /// Key scope below the base.
    pub scope: SearchScope,
    /// Predicate.
    pub filter: &'a DocumentExpression,
    /// Fields to return; empty means the whole body.
    pub fields: &'a [String],
    /// Sort fields in priority order.
    pub order_by: &'a [String],
    /// Sort direction.
    pub order: SortOrder,
    /// Matches to skip.
    pub offset: usize,
    /// Maximum matches to return; 0 means no limit.
    pub limit: usize,
    /// Read consistency.
    pub consistency: ScanConsistency,
}

/// Sub-document change.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentMutation {
    /// Set a field.
    Upsert {
        /// Field name.
        field: String,
        /// New value.
        value: Json,
    },
    /// Append to an array field, creating it if missing.
    Append {
        /// Field name.
        field: String,
        /// Values to append.
        values: Vec<Json>,
    },
    /// Remove values from an array field, or the field itself.
    Remove {
        /// Field name.
        field: String,
        /// Values to remove; `None` removes the field.
        values: Option<Vec<Json>>,
    },
}

/// Raw operations on one document store connection.
///
/// Missing documents are reported with the `NoSuchObject` result code and
/// duplicate inserts with `EntryAlreadyExists`.
pub trait DocumentConnection: Send {
    /// Read one document.
    fn get(&mut self, key: &str, fields: &[String]) -> OperationResult<Option<Document>>;

    /// Insert a new document.
    fn insert(&mut self, document: Document) -> OperationResult<()>;

    /// Apply sub-document changes atomically.
    fn mutate(&mut self, key: &str, mutations: &[DocumentMutation]) -> OperationResult<()>;

    /// Remove one document.
    fn remove(&mut self, key: &str) -> OperationResult<()>;

    /// Run a query.
    fn query(&mut self, query: &DocumentQuery<'_>) -> OperationResult<Vec<Document>>;

    /// Count a query's matches, ignoring its offset and limit.
    fn count(&mut self, query: &DocumentQuery<'_>) -> OperationResult<usize>;
}
