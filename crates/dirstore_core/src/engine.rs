//! The backend contract and the typed surface built on it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dirstore_model::{
    Entry, Filter, Modification, PagedResult, SearchRequest, SearchScope, SortOrder, OBJECT_CLASS,
};
use tracing::debug;

use crate::batch::{BatchCursor, ScanOutcome};
use crate::error::PersistResult;
use crate::hints::SchemaHints;
use crate::mapping::{AttributeMapper, DataEntry, MappingProfile};
use crate::notify::DeleteNotifier;

/// A persistence backend.
///
/// The trait is object safe; [`EntryManager`] adds the typed operations on
/// top of it for every engine, including `dyn PersistenceEngine`.
pub trait PersistenceEngine: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// How this backend stores object classes.
    fn mapping_profile(&self) -> MappingProfile;

    /// Check a user's secret.
    ///
    /// `identifier` is either a DN or a value of the naming attribute
    /// searched under `base_dn`. Unknown users and wrong secrets give
    /// `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Only transport failures are errors.
    fn authenticate(&self, base_dn: Option<&str>, identifier: &str, secret: &str) -> PersistResult<bool>;

    /// Create an entry. `ttl` is honored by backends with native expiry.
    fn add(&self, entry: &Entry, ttl: Option<Duration>) -> PersistResult<()>;

    /// Apply modifications to an entry.
    fn modify(&self, dn: &str, changes: &[Modification]) -> PersistResult<()>;

    /// Read one entry. Not found is a connection error at this layer.
    fn lookup(&self, dn: &str, attributes: &[String]) -> PersistResult<Entry>;

    /// Returns true if the entry exists.
    fn exists(&self, dn: &str) -> PersistResult<bool>;

    /// Delete one entry.
    fn delete(&self, dn: &str) -> PersistResult<()>;

    /// Delete an entry and everything below it.
    fn delete_subtree(&self, dn: &str) -> PersistResult<()>;

    /// Delete up to `limit` entries matching a request; 0 means no limit.
    /// Returns the number deleted.
    fn delete_matching(&self, request: &SearchRequest, hints: &SchemaHints, limit: usize) -> PersistResult<usize>;

    /// Run a search to completion, honoring `size_limit`.
    fn search(&self, request: &SearchRequest, hints: &SchemaHints) -> PersistResult<Vec<Entry>>;

    /// Return the window `[start_index, start_index + size_limit)` and the
    /// total number of matches.
    fn search_paged(&self, request: &SearchRequest, hints: &SchemaHints) -> PersistResult<PagedResult<Entry>>;

    /// Deliver results page by page to the callbacks.
    ///
    /// The scan stops when the results are exhausted or, if `size_limit` is
    /// set, once that many entries were delivered during this call; the
    /// returned cursor then continues the scan.
    fn scan(
        &self,
        request: &SearchRequest,
        hints: &SchemaHints,
        cursor: Option<BatchCursor>,
        collect: &mut dyn FnMut(&[Entry]) -> bool,
        process: &mut dyn FnMut(&[Entry]),
    ) -> PersistResult<ScanOutcome>;

    /// Count matches.
    fn count(&self, request: &SearchRequest, hints: &SchemaHints) -> PersistResult<usize>;

    /// Whether entries under `dn` may have children.
    fn has_branches_support(&self, dn: &str) -> bool;

    /// Whether entries under `dn` expire natively.
    fn has_expiration_support(&self, dn: &str) -> bool;

    /// Render a timestamp in the backend's format.
    fn encode_time(&self, time: &DateTime<Utc>) -> String;

    /// Parse a timestamp in the backend's format.
    fn decode_time(&self, text: &str) -> Option<DateTime<Utc>>;

    /// Register a delete observer.
    fn add_delete_notifier(&self, notifier: Arc<dyn DeleteNotifier>);

    /// Close connections. Later calls fail with connection errors.
    fn close(&self);
}

/// Typed operations over any [`PersistenceEngine`].
pub trait EntryManager: PersistenceEngine {
    /// Mapper for this backend.
    fn mapper(&self) -> AttributeMapper {
        AttributeMapper::new(self.mapping_profile())
    }

    /// Store a new record.
    fn persist<T: DataEntry>(&self, record: &T) -> PersistResult<()> {
        let mapper = self.mapper();
        let entry = mapper.to_entry(record)?;
        self.add(&entry, mapper.ttl(record))
    }

    /// Update a stored record with the minimal set of modifications.
    fn merge<T: DataEntry>(&self, record: &T) -> PersistResult<()> {
        let mapper = self.mapper();
        let dn = mapper.to_entry(record)?.dn;
        let current = self.lookup(&dn, &mapper.return_attributes::<T>())?;
        let changes = mapper.diff(&current, record)?;
        if changes.is_empty() {
            debug!(dn = %dn, "merge found nothing to change");
            return Ok(());
        }
        self.modify(&dn, &changes)
    }

    /// Read a record by DN.
    fn find<T: DataEntry>(&self, dn: &str) -> PersistResult<T> {
        let mapper = self.mapper();
        let entry = self.lookup(dn, &mapper.return_attributes::<T>())?;
        mapper.from_entry(&entry)
    }

    /// Records of type `T` under `base_dn` matching `filter`.
    fn find_entries<T: DataEntry>(
        &self,
        base_dn: &str,
        filter: Option<Filter>,
        scope: SearchScope,
        size_limit: usize,
    ) -> PersistResult<Vec<T>> {
        let mapper = self.mapper();
        let request = SearchRequest::new(base_dn, mapper.restrict::<T>(filter))
            .with_scope(scope)
            .with_attributes(mapper.return_attributes::<T>())
            .with_size_limit(size_limit);
        self.search(&request, &mapper.hints::<T>())?
            .iter()
            .map(|e| mapper.from_entry(e))
            .collect()
    }

    /// One window of records of type `T`, sorted if `sort_by` is non-empty.
    #[allow(clippy::too_many_arguments)]
    fn find_paged_entries<T: DataEntry>(
        &self,
        base_dn: &str,
        filter: Option<Filter>,
        sort_by: &[&str],
        sort_order: SortOrder,
        start_index: usize,
        count: usize,
        page_size: usize,
    ) -> PersistResult<PagedResult<T>> {
        let mapper = self.mapper();
        let request = SearchRequest::new(base_dn, mapper.restrict::<T>(filter))
            .with_attributes(mapper.return_attributes::<T>())
            .with_sort(sort_by.iter().copied(), sort_order)
            .with_start_index(start_index)
            .with_size_limit(count)
            .with_page_size(page_size);
        self.search_paged(&request, &mapper.hints::<T>())?
            .try_map(|e| mapper.from_entry(&e))
    }

    /// Number of records of type `T` under `base_dn` matching `filter`.
    fn count_entries<T: DataEntry>(&self, base_dn: &str, filter: Option<Filter>) -> PersistResult<usize> {
        let mapper = self.mapper();
        let request = SearchRequest::new(base_dn, mapper.restrict::<T>(filter));
        self.count(&request, &mapper.hints::<T>())
    }

    /// Returns true if a record of type `T` is stored at `dn`.
    fn contains<T: DataEntry>(&self, dn: &str) -> PersistResult<bool> {
        if !self.exists(dn)? {
            return Ok(false);
        }
        let classes = T::schema().object_classes();
        let required = if self.mapper().profile().single_object_class {
            classes.get(..1).unwrap_or_default()
        } else {
            classes
        };
        if required.is_empty() {
            return Ok(true);
        }
        let entry = self.lookup(dn, &[OBJECT_CLASS.to_string()])?;
        Ok(required.iter().all(|class| entry.has_object_class(class)))
    }

    /// Delete a stored record.
    fn remove<T: DataEntry>(&self, record: &T) -> PersistResult<()> {
        let dn = self.mapper().to_entry(record)?.dn;
        self.delete(&dn)
    }

    /// Delete an entry with its children where the backend has branches.
    fn remove_recursively(&self, dn: &str) -> PersistResult<()> {
        if self.has_branches_support(dn) {
            self.delete_subtree(dn)
        } else {
            self.delete(dn)
        }
    }

    /// Delete up to `limit` records of type `T` matching `filter`.
    fn remove_by_filter<T: DataEntry>(
        &self,
        base_dn: &str,
        filter: Option<Filter>,
        limit: usize,
    ) -> PersistResult<usize> {
        let mapper = self.mapper();
        let request = SearchRequest::new(base_dn, mapper.restrict::<T>(filter));
        self.delete_matching(&request, &mapper.hints::<T>(), limit)
    }

    /// Authenticate a user found by naming attribute under `base_dn`.
    fn authenticate_user(&self, base_dn: &str, uid: &str, secret: &str) -> PersistResult<bool> {
        self.authenticate(Some(base_dn), uid, secret)
    }
}

impl<E: PersistenceEngine + ?Sized> EntryManager for E {}
