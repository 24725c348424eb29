//! Search requests and paged results.

use serde::{Deserialize, Serialize};

use crate::Filter;

/// Page size used when a caller asks for an offset without a page size.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// How far below the base DN a search reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SearchScope {
    /// Only the base entry.
    Base,
    /// Immediate children of the base entry.
    OneLevel,
    /// The base entry and all descendants.
    #[default]
    Subtree,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// A search against one backend.
///
/// `size_limit` doubles as the window size for offset searches: with a
/// non-zero `start_index` and `size_limit` the result is the slice
/// `[start_index, start_index + size_limit)` of the full result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Search base.
    pub base_dn: String,
    /// Filter expression.
    pub filter: Filter,
    /// Search scope.
    pub scope: SearchScope,
    /// Attributes to return; empty means all.
    pub return_attributes: Vec<String>,
    /// Maximum number of entries; zero means unlimited.
    pub size_limit: usize,
    /// Page size for paged searches; zero means unpaged.
    pub page_size: usize,
    /// Zero-based offset of the first entry to return.
    pub start_index: usize,
    /// Attributes to sort by.
    pub sort_by: Vec<String>,
    /// Sort direction.
    pub sort_order: SortOrder,
}

impl SearchRequest {
    /// Create a subtree search for every entry under `base_dn` matching `filter`.
    pub fn new(base_dn: impl Into<String>, filter: Filter) -> Self {
        Self {
            base_dn: base_dn.into(),
            filter,
            scope: SearchScope::Subtree,
            return_attributes: Vec::new(),
            size_limit: 0,
            page_size: 0,
            start_index: 0,
            sort_by: Vec::new(),
            sort_order: SortOrder::Ascending,
        }
    }

    /// Set the search scope.
    #[must_use]
    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Set the returned attributes.
    #[must_use]
    pub fn with_attributes<S: Into<String>>(mut self, attributes: impl IntoIterator<Item = S>) -> Self {
        self.return_attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the size limit.
    #[must_use]
    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }

    /// Set the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the start offset.
    #[must_use]
    pub fn with_start_index(mut self, start_index: usize) -> Self {
        self.start_index = start_index;
        self
    }

    /// Set the sort keys and direction.
    #[must_use]
    pub fn with_sort<S: Into<String>>(
        mut self,
        sort_by: impl IntoIterator<Item = S>,
        order: SortOrder,
    ) -> Self {
        self.sort_by = sort_by.into_iter().map(Into::into).collect();
        self.sort_order = order;
        self
    }

    /// Returns true if the request is a plain single round trip search.
    pub fn is_unpaged(&self) -> bool {
        self.page_size == 0 && self.start_index == 0 && self.size_limit == 0
    }
}

/// One window of a larger result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedResult<T> {
    /// Entries in the window.
    pub entries: Vec<T>,
    /// Total number of matches, as reported by the backend or as counted.
    pub total_count: usize,
    /// Zero-based offset of the first entry.
    pub start_index: usize,
}

impl<T> PagedResult<T> {
    /// Create a result window.
    pub fn new(entries: Vec<T>, total_count: usize, start_index: usize) -> Self {
        Self {
            entries,
            total_count,
            start_index,
        }
    }

    /// An empty window.
    pub fn empty(start_index: usize) -> Self {
        Self::new(Vec::new(), 0, start_index)
    }

    /// Number of entries in the window.
    pub fn entries_count(&self) -> usize {
        self.entries.len()
    }

    /// Convert every entry, failing on the first error.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<PagedResult<U>, E> {
        let entries = self.entries.into_iter().map(f).collect::<Result<Vec<_>, _>>()?;
        Ok(PagedResult {
            entries,
            total_count: self.total_count,
            start_index: self.start_index,
        })
    }
}
