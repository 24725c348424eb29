//! The narrow adapter a directory wire client implements.

use dirstore_model::{Entry, Modification, SearchScope};

use crate::backend::OperationResult;

/// One search round trip.
#[derive(Debug, Clone, Copy)]
pub struct RawSearch<'a> {
    /// Search base.
    pub base_dn: &'a str,
    /// Scope.
    pub scope: SearchScope,
    /// RFC 4515 filter.
    pub filter: &'a str,
    /// Requested attributes; empty means all user attributes.
    pub attributes: &'a [String],
    /// Server-side size limit; 0 means none.
    pub size_limit: usize,
}

/// Sort key of the server-side sort control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Attribute to sort on.
    pub attribute: String,
    /// Descending order.
    pub reverse: bool,
}

/// Request controls the engine attaches to searches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchControl {
    /// Simple paged results (RFC 2696). An empty cookie starts a scan.
    PagedResults {
        /// Page size.
        size: usize,
        /// Resume cookie.
        cookie: Vec<u8>,
    },
    /// Server-side sort (RFC 2891).
    ServerSideSort {
        /// Keys in priority order.
        keys: Vec<SortKey>,
    },
    /// Virtual list view by offset.
    VirtualListView {
        /// One-based offset of the target entry.
        target_offset: usize,
        /// Entries before the target.
        before_count: usize,
        /// Entries after the target.
        after_count: usize,
        /// Client's estimate of the list size; 0 when unknown.
        content_count: usize,
    },
}

/// Window metadata of a virtual list view response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlvResponse {
    /// One-based position of the target entry.
    pub target_position: usize,
    /// Server's count of the whole list.
    pub content_count: usize,
}

/// Entries and response controls of one round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSearchResult {
    /// Returned entries in server order.
    pub entries: Vec<Entry>,
    /// Paged results cookie, when the control was sent.
    pub cookie: Option<Vec<u8>>,
    /// Virtual list view response, when the control was sent.
    pub vlv: Option<VlvResponse>,
}

/// Raw operations on one directory connection.
///
/// Entries passed to [`raw_add`](Self::raw_add) and returned from searches
/// use the attribute names that go on the wire, including transfer options
/// such as `;binary`.
pub trait DirectoryConnection: Send {
    /// Bind as `dn`.
    fn bind(&mut self, dn: &str, secret: &str) -> OperationResult<()>;

    /// One search round trip.
    fn raw_search(
        &mut self,
        search: &RawSearch<'_>,
        controls: &[SearchControl],
    ) -> OperationResult<RawSearchResult>;

    /// Create an entry.
    fn raw_add(&mut self, entry: &Entry) -> OperationResult<()>;

    /// Modify an entry.
    fn raw_modify(&mut self, dn: &str, changes: &[Modification]) -> OperationResult<()>;

    /// Delete an entry; with `subtree`, its descendants too.
    fn raw_delete(&mut self, dn: &str, subtree: bool) -> OperationResult<()>;
}
