//! Paginated search over directory connections.
//!
//! Three server primitives are reconciled here: resume cookies (simple
//! paged results), offset windows (virtual list view) and, for servers
//! without either, a single search sliced locally.
//!
//! Cookie scrolling is a small state machine:
//!
//! ```text
//! NotStarted ──first page──> Paging ──empty cookie──> Exhausted
//!      │                       ^
//!      └─start_index > 0─> SkippingToOffset ──offset reached──┘
//! ```
//!
//! Skip passes request only the DN so that large offsets cost round trips
//! but little payload.

use dirstore_model::{Entry, PagedResult, ResultCode, SearchRequest, DEFAULT_PAGE_SIZE};
use tracing::{debug, trace};

use super::connection::{DirectoryConnection, RawSearch, SearchControl, SortKey};
use super::sort::sort_entries;
use crate::backend::{OperationError, OperationResult};
use crate::hints::AttributeHints;

/// Attribute list requested by skip and count passes.
pub(crate) const DN_ONLY: &[&str] = &["dn"];

/// Where a cookie scroll stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagingState {
    /// No request issued yet.
    NotStarted,
    /// Discarding entries until the requested offset.
    SkippingToOffset {
        /// Entries still to skip.
        remaining: usize,
        /// Cookie to continue from.
        cookie: Vec<u8>,
    },
    /// Delivering pages.
    Paging {
        /// Cookie to continue from.
        cookie: Vec<u8>,
    },
    /// The server has no more results.
    Exhausted,
}

/// A cookie scroll over one search on one connection.
#[derive(Debug)]
pub struct PagedScroll<'s> {
    search: RawSearch<'s>,
    page_size: usize,
    sort: Option<SearchControl>,
    state: PagingState,
    skipped: usize,
    dn_only: Vec<String>,
}

impl<'s> PagedScroll<'s> {
    /// Start a scroll. A non-zero `start_index` enters the skip state.
    pub fn new(search: RawSearch<'s>, page_size: usize, start_index: usize) -> Self {
        let state = if start_index > 0 {
            PagingState::SkippingToOffset {
                remaining: start_index,
                cookie: Vec::new(),
            }
        } else {
            PagingState::NotStarted
        };
        Self {
            search,
            page_size: effective_page_size(page_size),
            sort: None,
            state,
            skipped: 0,
            dn_only: DN_ONLY.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Continue a scroll from a cookie issued earlier on the same connection.
    pub fn resume(search: RawSearch<'s>, page_size: usize, cookie: Vec<u8>) -> Self {
        let mut scroll = Self::new(search, page_size, 0);
        scroll.state = if cookie.is_empty() {
            PagingState::Exhausted
        } else {
            PagingState::Paging { cookie }
        };
        scroll
    }

    /// Attach server-side sort keys to every request.
    #[must_use]
    pub fn with_server_sort(mut self, keys: Vec<SortKey>) -> Self {
        if !keys.is_empty() {
            self.sort = Some(SearchControl::ServerSideSort { keys });
        }
        self
    }

    /// Current state.
    pub fn state(&self) -> &PagingState {
        &self.state
    }

    /// Returns true once the server reported the end of the results.
    pub fn is_exhausted(&self) -> bool {
        self.state == PagingState::Exhausted
    }

    /// Entries discarded while skipping.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Cookie for the next page, if any.
    pub fn cookie(&self) -> Option<&[u8]> {
        match &self.state {
            PagingState::Paging { cookie } => Some(cookie),
            _ => None,
        }
    }

    fn controls(&self, size: usize, cookie: Vec<u8>) -> Vec<SearchControl> {
        let mut controls = Vec::with_capacity(2);
        if let Some(sort) = &self.sort {
            controls.push(sort.clone());
        }
        controls.push(SearchControl::PagedResults { size, cookie });
        controls
    }

    /// Run the skip passes, if the scroll is in the skip state.
    ///
    /// # Errors
    ///
    /// Any round trip failure aborts the scroll.
    pub fn skip_to_offset<C>(&mut self, conn: &mut C) -> OperationResult<()>
    where
        C: DirectoryConnection + ?Sized,
    {
        while let PagingState::SkippingToOffset { remaining, cookie } = &self.state {
            let remaining = *remaining;
            let size = remaining.min(DEFAULT_PAGE_SIZE);
            let controls = self.controls(size, cookie.clone());
            let search = RawSearch {
                attributes: &self.dn_only,
                ..self.search
            };
            let result = conn.raw_search(&search, &controls)?;
            let got = result.entries.len();
            self.skipped += got;
            let next = result.cookie.unwrap_or_default();
            trace!(skipped = self.skipped, remaining, "skip pass");

            let left = remaining.saturating_sub(got);
            self.state = if next.is_empty() || got == 0 {
                PagingState::Exhausted
            } else if left == 0 {
                PagingState::Paging { cookie: next }
            } else {
                PagingState::SkippingToOffset {
                    remaining: left,
                    cookie: next,
                }
            };
        }
        Ok(())
    }

    /// Fetch the next page, or `None` once exhausted.
    ///
    /// # Errors
    ///
    /// Any round trip failure aborts the scroll.
    pub fn next_page<C>(&mut self, conn: &mut C) -> OperationResult<Option<Vec<Entry>>>
    where
        C: DirectoryConnection + ?Sized,
    {
        self.skip_to_offset(conn)?;
        let cookie = match &self.state {
            PagingState::NotStarted => Vec::new(),
            PagingState::Paging { cookie } => cookie.clone(),
            PagingState::Exhausted | PagingState::SkippingToOffset { .. } => return Ok(None),
        };
        let controls = self.controls(self.page_size, cookie);
        let result = conn.raw_search(&self.search, &controls)?;
        self.advance(result.cookie);
        Ok(Some(result.entries))
    }

    fn advance(&mut self, cookie: Option<Vec<u8>>) {
        let next = cookie.unwrap_or_default();
        self.state = if next.is_empty() {
            PagingState::Exhausted
        } else {
            PagingState::Paging { cookie: next }
        };
    }

    /// Count the remaining entries with DN-only pages.
    ///
    /// # Errors
    ///
    /// Any round trip failure aborts the count.
    pub fn count_rest<C>(&mut self, conn: &mut C) -> OperationResult<usize>
    where
        C: DirectoryConnection + ?Sized,
    {
        self.skip_to_offset(conn)?;
        let mut counted = 0;
        loop {
            let cookie = match &self.state {
                PagingState::NotStarted => Vec::new(),
                PagingState::Paging { cookie } => cookie.clone(),
                PagingState::Exhausted | PagingState::SkippingToOffset { .. } => return Ok(counted),
            };
            let controls = self.controls(DEFAULT_PAGE_SIZE, cookie);
            let search = RawSearch {
                attributes: &self.dn_only,
                ..self.search
            };
            let result = conn.raw_search(&search, &controls)?;
            counted += result.entries.len();
            self.advance(result.cookie);
        }
    }
}

/// Page size to request: the caller's, or the default when unset.
pub fn effective_page_size(requested: usize) -> usize {
    if requested == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        requested
    }
}

/// What the server can do for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingSupport {
    /// Simple paged results control.
    pub paged_results: bool,
    /// Server-side sort control.
    pub server_side_sort: bool,
}

/// Sort keys for the server-side sort control.
pub fn sort_keys(request: &SearchRequest) -> Vec<SortKey> {
    let reverse = request.sort_order == dirstore_model::SortOrder::Descending;
    request
        .sort_by
        .iter()
        .map(|attribute| SortKey {
            attribute: attribute.clone(),
            reverse,
        })
        .collect()
}

/// Every match of a search, or the first `size_limit` of them.
///
/// # Errors
///
/// Any round trip failure aborts the search.
pub fn search_all<C>(
    conn: &mut C,
    search: RawSearch<'_>,
    request: &SearchRequest,
    support: PagingSupport,
    hints: &dyn AttributeHints,
) -> OperationResult<Vec<Entry>>
where
    C: DirectoryConnection + ?Sized,
{
    let server_sort = support.server_side_sort && !request.sort_by.is_empty();
    let sort = if server_sort {
        vec![SearchControl::ServerSideSort {
            keys: sort_keys(request),
        }]
    } else {
        Vec::new()
    };

    let mut entries = if !support.paged_results || request.is_unpaged() {
        let search = RawSearch {
            size_limit: request.size_limit,
            ..search
        };
        conn.raw_search(&search, &sort)?.entries
    } else if request.size_limit > 0 {
        let mut scroll = PagedScroll::new(search, request.size_limit, 0)
            .with_server_sort(if server_sort { sort_keys(request) } else { Vec::new() });
        let mut page = scroll.next_page(conn)?.unwrap_or_default();
        page.truncate(request.size_limit);
        page
    } else {
        let mut scroll = PagedScroll::new(search, request.page_size, 0)
            .with_server_sort(if server_sort { sort_keys(request) } else { Vec::new() });
        let mut all = Vec::new();
        while let Some(page) = scroll.next_page(conn)? {
            all.extend(page);
        }
        all
    };

    if !server_sort {
        sort_entries(&mut entries, &request.sort_by, request.sort_order, hints);
    }
    Ok(entries)
}

/// The window `[start_index, start_index + size_limit)` and the total count
/// by cookie scrolling. A zero `size_limit` returns everything from the
/// offset on.
///
/// # Errors
///
/// Any round trip failure aborts the search; nothing is returned partially.
pub fn search_window<C>(
    conn: &mut C,
    search: RawSearch<'_>,
    request: &SearchRequest,
    support: PagingSupport,
    hints: &dyn AttributeHints,
) -> OperationResult<PagedResult<Entry>>
where
    C: DirectoryConnection + ?Sized,
{
    let start = request.start_index;
    let server_sort = support.server_side_sort && !request.sort_by.is_empty();
    // the window bounds are applied here; the total needs every match
    let search = RawSearch { size_limit: 0, ..search };

    if !support.paged_results {
        let sort = if server_sort {
            vec![SearchControl::ServerSideSort {
                keys: sort_keys(request),
            }]
        } else {
            Vec::new()
        };
        let mut all = conn.raw_search(&search, &sort)?.entries;
        if !server_sort {
            // the whole result set is local, so this sort is global
            sort_entries(&mut all, &request.sort_by, request.sort_order, hints);
        }
        let total = all.len();
        let window: Vec<Entry> = all
            .into_iter()
            .skip(start)
            .take(if request.size_limit == 0 { usize::MAX } else { request.size_limit })
            .collect();
        debug!(total, returned = window.len(), "client-side slice");
        return Ok(PagedResult::new(window, total, start));
    }

    let wanted = if request.size_limit == 0 {
        usize::MAX
    } else {
        request.size_limit
    };
    let page_size = match (request.page_size, request.size_limit) {
        (0, 0) => DEFAULT_PAGE_SIZE,
        (0, limit) => limit.min(DEFAULT_PAGE_SIZE),
        (size, _) => size,
    };
    let mut scroll = PagedScroll::new(search, page_size, start)
        .with_server_sort(if server_sort { sort_keys(request) } else { Vec::new() });

    let mut window = Vec::new();
    let mut seen = 0;
    while window.len() < wanted {
        let Some(page) = scroll.next_page(conn)? else {
            break;
        };
        seen += page.len();
        let room = wanted - window.len();
        window.extend(page.into_iter().take(room));
    }
    let rest = scroll.count_rest(conn)?;
    let total = scroll.skipped() + seen + rest;

    if !server_sort {
        sort_entries(&mut window, &request.sort_by, request.sort_order, hints);
    }
    debug!(start, total, returned = window.len(), "cookie window");
    Ok(PagedResult::new(window, total, start))
}

/// The window of a virtual list view request. One round trip.
///
/// The request must carry sort keys; the server sorts on them and reports
/// the list size and target position in its response control.
///
/// # Errors
///
/// Fails when the round trip fails or the server omits the response
/// control.
pub fn search_virtual_list_view<C>(
    conn: &mut C,
    search: RawSearch<'_>,
    request: &SearchRequest,
) -> OperationResult<PagedResult<Entry>>
where
    C: DirectoryConnection + ?Sized,
{
    let count = if request.size_limit == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        request.size_limit
    };
    let controls = vec![
        SearchControl::ServerSideSort {
            keys: sort_keys(request),
        },
        SearchControl::VirtualListView {
            target_offset: request.start_index + 1,
            before_count: 0,
            after_count: count - 1,
            content_count: 0,
        },
    ];
    let search = RawSearch { size_limit: 0, ..search };
    let result = conn.raw_search(&search, &controls)?;
    let vlv = result.vlv.ok_or_else(|| {
        OperationError::result(
            ResultCode::UnavailableCriticalExtension,
            "server ignored the virtual list view control",
        )
    })?;
    let mut entries = result.entries;
    entries.truncate(count);
    Ok(PagedResult::new(
        entries,
        vlv.content_count,
        vlv.target_position.saturating_sub(1),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hints::SchemaHints;
    use crate::ldap::connection::{RawSearchResult, VlvResponse};
    use dirstore_model::{Filter, Modification, SearchScope, SortOrder};

    /// Serves `size` entries named `cn=N` with numeric cookies.
    struct Numbers {
        size: usize,
        requests: Vec<(usize, Vec<u8>, usize)>,
        paged: bool,
    }

    impl Numbers {
        fn new(size: usize) -> Self {
            Self {
                size,
                requests: Vec::new(),
                paged: true,
            }
        }

        fn entry(&self, n: usize) -> Entry {
            let mut entry = Entry::new(format!("cn={n},o=example"));
            entry.set_text("cn", n.to_string());
            entry
        }
    }

    impl DirectoryConnection for Numbers {
        fn bind(&mut self, _dn: &str, _secret: &str) -> OperationResult<()> {
            Ok(())
        }

        fn raw_search(
            &mut self,
            search: &RawSearch<'_>,
            controls: &[SearchControl],
        ) -> OperationResult<RawSearchResult> {
            let mut result = RawSearchResult::default();
            let paged = controls.iter().find_map(|c| match c {
                SearchControl::PagedResults { size, cookie } => Some((*size, cookie.clone())),
                _ => None,
            });
            let vlv = controls.iter().find_map(|c| match c {
                SearchControl::VirtualListView {
                    target_offset,
                    after_count,
                    ..
                } => Some((*target_offset, *after_count)),
                _ => None,
            });
            if let Some((target, after)) = vlv {
                let from = target - 1;
                let to = (from + after + 1).min(self.size);
                result.entries = (from..to).map(|n| self.entry(n)).collect();
                result.vlv = Some(VlvResponse {
                    target_position: target,
                    content_count: self.size,
                });
                return Ok(result);
            }
            match paged {
                Some((size, cookie)) if self.paged => {
                    let from: usize = if cookie.is_empty() {
                        0
                    } else {
                        String::from_utf8(cookie.clone()).unwrap().parse().unwrap()
                    };
                    self.requests.push((size, cookie, search.attributes.len()));
                    let to = (from + size).min(self.size);
                    result.entries = (from..to).map(|n| self.entry(n)).collect();
                    result.cookie = Some(if to < self.size {
                        to.to_string().into_bytes()
                    } else {
                        Vec::new()
                    });
                }
                _ => {
                    let limit = if search.size_limit == 0 { self.size } else { search.size_limit };
                    result.entries = (0..self.size.min(limit)).map(|n| self.entry(n)).collect();
                }
            }
            Ok(result)
        }

        fn raw_add(&mut self, _entry: &Entry) -> OperationResult<()> {
            Err(OperationError::transport("read only"))
        }

        fn raw_modify(&mut self, _dn: &str, _changes: &[Modification]) -> OperationResult<()> {
            Err(OperationError::transport("read only"))
        }

        fn raw_delete(&mut self, _dn: &str, _subtree: bool) -> OperationResult<()> {
            Err(OperationError::transport("read only"))
        }
    }

    const ALL: PagingSupport = PagingSupport {
        paged_results: true,
        server_side_sort: false,
    };

    fn raw<'a>(attributes: &'a [String]) -> RawSearch<'a> {
        RawSearch {
            base_dn: "o=example",
            scope: SearchScope::Subtree,
            filter: "(cn=*)",
            attributes,
            size_limit: 0,
        }
    }

    fn dns(entries: &[Entry]) -> Vec<String> {
        entries.iter().map(|e| e.dn.clone()).collect()
    }

    #[test]
    fn scroll_until_empty_cookie() {
        let mut conn = Numbers::new(25);
        let attrs = vec!["cn".to_string()];
        let mut scroll = PagedScroll::new(raw(&attrs), 10, 0);
        assert_eq!(scroll.state(), &PagingState::NotStarted);

        let mut sizes = Vec::new();
        while let Some(page) = scroll.next_page(&mut conn).unwrap() {
            sizes.push(page.len());
        }
        assert_eq!(sizes, vec![10, 10, 5]);
        assert!(scroll.is_exhausted());
    }

    #[test]
    fn skip_uses_dn_only_passes() {
        let mut conn = Numbers::new(500);
        let attrs = vec!["cn".to_string(), "mail".to_string()];
        let mut scroll = PagedScroll::new(raw(&attrs), 10, 250);
        let page = scroll.next_page(&mut conn).unwrap().unwrap();
        assert_eq!(page[0].dn, "cn=250,o=example");
        assert_eq!(scroll.skipped(), 250);

        let skip_sizes: Vec<usize> = conn.requests.iter().map(|r| r.0).collect();
        assert_eq!(skip_sizes, vec![100, 100, 50, 10]);
        assert!(conn.requests[..3].iter().all(|r| r.2 == 1));
        assert_eq!(conn.requests[3].2, 2);
    }

    #[test]
    fn skip_past_the_end_exhausts() {
        let mut conn = Numbers::new(5);
        let mut scroll = PagedScroll::new(raw(&[]), 10, 50);
        assert_eq!(scroll.next_page(&mut conn).unwrap(), None);
        assert_eq!(scroll.skipped(), 5);
    }

    #[test]
    fn size_limit_short_circuits() {
        let mut conn = Numbers::new(50);
        let request = SearchRequest::new("o=example", Filter::any_entry()).with_size_limit(7);
        let entries = search_all(&mut conn, raw(&[]), &request, ALL, &SchemaHints::empty()).unwrap();
        assert_eq!(entries.len(), 7);
        assert_eq!(conn.requests.len(), 1);
    }

    #[test]
    fn window_matches_slice_of_full_result() {
        let mut conn = Numbers::new(42);
        let full = search_all(
            &mut conn,
            raw(&[]),
            &SearchRequest::new("o=example", Filter::any_entry()).with_page_size(9),
            ALL,
            &SchemaHints::empty(),
        )
        .unwrap();
        assert_eq!(full.len(), 42);

        let request = SearchRequest::new("o=example", Filter::any_entry())
            .with_start_index(13)
            .with_size_limit(11)
            .with_page_size(4);
        let window = search_window(&mut conn, raw(&[]), &request, ALL, &SchemaHints::empty()).unwrap();
        assert_eq!(window.total_count, 42);
        assert_eq!(window.start_index, 13);
        assert_eq!(dns(&window.entries), dns(&full[13..24]));
    }

    #[test]
    fn client_side_slice_without_paging() {
        let mut conn = Numbers::new(30);
        conn.paged = false;
        let support = PagingSupport {
            paged_results: false,
            server_side_sort: false,
        };
        let request = SearchRequest::new("o=example", Filter::any_entry())
            .with_start_index(25)
            .with_size_limit(10)
            .with_sort(["cn"], SortOrder::Descending);
        let window = search_window(&mut conn, raw(&[]), &request, support, &SchemaHints::empty()).unwrap();
        assert_eq!(window.total_count, 30);
        assert_eq!(window.entries.len(), 5);
        // "cn" sorts as text: 9, 8, ... so the tail holds the smallest strings
        assert_eq!(window.entries.last().unwrap().dn, "cn=0,o=example");
    }

    #[test]
    fn virtual_list_view_reads_response_metadata() {
        let mut conn = Numbers::new(1000);
        let request = SearchRequest::new("o=example", Filter::any_entry())
            .with_start_index(600)
            .with_size_limit(20)
            .with_sort(["cn"], SortOrder::Ascending);
        let window = search_virtual_list_view(&mut conn, raw(&[]), &request).unwrap();
        assert_eq!(window.total_count, 1000);
        assert_eq!(window.start_index, 600);
        assert_eq!(window.entries.len(), 20);
        assert_eq!(window.entries[0].dn, "cn=600,o=example");
        assert!(conn.requests.is_empty());
    }

    proptest::proptest! {
        #[test]
        fn pagination_is_complete(size in 0usize..120, page in 1usize..40) {
            let mut conn = Numbers::new(size);
            let mut scroll = PagedScroll::new(raw(&[]), page, 0);
            let mut seen = Vec::new();
            while let Some(entries) = scroll.next_page(&mut conn).unwrap() {
                seen.extend(dns(&entries));
            }
            let mut unique = seen.clone();
            unique.sort();
            unique.dedup();
            proptest::prop_assert_eq!(seen.len(), size);
            proptest::prop_assert_eq!(unique.len(), size);
        }

        #[test]
        fn offset_window_equals_slice(size in 0usize..150, start in 0usize..160, count in 1usize..30) {
            let mut conn = Numbers::new(size);
            let request = SearchRequest::new("o=example", Filter::any_entry())
                .with_start_index(start)
                .with_size_limit(count);
            let window = search_window(&mut conn, raw(&[]), &request, ALL, &SchemaHints::empty()).unwrap();
            let expected: Vec<String> = (0..size)
                .skip(start)
                .take(count)
                .map(|n| format!("cn={n},o=example"))
                .collect();
            proptest::prop_assert_eq!(dns(&window.entries), expected);
            proptest::prop_assert_eq!(window.total_count, size);
        }
    }
}
