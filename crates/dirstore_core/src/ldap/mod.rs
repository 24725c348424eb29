//! Directory backend: operations, paginated search and the engine.

mod connection;
mod manager;
mod operations;
mod paging;
mod sort;

pub use connection::{
    DirectoryConnection, RawSearch, RawSearchResult, SearchControl, SortKey, VlvResponse,
};
pub use manager::LdapEntryManager;
pub use operations::OperationsFacade;
pub use paging::{
    effective_page_size, search_all, search_virtual_list_view, search_window, sort_keys,
    PagedScroll, PagingState, PagingSupport,
};
pub use sort::{compare_entries, sort_entries};
