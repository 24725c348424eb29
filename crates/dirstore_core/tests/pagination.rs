//! Paged search over the simulated directory: cookie scrolling, offset
//! windows, virtual list view, client-side slicing and resumable scans.

use dirstore_core::{EntryManager, PersistError, PersistenceEngine, SchemaHints};
use dirstore_model::{Entry, Filter, SearchRequest, SortOrder};
use dirstore_pool::{PAGED_RESULTS_OID, SERVER_SIDE_SORT_OID, VIRTUAL_LIST_VIEW_OID};
use dirstore_testkit::prelude::*;
use proptest::prelude::*;

fn uids(count: usize) -> Vec<String> {
    (0..count).map(|n| format!("user{n:04}")).collect()
}

fn window_of(all: &[String], start: usize, count: usize) -> Vec<String> {
    all.iter().skip(start).take(count).cloned().collect()
}

fn entry_uids(entries: &[Entry]) -> Vec<String> {
    entries.iter().filter_map(|e| e.first_text("uid")).collect()
}

fn people() -> SearchRequest {
    SearchRequest::new(PEOPLE, Filter::equality("objectClass", "inetOrgPerson"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn scrolling_returns_every_match_once((size, page) in paging_strategy()) {
        let directory = populated_directory(numbered_people(size));
        let engine = directory_engine(&directory);
        engine.search(&people().with_size_limit(1), &SchemaHints::empty()).unwrap();

        let searches = directory.searches();
        let found = engine
            .search(&people().with_page_size(page), &SchemaHints::empty())
            .unwrap();
        prop_assert_eq!(entry_uids(&found), uids(size));
        let round_trips = size.div_ceil(page).max(1);
        prop_assert_eq!(directory.searches() - searches, round_trips);
    }

    #[test]
    fn cookie_window_equals_slice((size, start, count, page) in window_strategy()) {
        let directory = populated_directory(numbered_people(size));
        let engine = directory_engine(&directory);

        let window = engine
            .find_paged_entries::<Person>(PEOPLE, None, &[], SortOrder::Ascending, start, count, page)
            .unwrap();
        let found: Vec<String> = window.entries.iter().map(|p| p.uid.clone()).collect();
        prop_assert_eq!(found, window_of(&uids(size), start, count));
        prop_assert_eq!(window.total_count, size);
        prop_assert_eq!(window.start_index, start);
    }

    #[test]
    fn sorted_windows_agree_across_paging_primitives(
        (size, start, count, page) in window_strategy(),
        descending in any::<bool>(),
    ) {
        let start = start % size;
        let order = if descending { SortOrder::Descending } else { SortOrder::Ascending };
        let mut expected = uids(size);
        if descending {
            expected.reverse();
        }
        let expected = window_of(&expected, start, count);

        let directories = [
            populated_directory(numbered_people(size)),
            populated_directory(numbered_people(size)).without_control(VIRTUAL_LIST_VIEW_OID),
            populated_directory(numbered_people(size)).with_controls(Vec::<String>::new()),
        ];
        for directory in &directories {
            let engine = directory_engine(directory);
            let window = engine
                .find_paged_entries::<Person>(PEOPLE, None, &["uid"], order, start, count, page)
                .unwrap();
            let found: Vec<String> = window.entries.iter().map(|p| p.uid.clone()).collect();
            prop_assert_eq!(&found, &expected);
            prop_assert_eq!(window.total_count, size);
            prop_assert_eq!(window.start_index, start);
        }
    }
}

#[test]
fn virtual_list_view_is_one_round_trip() {
    let directory = populated_directory(numbered_people(40));
    let engine = directory_engine(&directory);
    engine.search(&people().with_size_limit(1), &SchemaHints::empty()).unwrap();

    let searches = directory.searches();
    let request = people()
        .with_sort(["employeeNumber"], SortOrder::Descending)
        .with_start_index(10)
        .with_size_limit(5);
    let window = engine.search_paged(&request, &SchemaHints::empty()).unwrap();
    assert_eq!(directory.searches() - searches, 1);
    assert_eq!(entry_uids(&window.entries), ["user0029", "user0028", "user0027", "user0026", "user0025"]);
    assert_eq!(window.total_count, 40);
    assert_eq!(window.start_index, 10);
}

#[test]
fn virtual_list_view_requires_a_sort_key() {
    let directory = populated_directory(numbered_people(3));
    let engine = directory_engine(&directory);
    let err = engine
        .search_virtual_list_view(&people().with_size_limit(2), &SchemaHints::empty())
        .unwrap_err();
    assert!(matches!(err, PersistError::Unsupported { .. }), "{err}");
}

#[test]
fn offsets_skip_with_dn_only_passes() {
    let directory = populated_directory(numbered_people(30));
    let engine = directory_engine(&directory);
    let window = engine
        .find_paged_entries::<Person>(PEOPLE, None, &[], SortOrder::Ascending, 25, 10, 4)
        .unwrap();
    let found: Vec<String> = window.entries.iter().map(|p| p.uid.clone()).collect();
    assert_eq!(found, window_of(&uids(30), 25, 10));
    assert_eq!(window.total_count, 30);

    let past_the_end = engine
        .find_paged_entries::<Person>(PEOPLE, None, &[], SortOrder::Ascending, 45, 10, 4)
        .unwrap();
    assert!(past_the_end.entries.is_empty());
    assert_eq!(past_the_end.total_count, 30);
}

#[test]
fn unsorted_search_without_paging_is_one_round_trip() {
    let directory = populated_directory(numbered_people(12)).with_controls([SERVER_SIDE_SORT_OID]);
    let engine = directory_engine(&directory);
    engine.search(&people().with_size_limit(1), &SchemaHints::empty()).unwrap();

    let searches = directory.searches();
    let found = engine
        .search(&people().with_page_size(5), &SchemaHints::empty())
        .unwrap();
    assert_eq!(entry_uids(&found), uids(12));
    assert_eq!(directory.searches() - searches, 1);
}

#[test]
fn counts_use_paged_dn_only_searches() {
    let directory = populated_directory(numbered_people(250));
    let engine = directory_engine(&directory);
    assert_eq!(engine.count(&people(), &SchemaHints::empty()).unwrap(), 250);
    assert_eq!(
        engine
            .count_entries::<Person>(PEOPLE, Some(Filter::less_or_equal("employeeNumber", 9)))
            .unwrap(),
        10
    );

    let unpaged = populated_directory(numbered_people(7)).with_controls(Vec::<String>::new());
    let engine = directory_engine(&unpaged);
    assert_eq!(engine.count(&people(), &SchemaHints::empty()).unwrap(), 7);
}

#[test]
fn scans_resume_on_the_same_connection() {
    init_test_tracing();
    let directory = populated_directory(numbered_people(12));
    let engine = directory_engine(&directory);
    let pool = engine.operations().pool();
    let request = people().with_page_size(3).with_size_limit(5);

    let mut processed = Vec::new();
    let first = engine
        .scan(&request, &SchemaHints::empty(), None, &mut |_| true, &mut |page| {
            processed.push(page.len())
        })
        .unwrap();
    assert_eq!(entry_uids(&first.collected), window_of(&uids(12), 0, 6));
    assert_eq!(first.pages, 2);
    assert!(first.more_results_available());
    let cursor = first.cursor.unwrap();
    assert_eq!(cursor.delivered(), 6);
    assert_eq!(pool.statistics().idle + 1, pool.statistics().live);

    let second = engine
        .scan(&request, &SchemaHints::empty(), Some(cursor), &mut |_| true, &mut |page| {
            processed.push(page.len())
        })
        .unwrap();
    assert_eq!(entry_uids(&second.collected), window_of(&uids(12), 6, 6));
    assert!(!second.more_results_available());
    assert_eq!(processed, [3, 3, 3, 3]);
    assert_eq!(pool.statistics().idle, pool.statistics().live);
}

#[test]
fn collect_can_veto_accumulation() {
    let directory = populated_directory(numbered_people(9));
    let engine = directory_engine(&directory);
    let request = people().with_page_size(4);

    let mut seen = 0;
    let outcome = engine
        .scan(
            &request,
            &SchemaHints::empty(),
            None,
            &mut |page| page.len() == 4,
            &mut |page| seen += page.len(),
        )
        .unwrap();
    assert_eq!(outcome.collected.len(), 8);
    assert_eq!(outcome.pages, 3);
    assert_eq!(seen, 9);
    assert!(outcome.cursor.is_none());
}

#[test]
fn released_cursors_return_their_connection() {
    let directory = populated_directory(numbered_people(10));
    let engine = directory_engine(&directory);
    let pool = engine.operations().pool();
    let request = people().with_page_size(2).with_size_limit(2);

    let outcome = engine
        .scan(&request, &SchemaHints::empty(), None, &mut |_| true, &mut |_| {})
        .unwrap();
    let cursor = outcome.cursor.unwrap();
    assert_eq!(pool.statistics().idle + 1, pool.statistics().live);
    cursor.release();
    assert_eq!(pool.statistics().idle, pool.statistics().live);
    assert!(directory.closed().is_empty());
}

#[test]
fn cursors_from_another_engine_are_rejected() {
    let directory = populated_directory(numbered_people(6));
    let engine = directory_engine(&directory);
    let request = people().with_page_size(2).with_size_limit(2);
    let outcome = engine
        .scan(&request, &SchemaHints::empty(), None, &mut |_| true, &mut |_| {})
        .unwrap();

    let store = MemoryDocumentStore::new();
    let documents = document_engine(&store);
    let err = documents
        .scan(&request, &SchemaHints::empty(), outcome.cursor, &mut |_| true, &mut |_| {})
        .unwrap_err();
    assert!(matches!(err, PersistError::Configuration { .. }), "{err}");
}

#[test]
fn mid_scroll_failures_abort_the_scan() {
    let directory = populated_directory(numbered_people(10));
    let engine = directory_engine(&directory);
    let request = people().with_page_size(3).with_size_limit(3);

    let outcome = engine
        .scan(&request, &SchemaHints::empty(), None, &mut |_| true, &mut |_| {})
        .unwrap();
    assert_eq!(outcome.collected.len(), 3);

    directory.fail_next_operations(1);
    let mut delivered = 0;
    let err = engine
        .scan(&request, &SchemaHints::empty(), outcome.cursor, &mut |_| true, &mut |p| {
            delivered += p.len()
        })
        .unwrap_err();
    assert!(matches!(err, PersistError::Connection { .. }), "{err}");
    assert_eq!(delivered, 0);
    assert_eq!(directory.closed().len(), 1);
}

#[test]
fn local_sort_applies_to_the_window_only() {
    let directory = populated_directory(numbered_people(5)).with_controls([PAGED_RESULTS_OID]);
    let engine = directory_engine(&directory);
    let window = engine
        .find_paged_entries::<Person>(PEOPLE, None, &["uid"], SortOrder::Descending, 1, 2, 1)
        .unwrap();
    let found: Vec<String> = window.entries.iter().map(|p| p.uid.clone()).collect();
    assert_eq!(found, ["user0002", "user0001"]);
    assert_eq!(window.total_count, 5);
}
