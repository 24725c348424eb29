//! Property-based test generators using proptest.

use dirstore_model::Filter;
use proptest::prelude::*;

/// Free text that exercises filter escaping: parentheses, asterisks,
/// backslashes and NUL mixed with ordinary characters.
pub fn filter_text_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            4 => prop::char::range('a', 'z'),
            1 => Just('('),
            1 => Just(')'),
            1 => Just('*'),
            1 => Just('\\'),
            1 => Just('\0'),
            1 => Just(' '),
        ],
        1..16,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

/// A uid of one of [`numbered_people`](crate::numbered_people) with `size`
/// people, or one that does not exist.
pub fn uid_strategy(size: usize) -> impl Strategy<Value = String> {
    (0..size + 2).prop_map(|n| format!("user{n:04}"))
}

/// Filters over the person fixtures, nested up to three levels.
pub fn person_filter_strategy(size: usize) -> impl Strategy<Value = Filter> {
    let size = size.max(1) as i64;
    let leaf = prop_oneof![
        (0..size + 2).prop_map(|n| Filter::equality("uid", format!("user{n:04}"))),
        (0..size + 2).prop_map(|n| Filter::equality("employeeNumber", n)),
        (0..size + 2).prop_map(|n| Filter::greater_or_equal("employeeNumber", n)),
        (0..size + 2).prop_map(|n| Filter::less_or_equal("employeeNumber", n)),
        (0..10i64).prop_map(|d| Filter::substring("uid", Some("user"), &[], Some(&d.to_string()))),
        Just(Filter::presence("mail")),
        Just(Filter::presence("description")),
        Just(Filter::equality("objectClass", "inetOrgPerson")),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(Filter::And),
            prop::collection::vec(inner.clone(), 1..4).prop_map(Filter::Or),
            inner.prop_map(Filter::not),
        ]
    })
}

/// `(dataset size, page size)` pairs, page sizes from one to larger than
/// the dataset.
pub fn paging_strategy() -> impl Strategy<Value = (usize, usize)> {
    (0usize..60).prop_flat_map(|size| (Just(size), 1usize..size + 5))
}

/// `(dataset size, start index, count, page size)` windows, including
/// windows past the end.
pub fn window_strategy() -> impl Strategy<Value = (usize, usize, usize, usize)> {
    (1usize..50).prop_flat_map(|size| (Just(size), 0usize..size + 5, 1usize..20, 1usize..12))
}
