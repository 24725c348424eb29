//! Local sort for backends that cannot sort server-side.

use std::cmp::Ordering;

use dirstore_model::{Entry, SortOrder, Value};

use crate::hints::{AttributeHints, AttributeSyntax};

fn compare_values(syntax: AttributeSyntax, a: &Value, b: &Value) -> Ordering {
    let typed = match syntax {
        AttributeSyntax::Integer => a
            .as_integer()
            .zip(b.as_integer())
            .map(|(x, y)| x.cmp(&y)),
        AttributeSyntax::Timestamp => a
            .as_timestamp()
            .zip(b.as_timestamp())
            .map(|(x, y)| x.cmp(&y)),
        AttributeSyntax::Boolean => a.as_bool().zip(b.as_bool()).map(|(x, y)| x.cmp(&y)),
        AttributeSyntax::Binary => Some(a.as_bytes().cmp(&b.as_bytes())),
        AttributeSyntax::String => None,
    };
    typed.unwrap_or_else(|| {
        a.to_text()
            .to_lowercase()
            .cmp(&b.to_text().to_lowercase())
    })
}

/// Compare two entries on `keys`. Missing values sort first.
pub fn compare_entries(a: &Entry, b: &Entry, keys: &[String], hints: &dyn AttributeHints) -> Ordering {
    for key in keys {
        let left = a.get(key).and_then(|attr| attr.first());
        let right = b.get(key).and_then(|attr| attr.first());
        let ordering = match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => compare_values(hints.hint(key).syntax, x, y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Stable in-place sort of one materialized page or window.
pub fn sort_entries(entries: &mut [Entry], keys: &[String], order: SortOrder, hints: &dyn AttributeHints) {
    if keys.is_empty() {
        return;
    }
    entries.sort_by(|a, b| {
        let ordering = compare_entries(a, b, keys, hints);
        match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
}
