//! Filters translated for the directory select exactly the entries the
//! neutral filter describes.

use dirstore_core::{FilterTranslator, LdapFilterTranslator, PersistenceEngine, SchemaHints};
use dirstore_model::{Filter, SearchRequest};
use dirstore_testkit::prelude::*;
use proptest::prelude::*;

const SIZE: usize = 12;

fn matching_dns(filter: &Filter) -> Vec<String> {
    numbered_people(SIZE)
        .into_iter()
        .filter(|e| entry_matches(filter, e))
        .map(|e| e.dn)
        .collect()
}

#[test]
fn three_people_by_rendered_filter() {
    let people = three_people();
    let cases = [
        (Filter::equality("uid", "bob"), vec!["bob"]),
        (Filter::substring("cn", Some("C"), &[], Some("Example")), vec!["carol"]),
        (
            Filter::or(vec![Filter::equality("uid", "alice"), Filter::greater_or_equal("employeeNumber", 3)]),
            vec!["alice", "carol"],
        ),
        (Filter::not(Filter::presence("mail")), vec![]),
        (Filter::and(vec![Filter::presence("uid"), Filter::less_or_equal("employeeNumber", 2)]), vec!["alice", "bob"]),
    ];

    for (filter, expected) in cases {
        let rendered = LdapFilterTranslator
            .translate(&filter, &SchemaHints::empty())
            .unwrap()
            .expression;
        let parsed = parse_filter(&rendered).unwrap();
        let found: Vec<String> = people
            .iter()
            .filter(|e| entry_matches(&parsed, e))
            .filter_map(|e| e.first_text("uid"))
            .collect();
        assert_eq!(found, expected, "{rendered}");
    }
}

#[test]
fn reserved_characters_survive_a_search() {
    let directory = populated_directory(Vec::new());
    let engine = directory_engine(&directory);
    let mut odd = person_entry("odd", 1);
    odd.set_text("cn", "a*(b)\\c");
    directory.insert(odd);
    directory.insert(person_entry("plain", 2));

    let found = engine
        .search(
            &SearchRequest::new(PEOPLE, Filter::equality("cn", "a*(b)\\c")),
            &SchemaHints::empty(),
        )
        .unwrap();
    let uids: Vec<String> = found.iter().filter_map(|e| e.first_text("uid")).collect();
    assert_eq!(uids, ["odd"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn escaped_values_parse_back(text in filter_text_strategy()) {
        let filter = Filter::equality("cn", text.as_str());
        let rendered = LdapFilterTranslator
            .translate(&filter, &SchemaHints::empty())
            .unwrap()
            .expression;
        prop_assert_eq!(parse_filter(&rendered).unwrap(), filter);
    }

    #[test]
    fn directory_search_agrees_with_evaluation(filter in person_filter_strategy(SIZE)) {
        let directory = populated_directory(numbered_people(SIZE));
        let engine = directory_engine(&directory);
        let found = engine
            .search(&SearchRequest::new(PEOPLE, filter.clone()), &SchemaHints::empty())
            .unwrap();
        let mut dns: Vec<String> = found.into_iter().map(|e| e.dn).collect();
        let mut expected = matching_dns(&filter);
        if entry_matches(&filter, &skeleton()[1]) {
            expected.insert(0, PEOPLE.to_string());
        }
        dns.sort();
        expected.sort();
        prop_assert_eq!(dns, expected);
    }
}
