//! Branch routing between a directory and a document store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dirstore_core::{EntryManager, HybridPersistenceEngine, PersistError, PersistenceEngine, SchemaHints};
use dirstore_model::{Attribute, Entry, Filter, SearchRequest, SearchScope, OBJECT_CLASS};
use dirstore_testkit::prelude::*;

const SESSIONS: &str = "ou=sessions,o=example";

fn session(id: &str) -> Entry {
    Entry::with_attributes(
        format!("uid={id},{SESSIONS}"),
        vec![
            Attribute::multi(OBJECT_CLASS, ["session"]),
            Attribute::single("uid", id),
        ],
    )
}

fn routed() -> (HybridPersistenceEngine, MemoryDirectory, MemoryDocumentStore) {
    let directory = populated_directory(three_people());
    let store = MemoryDocumentStore::new();
    let ldap: Arc<dyn PersistenceEngine> = Arc::new(directory_engine(&directory));
    let couch: Arc<dyn PersistenceEngine> = Arc::new(document_engine(&store));
    let hybrid = HybridPersistenceEngine::new("ldap", ldap).with_engine("couch", couch, ["Sessions"]);
    (hybrid, directory, store)
}

#[test]
fn writes_follow_the_branch() {
    init_test_tracing();
    let (hybrid, directory, store) = routed();

    hybrid.add(&session("s1"), Some(Duration::from_secs(60))).unwrap();
    hybrid.persist(&Person::new("dave")).unwrap();

    assert_eq!(store.keys(), ["sessions_s1"]);
    assert!(store.document("sessions_s1").unwrap().expires_at.is_some());
    assert!(directory.entry("uid=dave,ou=people,o=example").is_some());
    assert!(directory.entry("uid=s1,ou=sessions,o=example").is_none());

    assert_eq!(hybrid.engine_for(SESSIONS).backend_name(), "document");
    assert_eq!(hybrid.engine_for(PEOPLE).backend_name(), "ldap");
    assert_eq!(hybrid.engine_for("o=other").backend_name(), "ldap");
}

#[test]
fn capabilities_are_per_branch() {
    let (hybrid, _, _) = routed();
    assert!(hybrid.has_branches_support(PEOPLE));
    assert!(!hybrid.has_expiration_support(PEOPLE));
    assert!(!hybrid.has_branches_support(SESSIONS));
    assert!(hybrid.has_expiration_support(SESSIONS));
}

#[test]
fn reads_follow_the_base() {
    let (hybrid, _, _) = routed();
    for id in ["s1", "s2", "s3"] {
        hybrid.add(&session(id), None).unwrap();
    }

    let sessions = hybrid
        .search(&SearchRequest::new(SESSIONS, Filter::presence("uid")), &SchemaHints::empty())
        .unwrap();
    assert_eq!(sessions.len(), 3);
    let people: Vec<Person> = hybrid.find_entries(PEOPLE, None, SearchScope::Subtree, 0).unwrap();
    assert_eq!(people.len(), 3);

    assert!(hybrid.exists("uid=s2,ou=sessions,o=example").unwrap());
    hybrid.delete("uid=s2,ou=sessions,o=example").unwrap();
    assert_eq!(
        hybrid
            .count(&SearchRequest::new(SESSIONS, Filter::presence("uid")), &SchemaHints::empty())
            .unwrap(),
        2
    );
}

#[test]
fn authentication_routes_by_base() {
    let (hybrid, _, _) = routed();
    assert!(hybrid.authenticate_user(PEOPLE, "alice", "alice-secret").unwrap());
    assert!(!hybrid.authenticate_user(SESSIONS, "alice", "alice-secret").unwrap());
}

#[test]
fn built_from_properties() {
    let directory = populated_directory(three_people());
    let store = MemoryDocumentStore::new();
    let mut engines: HashMap<String, Arc<dyn PersistenceEngine>> = HashMap::new();
    engines.insert("ldap".to_string(), Arc::new(directory_engine(&directory)));
    engines.insert("couch".to_string(), Arc::new(document_engine(&store)));
    let properties: HashMap<String, String> = [
        ("storage.default", "ldap"),
        ("storage.couch.mapping", "sessions, tokens"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let hybrid = HybridPersistenceEngine::from_properties(&properties, engines).unwrap();
    assert_eq!(hybrid.engine_for("uid=t,ou=tokens,o=example").backend_name(), "document");
    assert_eq!(hybrid.engine_for(SESSIONS).backend_name(), "document");
    assert_eq!(hybrid.engine_for(PEOPLE).backend_name(), "ldap");
}

#[test]
fn unknown_engines_are_configuration_errors() {
    let properties: HashMap<String, String> = [("storage.default", "ldap")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let err = HybridPersistenceEngine::from_properties(&properties, HashMap::new()).unwrap_err();
    assert!(matches!(err, PersistError::Configuration { .. }), "{err}");

    let err = HybridPersistenceEngine::from_properties(&HashMap::new(), HashMap::new()).unwrap_err();
    assert!(matches!(err, PersistError::Configuration { .. }), "{err}");
}
