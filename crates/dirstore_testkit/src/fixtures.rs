//! Test fixtures and pool helpers.

use std::sync::OnceLock;
use std::time::Duration;

use dirstore_core::mapping::{DataEntry, EntrySchema};
use dirstore_core::{DocumentEntryManager, EngineConfig, LdapEntryManager, OperationsFacade, PasswordEncoding};
use dirstore_model::{dn, Attribute, Entry, OBJECT_CLASS};
use dirstore_pool::{ConnectionPool, HostPort, PoolConfig};

use crate::directory::{MemoryDirectory, SERVICE_DN, SERVICE_SECRET};
use crate::documents::MemoryDocumentStore;

/// Naming context of every fixture.
pub const SUFFIX: &str = "o=example";
/// Branch holding [`Person`] entries.
pub const PEOPLE: &str = "ou=people,o=example";

/// A person record.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Person {
    /// Entry DN.
    pub dn: String,
    /// Login name.
    pub uid: String,
    /// Full name.
    pub cn: String,
    /// Family name.
    pub sn: String,
    /// Mail addresses.
    pub mail: Vec<String>,
    /// Employee number.
    pub employee_number: Option<i64>,
    /// Password, written only.
    pub password: Option<String>,
    /// Free text, never merged.
    pub description: Option<String>,
    /// Seconds until expiry on backends with native expiry.
    pub ttl: Option<i64>,
}

impl DataEntry for Person {
    fn schema() -> &'static EntrySchema<Self> {
        static SCHEMA: OnceLock<EntrySchema<Person>> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            EntrySchema::<Person>::builder("Person")
                .object_classes(["top", "inetOrgPerson"])
                .dn(|p| &p.dn, |p, dn| p.dn = dn)
                .attribute("uid", |p| &p.uid, |p, v| p.uid = v)
                .consistency()
                .attribute("cn", |p| &p.cn, |p, v| p.cn = v)
                .attribute("sn", |p| &p.sn, |p, v| p.sn = v)
                .attribute("mail", |p| &p.mail, |p, v| p.mail = v)
                .attribute("employeeNumber", |p| &p.employee_number, |p, v| p.employee_number = v)
                .password("userPassword", |p| &p.password, |p, v| p.password = v)
                .attribute("description", |p| &p.description, |p, v| p.description = v)
                .ignore_during_update()
                .ttl(|p| p.ttl)
                .build()
        })
    }
}

impl Person {
    /// A person under [`PEOPLE`] with derived name and mail.
    pub fn new(uid: &str) -> Self {
        let cn = format!("{} Example", capitalize(uid));
        Self {
            dn: dn::child("uid", uid, PEOPLE),
            uid: uid.to_string(),
            cn,
            sn: "Example".to_string(),
            mail: vec![format!("{uid}@example.org")],
            ..Self::default()
        }
    }

    /// Set the employee number.
    #[must_use]
    pub fn numbered(mut self, number: i64) -> Self {
        self.employee_number = Some(number);
        self
    }

    /// Set the password.
    #[must_use]
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The naming context and people branch entries.
pub fn skeleton() -> Vec<Entry> {
    vec![
        Entry::with_attributes(SUFFIX, vec![Attribute::multi(OBJECT_CLASS, ["top", "organization"])]),
        Entry::with_attributes(
            PEOPLE,
            vec![
                Attribute::multi(OBJECT_CLASS, ["top", "organizationalUnit"]),
                Attribute::single("ou", "people"),
            ],
        ),
    ]
}

/// Entry for `uid` under [`PEOPLE`] with a plain text password.
pub fn person_entry(uid: &str, employee_number: i64) -> Entry {
    Entry::with_attributes(
        dn::child("uid", uid, PEOPLE),
        vec![
            Attribute::multi(OBJECT_CLASS, ["top", "inetOrgPerson"]),
            Attribute::single("uid", uid),
            Attribute::single("cn", format!("{} Example", capitalize(uid))),
            Attribute::single("sn", "Example"),
            Attribute::multi("mail", [format!("{uid}@example.org")]),
            Attribute::single("employeeNumber", employee_number),
            Attribute::single("userPassword", format!("{uid}-secret")),
        ],
    )
}

/// The three-person dataset: alice, bob and carol.
pub fn three_people() -> Vec<Entry> {
    ["alice", "bob", "carol"]
        .iter()
        .zip(1..)
        .map(|(uid, n)| person_entry(uid, n))
        .collect()
}

/// `count` people named `user0000`, `user0001`, ...
pub fn numbered_people(count: usize) -> Vec<Entry> {
    (0..count)
        .map(|n| person_entry(&format!("user{n:04}"), n as i64))
        .collect()
}

/// A directory holding the skeleton and `people`.
pub fn populated_directory(people: Vec<Entry>) -> MemoryDirectory {
    let directory = MemoryDirectory::new().with_attribute_types([
        "( 2.16.840.1.113730.3.1.3 NAME 'employeeNumber' SYNTAX 1.3.6.1.4.1.1466.115.121.1.27 SINGLE-VALUE )",
        "( 2.5.4.35 NAME 'userPassword' SYNTAX 1.3.6.1.4.1.1466.115.121.1.40 )",
    ]);
    for entry in skeleton().into_iter().chain(people) {
        directory.insert(entry);
    }
    directory
}

/// Pool configuration for the simulated servers: service credentials,
/// short timeouts.
pub fn test_pool_config(hosts: &[&str]) -> PoolConfig {
    PoolConfig::new(hosts.iter().map(|h| HostPort::new(*h, 1636)).collect())
        .with_credentials(SERVICE_DN, SERVICE_SECRET)
        .with_max_connections(4)
        .with_connect_timeout(Duration::from_millis(200))
        .with_pool_acquire_timeout(Duration::from_millis(500))
        .with_creation_retry_interval(Duration::from_millis(50))
}

/// A directory engine over `directory` with one host.
pub fn directory_engine(directory: &MemoryDirectory) -> LdapEntryManager<MemoryDirectory> {
    let pool = ConnectionPool::create(directory.clone(), test_pool_config(&["ldap1"]))
        .expect("simulated directory pool");
    LdapEntryManager::new(OperationsFacade::new(pool, EngineConfig::new()))
}

/// A document engine over `store` with one host.
pub fn document_engine(store: &MemoryDocumentStore) -> DocumentEntryManager<MemoryDocumentStore> {
    let config = PoolConfig::new(vec![HostPort::new("couch", 8091)])
        .with_max_connections(4)
        .with_pool_acquire_timeout(Duration::from_millis(500))
        .with_creation_retry_interval(Duration::from_millis(50));
    let pool = ConnectionPool::create(store.clone(), config).expect("simulated document pool");
    DocumentEntryManager::new(
        pool,
        EngineConfig::new().password_encoding(PasswordEncoding::Ssha256),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn people_are_under_the_branch() {
        let alice = Person::new("alice");
        assert_eq!(alice.dn, "uid=alice,ou=people,o=example");
        assert_eq!(alice.cn, "Alice Example");
        assert!(three_people().iter().all(|e| dn::is_within(&e.dn, PEOPLE)));
        assert_eq!(numbered_people(3)[2].first_text("uid").as_deref(), Some("user0002"));
    }
}
