//! Conversions between dirstore entries and `ldap3` wire types.

use std::collections::HashSet;

use dirstore_core::OperationError;
use dirstore_model::{Attribute, Entry, Modification, ModificationKind, ResultCode, Value};
use ldap3::{LdapError, LdapResult, Mod, SearchEntry};

/// Map an `ldap3` failure. Anything without a result code is a transport
/// failure.
pub fn operation_error(err: LdapError) -> OperationError {
    match err {
        LdapError::LdapResult { result } => result_error(&result),
        other => OperationError::transport(other.to_string()),
    }
}

/// Map a non-success result.
pub fn result_error(result: &LdapResult) -> OperationError {
    OperationError::result(ResultCode::from_code(result.rc), result.text.clone())
}

/// Fail unless `result` is a success.
pub fn check(result: LdapResult) -> Result<(), OperationError> {
    if ResultCode::from_code(result.rc).is_success() {
        Ok(())
    } else {
        Err(result_error(&result))
    }
}

/// Entry from a search result. Attributes come back sorted by name.
pub fn entry_from_search(found: SearchEntry) -> Entry {
    let mut attributes: Vec<Attribute> = found
        .attrs
        .into_iter()
        .map(|(name, values)| Attribute::from_values(name, values.into_iter().map(Value::Text).collect()))
        .chain(
            found
                .bin_attrs
                .into_iter()
                .map(|(name, values)| Attribute::from_values(name, values.into_iter().map(Value::Bytes).collect())),
        )
        .collect();
    attributes.sort_by(|a, b| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()));
    Entry::with_attributes(found.dn, attributes)
}

fn value_set(attribute: &Attribute) -> HashSet<Vec<u8>> {
    attribute.values.iter().map(|v| v.as_bytes().into_owned()).collect()
}

/// Attribute list for an add request. Attributes without values are left out.
pub fn add_attributes(entry: &Entry) -> Vec<(Vec<u8>, HashSet<Vec<u8>>)> {
    entry
        .attributes
        .iter()
        .filter(|a| !a.is_empty())
        .map(|a| (a.name.as_bytes().to_vec(), value_set(a)))
        .collect()
}

/// Modify request items.
pub fn modifications(changes: &[Modification]) -> Vec<Mod<Vec<u8>>> {
    changes
        .iter()
        .map(|change| {
            let name = change.name().as_bytes().to_vec();
            let values = value_set(&change.attribute);
            match change.kind {
                ModificationKind::Replace => Mod::Replace(name, values),
                ModificationKind::Add => Mod::Add(name, values),
                ModificationKind::Remove => Mod::Delete(name, values),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn ldap_result(rc: u32, text: &str) -> LdapResult {
        LdapResult {
            rc,
            matched: String::new(),
            text: text.to_string(),
            refs: Vec::new(),
            ctrls: Vec::new(),
        }
    }

    #[test]
    fn result_codes_survive() {
        let err = operation_error(LdapError::LdapResult {
            result: ldap_result(68, "exists"),
        });
        assert_eq!(err.code(), Some(ResultCode::EntryAlreadyExists));
        assert!(!err.is_connection_loss());

        assert!(check(ldap_result(0, "")).is_ok());
        assert_eq!(check(ldap_result(32, "gone")).unwrap_err().code(), Some(ResultCode::NoSuchObject));
    }

    #[test]
    fn io_failures_are_transport_errors() {
        let err = operation_error(LdapError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        )));
        assert!(err.is_connection_loss());
        assert_eq!(err.code(), None);
    }

    #[test]
    fn search_entries_keep_text_and_bytes() {
        let found = SearchEntry {
            dn: "uid=alice,ou=people,o=example".to_string(),
            attrs: HashMap::from([
                ("uid".to_string(), vec!["alice".to_string()]),
                ("mail".to_string(), vec!["a@example.org".to_string(), "b@example.org".to_string()]),
            ]),
            bin_attrs: HashMap::from([("jpegPhoto".to_string(), vec![vec![0xff, 0xd8]])]),
        };
        let entry = entry_from_search(found);
        let names: Vec<&str> = entry.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["jpegPhoto", "mail", "uid"]);
        assert!(entry.get("mail").unwrap().multi_valued);
        assert_eq!(entry.get("jpegPhoto").unwrap().values, [Value::Bytes(vec![0xff, 0xd8])]);
    }

    #[test]
    fn writes_skip_empty_attributes() {
        let entry = Entry::with_attributes(
            "uid=bob,ou=people,o=example",
            vec![
                Attribute::multi("objectClass", ["top", "inetOrgPerson"]),
                Attribute::from_values("description", Vec::new()),
                Attribute::single("employeeNumber", 7),
            ],
        );
        let attributes = add_attributes(&entry);
        assert_eq!(attributes.len(), 2);
        assert!(attributes[1].1.contains(b"7".as_slice()));
    }

    #[test]
    fn removing_everything_sends_no_values() {
        let mods = modifications(&[
            Modification::remove_all("mail"),
            Modification::replace(Attribute::single("cn", "Bob")),
        ]);
        assert!(matches!(&mods[0], Mod::Delete(name, values) if name == b"mail" && values.is_empty()));
        assert!(matches!(&mods[1], Mod::Replace(_, values) if values.len() == 1));
    }
}
