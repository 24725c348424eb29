//! Directory entries.

use crate::{Attribute, Value};

/// Name of the object class attribute.
pub const OBJECT_CLASS: &str = "objectClass";

/// A stored record: a distinguished name and its attributes.
///
/// Attributes keep insertion order. Lookups ignore case, writes keep the
/// case the caller supplied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Entry {
    /// Distinguished name.
    pub dn: String,
    /// Attributes in insertion order.
    pub attributes: Vec<Attribute>,
}

impl Entry {
    /// Create an entry without attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }

    /// Create an entry from a DN and attributes.
    pub fn with_attributes(dn: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    /// Look up an attribute by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is_named(name))
    }

    /// Mutable lookup by name, ignoring case.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.iter_mut().find(|a| a.is_named(name))
    }

    /// Returns true if the attribute is present with at least one value.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some_and(|a| !a.is_empty())
    }

    /// Insert or replace an attribute. A replaced attribute keeps its
    /// position in the entry.
    pub fn set(&mut self, attribute: Attribute) {
        match self.get_mut(&attribute.name) {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    /// Set a single text value.
    pub fn set_text(&mut self, name: &str, value: impl Into<String>) {
        self.set(Attribute::single(name, Value::Text(value.into())));
    }

    /// Remove an attribute, returning it if it was present.
    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        let index = self.attributes.iter().position(|a| a.is_named(name))?;
        Some(self.attributes.remove(index))
    }

    /// First value of an attribute rendered as text.
    pub fn first_text(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(Attribute::first)
            .map(|v| v.to_text().into_owned())
    }

    /// Values of the object class attribute.
    pub fn object_classes(&self) -> Vec<String> {
        self.get(OBJECT_CLASS).map(Attribute::texts).unwrap_or_default()
    }

    /// Returns true if the entry declares the object class, ignoring case.
    pub fn has_object_class(&self, class: &str) -> bool {
        self.object_classes()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(class))
    }

    /// Keep only the named attributes. An empty list or `*` keeps everything.
    pub fn retain_attributes(&mut self, names: &[String]) {
        if names.is_empty() || names.iter().any(|n| n == "*") {
            return;
        }
        self.attributes
            .retain(|a| names.iter().any(|n| a.is_named(n)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Entry {
        let mut entry = Entry::new("uid=alice,ou=people,o=example");
        entry.set(Attribute::multi(OBJECT_CLASS, ["top", "person"]));
        entry.set_text("uid", "alice");
        entry.set_text("displayName", "Alice");
        entry
    }

    #[test]
    fn lookup_ignores_case_and_preserves_name() {
        let entry = sample();
        assert_eq!(entry.get("DISPLAYNAME").unwrap().name, "displayName");
        assert!(entry.contains("Uid"));
        assert!(!entry.contains("mail"));
    }

    #[test]
    fn set_replaces_in_place() {
        let mut entry = sample();
        entry.set_text("UID", "bob");
        assert_eq!(entry.attributes.len(), 3);
        assert_eq!(entry.attributes[1].name, "UID");
        assert_eq!(entry.first_text("uid").as_deref(), Some("bob"));
    }

    #[test]
    fn object_classes() {
        let entry = sample();
        assert_eq!(entry.object_classes(), vec!["top", "person"]);
        assert!(entry.has_object_class("PERSON"));
    }

    #[test]
    fn retain_attributes() {
        let mut entry = sample();
        entry.retain_attributes(&["uid".to_string()]);
        assert_eq!(entry.attributes.len(), 1);

        let mut all = sample();
        all.retain_attributes(&["*".to_string()]);
        assert_eq!(all.attributes.len(), 3);
    }

    #[test]
    fn remove() {
        let mut entry = sample();
        assert!(entry.remove("UID").is_some());
        assert!(entry.remove("uid").is_none());
    }
}
