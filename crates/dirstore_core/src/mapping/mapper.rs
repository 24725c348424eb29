//! Conversion between typed records and entries.

use std::time::Duration;

use dirstore_model::{Attribute, Entry, Filter, Modification, Value, OBJECT_CLASS};

use super::convert::same_values;
use super::schema::{DataEntry, EntrySchema, FieldRole};
use crate::error::{PersistError, PersistResult};
use crate::hints::SchemaHints;

/// How a backend stores object classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MappingProfile {
    /// Only the first object class is stored, as a type discriminator.
    pub single_object_class: bool,
}

/// Converts typed records to entries and back.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeMapper {
    profile: MappingProfile,
}

impl AttributeMapper {
    /// Create a mapper for a backend profile.
    pub fn new(profile: MappingProfile) -> Self {
        Self { profile }
    }

    /// Backend profile.
    pub fn profile(&self) -> MappingProfile {
        self.profile
    }

    /// Build the entry written for a record.
    ///
    /// # Errors
    ///
    /// Returns a mapping error if the type has no DN binding or the DN is
    /// empty.
    pub fn to_entry<T: DataEntry>(&self, record: &T) -> PersistResult<Entry> {
        let schema = T::schema();
        let dn = record_dn(schema, record)?;

        let mut entry = Entry::new(dn);
        let classes = self.record_object_classes(schema, record);
        if !classes.is_empty() {
            entry.set(Attribute::multi(OBJECT_CLASS, classes));
        }
        for field in schema.fields() {
            let values = field.read(record);
            if values.is_empty() {
                continue;
            }
            entry.set(Attribute {
                name: field.attribute().to_string(),
                values,
                multi_valued: field.is_multi_valued(),
            });
        }
        Ok(entry)
    }

    /// Build a record from an entry.
    ///
    /// Attributes the type does not bind are ignored; bound attributes the
    /// entry lacks keep the field's zero value.
    ///
    /// # Errors
    ///
    /// Returns a mapping error when a value cannot be converted to its
    /// field type.
    pub fn from_entry<T: DataEntry>(&self, entry: &Entry) -> PersistResult<T> {
        let schema = T::schema();
        let mut record = T::default();

        if let Some(dn) = &schema.dn {
            (dn.set)(&mut record, entry.dn.clone());
        }
        for field in schema.fields() {
            let values: &[Value] = entry
                .get(field.attribute())
                .map(|a| a.values.as_slice())
                .unwrap_or_default();
            field.write(&mut record, values)?;
        }
        if let Some(custom) = &schema.custom_object_classes {
            let declared = schema.object_classes();
            let extra = entry
                .object_classes()
                .into_iter()
                .filter(|c| !declared.iter().any(|d| d.eq_ignore_ascii_case(c)))
                .collect();
            (custom.set)(&mut record, extra);
        }
        Ok(record)
    }

    /// Modifications that turn `current` into the state of `record`.
    ///
    /// The DN, password fields and fields marked ignore-during-update are
    /// never diffed. Password fields with a value are always replaced, since
    /// stored values are hashed.
    ///
    /// # Errors
    ///
    /// Returns a mapping error if the record has no DN.
    pub fn diff<T: DataEntry>(&self, current: &Entry, record: &T) -> PersistResult<Vec<Modification>> {
        let schema = T::schema();
        record_dn(schema, record)?;
        let mut changes = Vec::new();

        let classes = self.record_object_classes(schema, record);
        let stored_classes = current.object_classes();
        if let Some(change) = self.object_class_change(&stored_classes, &classes) {
            changes.push(change);
        }

        for field in schema.fields() {
            if field.is_ignored_during_update() {
                continue;
            }
            let new = field.read(record);
            let attribute = Attribute {
                name: field.attribute().to_string(),
                values: new,
                multi_valued: field.is_multi_valued(),
            };

            if field.role() == FieldRole::Password {
                if !attribute.is_empty() {
                    changes.push(Modification::replace(attribute));
                }
                continue;
            }

            let stored = current
                .get(field.attribute())
                .map(|a| a.values.as_slice())
                .unwrap_or_default();
            match (stored.is_empty(), attribute.is_empty()) {
                (true, true) => {}
                (false, true) => changes.push(Modification::remove_all(field.attribute())),
                (true, false) => changes.push(Modification::add(attribute)),
                (false, false) => {
                    if !same_values(field.syntax(), stored, &attribute.values) {
                        changes.push(Modification::replace(attribute));
                    }
                }
            }
        }
        Ok(changes)
    }

    /// Attributes to request when reading `T`.
    pub fn return_attributes<T: DataEntry>(&self) -> Vec<String> {
        let mut attributes = T::schema().return_attributes();
        attributes.push(OBJECT_CLASS.to_string());
        attributes
    }

    /// Filter restricting a search to entries of `T`.
    ///
    /// Single-class backends match the discriminator only; others require
    /// every declared class.
    pub fn object_class_filter<T: DataEntry>(&self) -> Option<Filter> {
        let classes = T::schema().object_classes();
        if self.profile.single_object_class {
            return classes
                .first()
                .map(|c| Filter::equality(OBJECT_CLASS, c.as_str()));
        }
        match classes {
            [] => None,
            [only] => Some(Filter::equality(OBJECT_CLASS, only.as_str())),
            many => Some(Filter::and(
                many.iter()
                    .map(|c| Filter::equality(OBJECT_CLASS, c.as_str()))
                    .collect(),
            )),
        }
    }

    /// Combine a caller filter with the type's object class filter.
    pub fn restrict<T: DataEntry>(&self, filter: Option<Filter>) -> Filter {
        match (self.object_class_filter::<T>(), filter) {
            (Some(classes), Some(filter)) => classes.and_also(filter),
            (Some(classes), None) => classes,
            (None, Some(filter)) => filter,
            (None, None) => Filter::any_entry(),
        }
    }

    /// Declared hints of `T`.
    pub fn hints<T: DataEntry>(&self) -> SchemaHints {
        T::schema().hints()
    }

    /// Expiration of a record, if the type binds one and it is positive.
    pub fn ttl<T: DataEntry>(&self, record: &T) -> Option<Duration> {
        let get = T::schema().ttl?;
        get(record)
            .filter(|secs| *secs > 0)
            .and_then(|secs| u64::try_from(secs).ok())
            .map(Duration::from_secs)
    }

    fn record_object_classes<T>(&self, schema: &EntrySchema<T>, record: &T) -> Vec<String> {
        let mut classes: Vec<String> = schema.object_classes().to_vec();
        if let Some(custom) = &schema.custom_object_classes {
            for class in (custom.get)(record) {
                if !classes.iter().any(|c| c.eq_ignore_ascii_case(class)) {
                    classes.push(class.clone());
                }
            }
        }
        if self.profile.single_object_class {
            classes.truncate(1);
        }
        classes
    }

    fn object_class_change(&self, stored: &[String], classes: &[String]) -> Option<Modification> {
        if classes.is_empty() {
            return None;
        }
        let changed = if self.profile.single_object_class {
            !matches!(
                (stored.first(), classes.first()),
                (Some(a), Some(b)) if a.eq_ignore_ascii_case(b)
            )
        } else {
            let lower = |v: &[String]| {
                let mut v: Vec<String> = v.iter().map(|c| c.to_ascii_lowercase()).collect();
                v.sort();
                v.dedup();
                v
            };
            lower(stored) != lower(classes)
        };
        changed.then(|| Modification::replace(Attribute::multi(OBJECT_CLASS, classes.to_vec())))
    }
}

fn record_dn<T>(schema: &EntrySchema<T>, record: &T) -> PersistResult<String> {
    let binding = schema
        .dn
        .as_ref()
        .ok_or_else(|| PersistError::mapping(format!("{} has no DN binding", schema.name())))?;
    let dn = (binding.get)(record);
    if dn.trim().is_empty() {
        return Err(PersistError::mapping(format!("{} record has an empty DN", schema.name())));
    }
    Ok(dn.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirstore_model::ModificationKind;
    use std::sync::OnceLock;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Account {
        dn: String,
        uid: String,
        mail: Vec<String>,
        quota: Option<i64>,
        note: String,
        password: Option<String>,
        classes: Vec<String>,
        expires_in: Option<i64>,
    }

    impl DataEntry for Account {
        fn schema() -> &'static EntrySchema<Self> {
            static SCHEMA: OnceLock<EntrySchema<Account>> = OnceLock::new();
            SCHEMA.get_or_init(|| {
                EntrySchema::<Account>::builder("Account")
                    .object_classes(["top", "account"])
                    .dn(|a| &a.dn, |a, dn| a.dn = dn)
                    .attribute("uid", |a| &a.uid, |a, v| a.uid = v)
                    .attribute("mail", |a| &a.mail, |a, v| a.mail = v)
                    .attribute("quota", |a| &a.quota, |a, v| a.quota = v)
                    .attribute("description", |a| &a.note, |a, v| a.note = v)
                    .ignore_during_update()
                    .password("userPassword", |a| &a.password, |a, v| a.password = v)
                    .custom_object_classes(|a| &a.classes, |a, v| a.classes = v)
                    .ttl(|a| a.expires_in)
                    .build()
            })
        }
    }

    fn alice() -> Account {
        Account {
            dn: "uid=alice,ou=people,o=example".into(),
            uid: "alice".into(),
            mail: vec!["a@example.org".into(), "alice@example.org".into()],
            quota: Some(5),
            note: "first".into(),
            password: None,
            classes: vec!["extensibleObject".into()],
            expires_in: None,
        }
    }

    #[test]
    fn entry_round_trip() {
        let mapper = AttributeMapper::default();
        let entry = mapper.to_entry(&alice()).unwrap();
        assert_eq!(entry.object_classes(), vec!["top", "account", "extensibleObject"]);
        assert!(entry.get("mail").unwrap().multi_valued);
        assert!(!entry.contains("userPassword"));

        let back: Account = mapper.from_entry(&entry).unwrap();
        assert_eq!(back, alice());
    }

    #[test]
    fn missing_attributes_get_zero_values_and_unknown_are_ignored() {
        let mut entry = Entry::new("uid=bob,o=example");
        entry.set_text("uid", "bob");
        entry.set_text("unrelated", "x");
        let bob: Account = AttributeMapper::default().from_entry(&entry).unwrap();
        assert_eq!(bob.uid, "bob");
        assert!(bob.mail.is_empty());
        assert_eq!(bob.quota, None);
    }

    #[test]
    fn empty_dn_is_rejected() {
        let account = Account::default();
        assert!(matches!(
            AttributeMapper::default().to_entry(&account),
            Err(PersistError::Mapping { .. })
        ));
    }

    #[test]
    fn diff_produces_minimal_changes() {
        let mapper = AttributeMapper::default();
        let current = mapper.to_entry(&alice()).unwrap();

        let mut changed = alice();
        changed.mail.reverse();
        changed.quota = None;
        changed.uid = "alice2".into();
        changed.note = "ignored".into();
        changed.password = Some("secret".into());

        let changes = mapper.diff(&current, &changed).unwrap();
        let summary: Vec<(ModificationKind, &str)> =
            changes.iter().map(|m| (m.kind, m.name())).collect();
        assert_eq!(
            summary,
            vec![
                (ModificationKind::Replace, "uid"),
                (ModificationKind::Remove, "quota"),
                (ModificationKind::Replace, "userPassword"),
            ]
        );
    }

    #[test]
    fn diff_adds_new_attributes() {
        let mapper = AttributeMapper::default();
        let mut sparse = alice();
        sparse.quota = None;
        let current = mapper.to_entry(&sparse).unwrap();
        let changes = mapper.diff(&current, &alice()).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ModificationKind::Add);
        assert_eq!(changes[0].name(), "quota");
    }

    #[test]
    fn single_object_class_compares_first_class_only() {
        let mapper = AttributeMapper::new(MappingProfile {
            single_object_class: true,
        });
        let entry = mapper.to_entry(&alice()).unwrap();
        assert_eq!(entry.object_classes(), vec!["top"]);

        let mut stored = entry.clone();
        stored.set(Attribute::multi(OBJECT_CLASS, ["TOP", "somethingElse"]));
        assert!(mapper.diff(&stored, &alice()).unwrap().is_empty());

        let full = AttributeMapper::default();
        let changes = full.diff(&stored, &alice()).unwrap();
        assert_eq!(changes[0].name(), OBJECT_CLASS);
    }

    #[test]
    fn object_class_filters() {
        let full = AttributeMapper::default().object_class_filter::<Account>().unwrap();
        assert!(matches!(full, Filter::And(ref c) if c.len() == 2));

        let single = AttributeMapper::new(MappingProfile {
            single_object_class: true,
        })
        .object_class_filter::<Account>()
        .unwrap();
        assert_eq!(single, Filter::equality(OBJECT_CLASS, "top"));
    }

    #[test]
    fn ttl_is_positive_seconds() {
        let mapper = AttributeMapper::default();
        let mut account = alice();
        assert_eq!(mapper.ttl(&account), None);
        account.expires_in = Some(0);
        assert_eq!(mapper.ttl(&account), None);
        account.expires_in = Some(30);
        assert_eq!(mapper.ttl(&account), Some(Duration::from_secs(30)));
    }
}
