//! Record schema descriptors.
//!
//! A record type describes its storage layout once, with a builder, and
//! hands out a `&'static` descriptor:
//!
//! ```
//! use std::sync::OnceLock;
//! use dirstore_core::mapping::{DataEntry, EntrySchema};
//!
//! #[derive(Debug, Default)]
//! struct Group {
//!     dn: String,
//!     name: String,
//!     members: Vec<String>,
//! }
//!
//! impl DataEntry for Group {
//!     fn schema() -> &'static EntrySchema<Self> {
//!         static SCHEMA: OnceLock<EntrySchema<Group>> = OnceLock::new();
//!         SCHEMA.get_or_init(|| {
//!             EntrySchema::<Group>::builder("Group")
//!                 .object_classes(["top", "groupOfNames"])
//!                 .dn(|g| &g.dn, |g, dn| g.dn = dn)
//!                 .attribute("cn", |g| &g.name, |g, v| g.name = v)
//!                 .attribute("member", |g| &g.members, |g, v| g.members = v)
//!                 .build()
//!         })
//!     }
//! }
//!
//! assert_eq!(Group::schema().object_classes(), ["top", "groupOfNames"]);
//! ```

use std::fmt;

use dirstore_model::{ModelResult, Value};

use super::convert::AttributeType;
use crate::hints::{AttributeHint, AttributeSyntax, SchemaHints};

/// A record type stored as an entry.
pub trait DataEntry: Default + Send + Sync + 'static {
    /// Storage layout of the type.
    fn schema() -> &'static EntrySchema<Self>;
}

type Getter<T> = Box<dyn Fn(&T) -> Vec<Value> + Send + Sync>;
type Setter<T> = Box<dyn Fn(&mut T, &[Value]) -> ModelResult<()> + Send + Sync>;

/// What a bound field is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Ordinary attribute.
    Attribute,
    /// Password; hashed before writes and never diffed.
    Password,
}

/// One field bound to one attribute.
pub struct FieldBinding<T> {
    attribute: String,
    syntax: AttributeSyntax,
    multi_valued: bool,
    consistency: bool,
    ignore_during_update: bool,
    role: FieldRole,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T> FieldBinding<T> {
    /// Attribute name.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Value syntax.
    pub fn syntax(&self) -> AttributeSyntax {
        self.syntax
    }

    /// Whether the attribute holds several values.
    pub fn is_multi_valued(&self) -> bool {
        self.multi_valued
    }

    /// Whether merges leave this attribute alone.
    pub fn is_ignored_during_update(&self) -> bool {
        self.ignore_during_update
    }

    /// Field role.
    pub fn role(&self) -> FieldRole {
        self.role
    }

    /// Hint derived from the binding.
    pub fn hint(&self) -> AttributeHint {
        AttributeHint {
            syntax: self.syntax,
            multi_valued: self.multi_valued,
            consistency: self.consistency,
        }
    }

    pub(crate) fn read(&self, record: &T) -> Vec<Value> {
        (self.get)(record)
    }

    pub(crate) fn write(&self, record: &mut T, values: &[Value]) -> ModelResult<()> {
        (self.set)(record, values)
    }
}

impl<T> fmt::Debug for FieldBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBinding")
            .field("attribute", &self.attribute)
            .field("syntax", &self.syntax)
            .field("multi_valued", &self.multi_valued)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

pub(crate) struct DnBinding<T> {
    pub(crate) get: fn(&T) -> &String,
    pub(crate) set: fn(&mut T, String),
}

pub(crate) struct ClassBinding<T> {
    pub(crate) get: fn(&T) -> &Vec<String>,
    pub(crate) set: fn(&mut T, Vec<String>),
}

/// Storage layout of a record type.
pub struct EntrySchema<T> {
    name: &'static str,
    object_classes: Vec<String>,
    pub(crate) dn: Option<DnBinding<T>>,
    pub(crate) custom_object_classes: Option<ClassBinding<T>>,
    pub(crate) ttl: Option<fn(&T) -> Option<i64>>,
    fields: Vec<FieldBinding<T>>,
}

impl<T> EntrySchema<T> {
    /// Start describing a record type.
    pub fn builder(name: &'static str) -> EntrySchemaBuilder<T> {
        EntrySchemaBuilder {
            schema: EntrySchema {
                name,
                object_classes: Vec::new(),
                dn: None,
                custom_object_classes: None,
                ttl: None,
                fields: Vec::new(),
            },
        }
    }

    /// Type name used in log messages and errors.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared object classes, most general first.
    pub fn object_classes(&self) -> &[String] {
        &self.object_classes
    }

    /// Bound fields in declaration order.
    pub fn fields(&self) -> &[FieldBinding<T>] {
        &self.fields
    }

    /// Field bound to an attribute.
    pub fn field(&self, attribute: &str) -> Option<&FieldBinding<T>> {
        self.fields
            .iter()
            .find(|f| f.attribute.eq_ignore_ascii_case(attribute))
    }

    /// Attributes to request when reading this type.
    pub fn return_attributes(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.attribute.clone()).collect()
    }

    /// Hints for every bound attribute.
    pub fn hints(&self) -> SchemaHints {
        let mut hints = SchemaHints::empty();
        for field in &self.fields {
            hints.declare(&field.attribute, field.hint());
        }
        hints
    }
}

impl<T> fmt::Debug for EntrySchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntrySchema")
            .field("name", &self.name)
            .field("object_classes", &self.object_classes)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// Builder for [`EntrySchema`].
pub struct EntrySchemaBuilder<T> {
    schema: EntrySchema<T>,
}

impl<T: 'static> EntrySchemaBuilder<T> {
    /// Object classes attached on write.
    #[must_use]
    pub fn object_classes<S: Into<String>>(mut self, classes: impl IntoIterator<Item = S>) -> Self {
        self.schema.object_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    /// Bind the DN field.
    #[must_use]
    pub fn dn(mut self, get: fn(&T) -> &String, set: fn(&mut T, String)) -> Self {
        self.schema.dn = Some(DnBinding { get, set });
        self
    }

    /// Bind a field to an attribute.
    #[must_use]
    pub fn attribute<V>(self, attribute: &str, get: fn(&T) -> &V, set: fn(&mut T, V)) -> Self
    where
        V: AttributeType + 'static,
    {
        self.bind(attribute, FieldRole::Attribute, get, set)
    }

    /// Bind a password field.
    #[must_use]
    pub fn password(
        self,
        attribute: &str,
        get: fn(&T) -> &Option<String>,
        set: fn(&mut T, Option<String>),
    ) -> Self {
        self.bind(attribute, FieldRole::Password, get, set)
    }

    /// Exclude the last bound field from merges.
    #[must_use]
    pub fn ignore_during_update(mut self) -> Self {
        if let Some(field) = self.schema.fields.last_mut() {
            field.ignore_during_update = true;
        }
        self
    }

    /// Filters on the last bound field need strongly consistent reads.
    #[must_use]
    pub fn consistency(mut self) -> Self {
        if let Some(field) = self.schema.fields.last_mut() {
            field.consistency = true;
        }
        self
    }

    /// Expiration in seconds, applied by backends with native expiry.
    #[must_use]
    pub fn ttl(mut self, get: fn(&T) -> Option<i64>) -> Self {
        self.schema.ttl = Some(get);
        self
    }

    /// Bind a field holding object classes beyond the declared ones.
    #[must_use]
    pub fn custom_object_classes(
        mut self,
        get: fn(&T) -> &Vec<String>,
        set: fn(&mut T, Vec<String>),
    ) -> Self {
        self.schema.custom_object_classes = Some(ClassBinding { get, set });
        self
    }

    /// Finish the descriptor.
    pub fn build(self) -> EntrySchema<T> {
        self.schema
    }

    fn bind<V>(mut self, attribute: &str, role: FieldRole, get: fn(&T) -> &V, set: fn(&mut T, V)) -> Self
    where
        V: AttributeType + 'static,
    {
        let name = attribute.to_string();
        self.schema.fields.push(FieldBinding {
            attribute: attribute.to_string(),
            syntax: V::SYNTAX,
            multi_valued: V::MULTI_VALUED,
            consistency: false,
            ignore_during_update: false,
            role,
            get: Box::new(move |record| get(record).to_values()),
            set: Box::new(move |record, values| {
                set(record, V::from_values(&name, values)?);
                Ok(())
            }),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Device {
        dn: String,
        id: String,
        ports: Vec<String>,
        enabled: bool,
    }

    fn schema() -> EntrySchema<Device> {
        EntrySchema::<Device>::builder("Device")
            .object_classes(["top", "device"])
            .dn(|d| &d.dn, |d, dn| d.dn = dn)
            .attribute("cn", |d| &d.id, |d, v| d.id = v)
            .consistency()
            .attribute("ipServicePort", |d| &d.ports, |d, v| d.ports = v)
            .attribute("enabled", |d| &d.enabled, |d, v| d.enabled = v)
            .ignore_during_update()
            .build()
    }

    #[test]
    fn describes_fields() {
        let schema = schema();
        assert_eq!(schema.name(), "Device");
        assert_eq!(schema.return_attributes(), vec!["cn", "ipServicePort", "enabled"]);
        assert!(schema.field("IPSERVICEPORT").unwrap().is_multi_valued());
        assert!(schema.field("enabled").unwrap().is_ignored_during_update());
        assert!(!schema.field("cn").unwrap().is_ignored_during_update());
    }

    #[test]
    fn hints_follow_bindings() {
        let hints = schema().hints();
        let cn = hints.get("cn").unwrap();
        assert!(cn.consistency);
        assert_eq!(hints.get("enabled").unwrap().syntax, AttributeSyntax::Boolean);
        assert!(hints.get("ipServicePort").unwrap().multi_valued);
    }

    #[test]
    fn bindings_read_and_write() {
        let schema = schema();
        let mut device = Device::default();
        let field = schema.field("enabled").unwrap();
        field.write(&mut device, &[Value::from("TRUE")]).unwrap();
        assert!(device.enabled);
        assert_eq!(field.read(&device), vec![Value::Bool(true)]);
        assert!(field.write(&mut device, &[Value::from("nope")]).is_err());
    }
}
