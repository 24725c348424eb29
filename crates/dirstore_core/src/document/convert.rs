//! Entries as JSON documents.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use dirstore_model::{time, Attribute, Entry, Modification, ModificationKind, Value, OBJECT_CLASS};
use serde_json::{Map, Value as Json};

use super::connection::{Document, DocumentMutation};
use super::key::document_key;
use crate::config::EngineConfig;
use crate::error::{PersistError, PersistResult};
use crate::hints::{AttributeHints, AttributeSyntax};

/// Field holding the entry DN.
pub const DN_FIELD: &str = "dn";

/// Converts between entries and stored documents.
#[derive(Debug, Clone, Copy)]
pub struct DocumentCodec<'a> {
    config: &'a EngineConfig,
}

impl<'a> DocumentCodec<'a> {
    /// Create a codec.
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    fn value_to_json(&self, attribute: &str, value: &Value) -> Json {
        if self.config.is_password(attribute) {
            return Json::String(self.config.password_encoding.encode(&value.to_text()));
        }
        match value {
            _ if self.config.is_binary(attribute) => Json::String(STANDARD.encode(value.as_bytes())),
            Value::Text(s) => Json::String(s.clone()),
            Value::Bytes(b) => Json::String(STANDARD.encode(b)),
            Value::Integer(n) => Json::from(*n),
            Value::Bool(b) => Json::Bool(*b),
            Value::Timestamp(t) => Json::String(time::format_document_time(t)),
        }
    }

    fn attribute_to_json(&self, attribute: &Attribute) -> Json {
        let mut values = attribute
            .values
            .iter()
            .map(|v| self.value_to_json(&attribute.name, v));
        if !attribute.multi_valued && attribute.values.len() == 1 {
            values.next().unwrap_or(Json::Null)
        } else {
            Json::Array(values.collect())
        }
    }

    /// Build the document stored for an entry.
    ///
    /// Only the first object class is kept.
    ///
    /// # Errors
    ///
    /// Returns a mapping error for a malformed DN.
    pub fn to_document(&self, entry: &Entry, expires_at: Option<DateTime<Utc>>) -> PersistResult<Document> {
        let key = document_key(&entry.dn)?;
        let mut body = Map::new();
        body.insert(DN_FIELD.to_string(), Json::String(entry.dn.clone()));
        for attribute in &entry.attributes {
            if attribute.is_empty() || attribute.is_named(DN_FIELD) {
                continue;
            }
            if attribute.is_named(OBJECT_CLASS) {
                if let Some(first) = attribute.first() {
                    body.insert(OBJECT_CLASS.to_string(), Json::String(first.to_text().into_owned()));
                }
                continue;
            }
            body.insert(attribute.name.clone(), self.attribute_to_json(attribute));
        }
        Ok(Document {
            key,
            body,
            expires_at,
        })
    }

    fn json_to_value(&self, attribute: &str, syntax: AttributeSyntax, json: &Json) -> Value {
        match json {
            Json::String(s) if syntax == AttributeSyntax::Binary || self.config.is_binary(attribute) => {
                STANDARD
                    .decode(s)
                    .map_or_else(|_| Value::Text(s.clone()), Value::Bytes)
            }
            Json::String(s) if syntax == AttributeSyntax::Timestamp => time::parse_document_time(s)
                .map_or_else(|_| Value::Text(s.clone()), Value::Timestamp),
            Json::String(s) => Value::Text(s.clone()),
            Json::Number(n) => n
                .as_i64()
                .map_or_else(|| Value::Text(n.to_string()), Value::Integer),
            Json::Bool(b) => Value::Bool(*b),
            other => Value::Text(other.to_string()),
        }
    }

    /// Rebuild an entry from a stored document.
    ///
    /// # Errors
    ///
    /// Returns a mapping error if the document has no DN field.
    pub fn from_document(&self, document: &Document, hints: &dyn AttributeHints) -> PersistResult<Entry> {
        let dn = document
            .body
            .get(DN_FIELD)
            .and_then(Json::as_str)
            .ok_or_else(|| PersistError::mapping(format!("document {} has no DN", document.key)))?;
        let mut entry = Entry::new(dn);
        for (name, json) in &document.body {
            if name == DN_FIELD || json.is_null() {
                continue;
            }
            let syntax = hints.hint(name).syntax;
            let attribute = match json {
                Json::Array(items) => Attribute {
                    name: name.clone(),
                    values: items.iter().map(|j| self.json_to_value(name, syntax, j)).collect(),
                    multi_valued: true,
                },
                scalar => Attribute::single(name.clone(), self.json_to_value(name, syntax, scalar)),
            };
            entry.set(attribute);
        }
        Ok(entry)
    }

    /// Sub-document changes for a list of modifications.
    pub fn to_mutations(&self, changes: &[Modification]) -> Vec<DocumentMutation> {
        changes
            .iter()
            .map(|change| {
                let attribute = &change.attribute;
                let field = attribute.name.clone();
                if attribute.is_named(OBJECT_CLASS) {
                    return match attribute.first() {
                        Some(first) if change.kind != ModificationKind::Remove => DocumentMutation::Upsert {
                            field,
                            value: Json::String(first.to_text().into_owned()),
                        },
                        _ => DocumentMutation::Remove { field, values: None },
                    };
                }
                match change.kind {
                    ModificationKind::Replace if attribute.is_empty() => {
                        DocumentMutation::Remove { field, values: None }
                    }
                    ModificationKind::Replace => DocumentMutation::Upsert {
                        value: self.attribute_to_json(attribute),
                        field,
                    },
                    ModificationKind::Add if attribute.multi_valued => DocumentMutation::Append {
                        values: attribute
                            .values
                            .iter()
                            .map(|v| self.value_to_json(&field, v))
                            .collect(),
                        field,
                    },
                    ModificationKind::Add => DocumentMutation::Upsert {
                        value: self.attribute_to_json(attribute),
                        field,
                    },
                    ModificationKind::Remove if attribute.is_empty() || !attribute.multi_valued => {
                        DocumentMutation::Remove { field, values: None }
                    }
                    ModificationKind::Remove => DocumentMutation::Remove {
                        values: Some(
                            attribute
                                .values
                                .iter()
                                .map(|v| self.value_to_json(&field, v))
                                .collect(),
                        ),
                        field,
                    },
                }
            })
            .collect()
    }
}
