//! Attribute type hints.
//!
//! Translators and the local sort need to know whether an attribute holds
//! strings, numbers, booleans or timestamps. Record schemas declare this for
//! their own fields; directory servers publish it in their subschema entry.
//! [`AttributeTypeCache`] loads the server side once per process and is
//! then read-only.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::PersistResult;

const SYNTAX_PREFIX: &str = "1.3.6.1.4.1.1466.115.121.1.";
const MAX_SUPERTYPE_DEPTH: usize = 16;

/// Value syntax of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttributeSyntax {
    /// Directory string and friends.
    #[default]
    String,
    /// Integer.
    Integer,
    /// Boolean (`TRUE`/`FALSE`).
    Boolean,
    /// Generalized time.
    Timestamp,
    /// Octet string, certificates, JPEG and other opaque bytes.
    Binary,
}

impl AttributeSyntax {
    /// Map a syntax OID (optionally carrying a `{length}` bound).
    pub fn from_oid(oid: &str) -> Self {
        let oid = oid.split('{').next().unwrap_or(oid).trim();
        match oid.strip_prefix(SYNTAX_PREFIX) {
            Some("7") => AttributeSyntax::Boolean,
            Some("27") => AttributeSyntax::Integer,
            Some("24") => AttributeSyntax::Timestamp,
            Some("5" | "8" | "9" | "10" | "28" | "40") => AttributeSyntax::Binary,
            _ => AttributeSyntax::String,
        }
    }
}

/// Everything known about one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeHint {
    /// Value syntax.
    pub syntax: AttributeSyntax,
    /// Declared multi-valued.
    pub multi_valued: bool,
    /// Reads filtering on this attribute need strong consistency.
    pub consistency: bool,
}

/// Source of attribute hints.
pub trait AttributeHints {
    /// Hint for an attribute. Unknown attributes are single-valued strings.
    fn hint(&self, attribute: &str) -> AttributeHint;
}

/// Hints declared by a record schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaHints {
    declared: HashMap<String, AttributeHint>,
}

impl SchemaHints {
    /// No declared hints.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Declare a hint.
    pub fn declare(&mut self, attribute: &str, hint: AttributeHint) {
        self.declared.insert(attribute.to_ascii_lowercase(), hint);
    }

    /// Builder form of [`SchemaHints::declare`].
    #[must_use]
    pub fn with(mut self, attribute: &str, hint: AttributeHint) -> Self {
        self.declare(attribute, hint);
        self
    }

    /// Declared hint, if any.
    pub fn get(&self, attribute: &str) -> Option<AttributeHint> {
        self.declared.get(&attribute.to_ascii_lowercase()).copied()
    }

    /// Layer server-published types under these declarations.
    pub fn layered<'a>(&'a self, server: Option<&'a AttributeTypes>) -> LayeredHints<'a> {
        LayeredHints {
            declared: self,
            server,
        }
    }
}

impl AttributeHints for SchemaHints {
    fn hint(&self, attribute: &str) -> AttributeHint {
        self.get(attribute).unwrap_or_default()
    }
}

/// Declared hints first, server types second.
#[derive(Debug, Clone, Copy)]
pub struct LayeredHints<'a> {
    declared: &'a SchemaHints,
    server: Option<&'a AttributeTypes>,
}

impl AttributeHints for LayeredHints<'_> {
    fn hint(&self, attribute: &str) -> AttributeHint {
        if let Some(hint) = self.declared.get(attribute) {
            return hint;
        }
        AttributeHint {
            syntax: self
                .server
                .and_then(|types| types.syntax_of(attribute))
                .unwrap_or_default(),
            ..AttributeHint::default()
        }
    }
}

/// Attribute syntaxes published by a directory server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeTypes {
    syntaxes: HashMap<String, AttributeSyntax>,
}

#[derive(Debug, Default)]
struct TypeDefinition {
    names: Vec<String>,
    superior: Option<String>,
    syntax: Option<String>,
}

impl AttributeTypes {
    /// Parse `attributeTypes` definitions (RFC 4512).
    ///
    /// Types without their own `SYNTAX` inherit it through their `SUP`
    /// chain. Unparsable definitions are skipped.
    pub fn from_definitions<S: AsRef<str>>(definitions: &[S]) -> Self {
        let parsed: Vec<TypeDefinition> = definitions
            .iter()
            .filter_map(|d| parse_definition(d.as_ref()))
            .collect();

        let mut by_name: HashMap<String, &TypeDefinition> = HashMap::new();
        for def in &parsed {
            for name in &def.names {
                by_name.insert(name.to_ascii_lowercase(), def);
            }
        }

        let mut syntaxes = HashMap::new();
        for def in &parsed {
            let mut current = def;
            let mut resolved = current.syntax.as_deref();
            let mut depth = 0;
            while resolved.is_none() && depth < MAX_SUPERTYPE_DEPTH {
                let Some(parent) = current
                    .superior
                    .as_deref()
                    .and_then(|sup| by_name.get(&sup.to_ascii_lowercase()))
                else {
                    break;
                };
                current = parent;
                resolved = current.syntax.as_deref();
                depth += 1;
            }
            let syntax = resolved.map(AttributeSyntax::from_oid).unwrap_or_default();
            for name in &def.names {
                syntaxes.insert(name.to_ascii_lowercase(), syntax);
            }
        }

        Self { syntaxes }
    }

    /// Syntax of a published attribute type.
    pub fn syntax_of(&self, attribute: &str) -> Option<AttributeSyntax> {
        self.syntaxes.get(&attribute.to_ascii_lowercase()).copied()
    }

    /// Number of known attribute names.
    pub fn len(&self) -> usize {
        self.syntaxes.len()
    }

    /// Returns true if nothing was published.
    pub fn is_empty(&self) -> bool {
        self.syntaxes.is_empty()
    }
}

fn tokenize(definition: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = definition.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            '(' | ')' => {
                tokens.push(ch.to_string());
                chars.next();
            }
            '\'' => {
                chars.next();
                let quoted: String = chars.by_ref().take_while(|&c| c != '\'').collect();
                tokens.push(format!("'{quoted}"));
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' || c == '\'' {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(word);
            }
        }
    }
    tokens
}

fn parse_definition(definition: &str) -> Option<TypeDefinition> {
    let tokens = tokenize(definition);
    let mut def = TypeDefinition::default();
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i].as_str() {
            "NAME" => {
                i += 1;
                if tokens.get(i).map(String::as_str) == Some("(") {
                    i += 1;
                    while let Some(name) = tokens.get(i).and_then(|t| t.strip_prefix('\'')) {
                        def.names.push(name.to_string());
                        i += 1;
                    }
                } else if let Some(name) = tokens.get(i).and_then(|t| t.strip_prefix('\'')) {
                    def.names.push(name.to_string());
                }
            }
            "SUP" => {
                i += 1;
                def.superior = tokens.get(i).cloned();
            }
            "SYNTAX" => {
                i += 1;
                def.syntax = tokens.get(i).map(|t| t.trim_matches('\'').to_string());
            }
            _ => {}
        }
        i += 1;
    }

    (!def.names.is_empty()).then_some(def)
}

/// Process-lifetime cache of server attribute types.
///
/// The first caller loads the types under a lock; later callers read the
/// stored value without locking. A failed load is not cached.
#[derive(Debug, Default)]
pub struct AttributeTypeCache {
    types: OnceLock<AttributeTypes>,
    loading: Mutex<()>,
}

impl AttributeTypeCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loaded types, if a load has succeeded.
    pub fn get(&self) -> Option<&AttributeTypes> {
        self.types.get()
    }

    /// Return the cached types, loading them with `load` on first use.
    ///
    /// # Errors
    ///
    /// Returns the loader's error; the next call retries the load.
    pub fn get_or_load<F>(&self, load: F) -> PersistResult<&AttributeTypes>
    where
        F: FnOnce() -> PersistResult<AttributeTypes>,
    {
        if let Some(types) = self.types.get() {
            return Ok(types);
        }
        let _guard = self.loading.lock();
        if let Some(types) = self.types.get() {
            return Ok(types);
        }
        let loaded = load()?;
        debug!(attributes = loaded.len(), "attribute type cache populated");
        Ok(self.types.get_or_init(|| loaded))
    }
}
