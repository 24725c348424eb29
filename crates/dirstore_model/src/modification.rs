//! Attribute modifications.

use crate::{Attribute, Value};

/// Kind of attribute change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModificationKind {
    /// Replace all values.
    Replace,
    /// Add values.
    Add,
    /// Remove the given values, or the whole attribute when none are given.
    Remove,
}

/// One change to one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    /// What to do.
    pub kind: ModificationKind,
    /// Attribute name and values.
    pub attribute: Attribute,
}

impl Modification {
    /// Replace every value of an attribute.
    pub fn replace(attribute: Attribute) -> Self {
        Self {
            kind: ModificationKind::Replace,
            attribute,
        }
    }

    /// Add values to an attribute.
    pub fn add(attribute: Attribute) -> Self {
        Self {
            kind: ModificationKind::Add,
            attribute,
        }
    }

    /// Remove specific values.
    pub fn remove(attribute: Attribute) -> Self {
        Self {
            kind: ModificationKind::Remove,
            attribute,
        }
    }

    /// Remove an attribute entirely.
    pub fn remove_all(name: impl Into<String>) -> Self {
        Self::remove(Attribute::from_values(name, Vec::<Value>::new()))
    }

    /// Attribute name targeted by this modification.
    pub fn name(&self) -> &str {
        &self.attribute.name
    }
}
