//! Lowering backend-neutral filters to native query expressions.
//!
//! Each backend has its own [`FilterTranslator`]. Translation is a
//! structural walk over [`Filter`] with one case per variant; leaf values
//! are escaped for the target syntax and typed by the attribute hints.

mod document;
mod ldap;

use dirstore_model::Filter;

pub use document::{CompareOp, DocumentExpression, DocumentFilterTranslator};
pub use ldap::{escape_filter_value, LdapFilterTranslator};

use crate::error::{PersistError, PersistResult};
use crate::hints::AttributeHints;

/// A translated filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Translated<T> {
    /// Native expression.
    pub expression: T,
    /// The caller must request a strongly consistent read.
    pub consistency_required: bool,
}

/// Lowers a [`Filter`] to a backend expression.
pub trait FilterTranslator {
    /// Native expression type.
    type Output;

    /// Translate a filter.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::FilterTranslation`] when the filter cannot be
    /// expressed, for example an empty conjunction or an attribute name
    /// with reserved characters.
    fn translate(
        &self,
        filter: &Filter,
        hints: &dyn AttributeHints,
    ) -> PersistResult<Translated<Self::Output>>;
}

/// Attribute descriptions: letters, digits, `-`, `.` and `;` options.
pub(crate) fn check_attribute(attribute: &str) -> PersistResult<()> {
    let valid = !attribute.is_empty()
        && attribute.starts_with(|c: char| c.is_ascii_alphanumeric())
        && attribute
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | ';' | '_'));
    if valid {
        Ok(())
    } else {
        Err(PersistError::filter(format!(
            "invalid attribute name {attribute:?}"
        )))
    }
}
