//! Error types for the model crate.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while parsing or converting model values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A distinguished name could not be parsed.
    #[error("invalid DN '{dn}': {message}")]
    InvalidDn {
        /// The offending DN.
        dn: String,
        /// Description of the problem.
        message: String,
    },

    /// A value could not be converted to the requested type.
    #[error("cannot convert value of attribute '{attribute}' to {expected}")]
    Conversion {
        /// The attribute being converted.
        attribute: String,
        /// Name of the expected type.
        expected: &'static str,
    },

    /// A timestamp string did not match the backend time format.
    #[error("invalid timestamp '{input}'")]
    InvalidTimestamp {
        /// The unparsable input.
        input: String,
    },
}

impl ModelError {
    /// Create an invalid DN error.
    pub fn invalid_dn(dn: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDn {
            dn: dn.into(),
            message: message.into(),
        }
    }

    /// Create a conversion error.
    pub fn conversion(attribute: impl Into<String>, expected: &'static str) -> Self {
        Self::Conversion {
            attribute: attribute.into(),
            expected,
        }
    }
}
