//! Error types for cache operations.

use dirstore_core::PersistError;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors from cache providers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Unusable cache configuration.
    #[error("cache configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// The backing persistence engine failed.
    #[error("cache persistence error: {0}")]
    Persistence(#[from] PersistError),

    /// The remote cache failed.
    #[error("remote cache error: {message}")]
    Remote {
        /// Description of the failure.
        message: String,
    },

    /// A value could not be encoded or decoded.
    #[error("cache serialization error: {message}")]
    Serialization {
        /// Description of the problem.
        message: String,
    },
}

impl CacheError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a remote cache error.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_layer() {
        let err = CacheError::configuration("base DN is empty");
        assert_eq!(err.to_string(), "cache configuration error: base DN is empty");

        let err: CacheError = PersistError::connection("down").into();
        assert!(err.to_string().starts_with("cache persistence error"));
    }
}
