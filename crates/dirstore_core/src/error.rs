//! Error types for persistence operations.

use dirstore_model::{ModelError, ResultCode};
use dirstore_pool::PoolError;
use thiserror::Error;

use crate::backend::OperationError;

/// Result type for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Errors surfaced to callers of the persistence engines.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistError {
    /// Unusable configuration. Fatal at startup.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// Transport or bind failure; also used for entries that cannot be read.
    #[error("connection error: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
    },

    /// The DN already exists.
    #[error("entry already exists: {dn}")]
    DuplicateEntry {
        /// The duplicate DN.
        dn: String,
    },

    /// The service account may not perform the write.
    #[error("insufficient access rights for {dn}: {message}")]
    Access {
        /// Target DN.
        dn: String,
        /// Server message.
        message: String,
    },

    /// The write violates the backend schema.
    #[error("schema violation for {dn}: {message}")]
    Schema {
        /// Target DN.
        dn: String,
        /// Server message.
        message: String,
    },

    /// A filter could not be expressed in the backend query language.
    #[error("filter translation failed: {message}")]
    FilterTranslation {
        /// Description of the problem.
        message: String,
    },

    /// A record could not be converted to or from an entry.
    #[error("mapping error: {message}")]
    Mapping {
        /// Description of the problem.
        message: String,
    },

    /// The backend lacks a required capability.
    #[error("unsupported operation: {message}")]
    Unsupported {
        /// Description of the missing capability.
        message: String,
    },
}

impl PersistError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a filter translation error.
    pub fn filter(message: impl Into<String>) -> Self {
        Self::FilterTranslation {
            message: message.into(),
        }
    }

    /// Create a mapping error.
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Classify a failed write against `dn`.
    ///
    /// Duplicate, access and schema codes get their own variants, everything
    /// else is a connection error.
    pub fn from_write(dn: &str, err: OperationError) -> Self {
        match err {
            OperationError::Result { code, message } => match code {
                ResultCode::EntryAlreadyExists => Self::DuplicateEntry { dn: dn.to_string() },
                ResultCode::InsufficientAccessRights => Self::Access {
                    dn: dn.to_string(),
                    message,
                },
                code if code.is_schema_violation() => Self::Schema {
                    dn: dn.to_string(),
                    message,
                },
                code => Self::connection(format!("{dn}: {code}: {message}")),
            },
            OperationError::Transport { message } => Self::connection(format!("{dn}: {message}")),
        }
    }

    /// Classify a failed read.
    pub fn from_read(context: &str, err: OperationError) -> Self {
        Self::connection(format!("{context}: {err}"))
    }
}

impl From<PoolError> for PersistError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Configuration { message } => Self::Configuration { message },
            other => Self::connection(other.to_string()),
        }
    }
}

impl From<ModelError> for PersistError {
    fn from(err: ModelError) -> Self {
        Self::mapping(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(code: u32) -> OperationError {
        OperationError::result(ResultCode::from_code(code), "server says no")
    }

    #[test]
    fn write_error_taxonomy() {
        let dn = "uid=a,o=example";
        assert_eq!(
            PersistError::from_write(dn, result(68)),
            PersistError::DuplicateEntry { dn: dn.into() }
        );
        assert!(matches!(PersistError::from_write(dn, result(50)), PersistError::Access { .. }));
        assert!(matches!(PersistError::from_write(dn, result(65)), PersistError::Schema { .. }));
        assert!(matches!(PersistError::from_write(dn, result(21)), PersistError::Schema { .. }));
        assert!(matches!(PersistError::from_write(dn, result(53)), PersistError::Connection { .. }));
        assert!(matches!(
            PersistError::from_write(dn, OperationError::transport("reset")),
            PersistError::Connection { .. }
        ));
    }

    #[test]
    fn pool_errors_keep_configuration_class() {
        let err: PersistError = PoolError::configuration("bad host").into();
        assert_eq!(err, PersistError::configuration("bad host"));
        let err: PersistError = PoolError::Closed.into();
        assert!(matches!(err, PersistError::Connection { .. }));
    }
}
