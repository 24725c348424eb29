//! Failures reported by backend adapters.

use dirstore_model::ResultCode;
use thiserror::Error;

/// Result of a raw adapter call.
pub type OperationResult<T> = Result<T, OperationError>;

/// A raw adapter call failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OperationError {
    /// The server answered with a non-success result code.
    #[error("{code}: {message}")]
    Result {
        /// Result code.
        code: ResultCode,
        /// Diagnostic message.
        message: String,
    },

    /// The transport failed; the connection must not be reused.
    #[error("transport failure: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },
}

impl OperationError {
    /// Create a result code error.
    pub fn result(code: ResultCode, message: impl Into<String>) -> Self {
        Self::Result {
            code,
            message: message.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Result code, if the server answered.
    pub fn code(&self) -> Option<ResultCode> {
        match self {
            Self::Result { code, .. } => Some(*code),
            Self::Transport { .. } => None,
        }
    }

    /// Returns true if the entry did not exist.
    pub fn is_not_found(&self) -> bool {
        self.code() == Some(ResultCode::NoSuchObject)
    }

    /// Returns true if the connection that produced this error is unusable.
    pub fn is_connection_loss(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Result { code, .. } => code.is_connection_loss(),
        }
    }
}
