//! Error types for pool operations.

use std::time::Duration;

use thiserror::Error;

use crate::TlsProtocol;

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors surfaced by the connection pool.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The pool configuration is unusable. Not retried.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// A connection could not be established or bound.
    #[error("connection error: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
    },

    /// No connection became available in time.
    #[error("no pooled connection available after {waited:?}")]
    AcquireTimeout {
        /// How long the caller waited.
        waited: Duration,
    },

    /// The pool has been closed.
    #[error("connection pool is closed")]
    Closed,
}

impl PoolError {
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
}

/// Failure reported by a [`crate::Connector`] for a single connection attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// The host did not accept a connection.
    #[error("{target} is unreachable: {message}")]
    Unreachable {
        /// The host that was tried.
        target: String,
        /// Transport detail.
        message: String,
    },

    /// The server refused the TLS protocol version during the handshake.
    #[error("{target} rejected the {protocol} handshake: {message}")]
    HandshakeRejected {
        /// The host that was tried.
        target: String,
        /// The protocol version offered.
        protocol: TlsProtocol,
        /// Handshake detail.
        message: String,
    },

    /// The service bind was refused.
    #[error("bind rejected for {dn}")]
    InvalidCredentials {
        /// The bind DN.
        dn: String,
    },

    /// Any other failure.
    #[error("{message}")]
    Other {
        /// Description of the failure.
        message: String,
    },
}

impl ConnectError {
    /// Create an unreachable error.
    pub fn unreachable(target: impl ToString, message: impl Into<String>) -> Self {
        Self::Unreachable {
            target: target.to_string(),
            message: message.into(),
        }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Returns true if trying the next host may succeed.
    pub fn allows_failover(&self) -> bool {
        matches!(
            self,
            Self::Unreachable { .. } | Self::HandshakeRejected { .. } | Self::Other { .. }
        )
    }
}

impl From<ConnectError> for PoolError {
    fn from(err: ConnectError) -> Self {
        PoolError::connection(err.to_string())
    }
}
