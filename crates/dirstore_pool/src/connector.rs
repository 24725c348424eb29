//! Backend adapter seam.

use std::fmt;
use std::time::Duration;

use crate::capabilities::ServerCapabilities;
use crate::config::HostPort;
use crate::error::ConnectError;
use crate::tls::TransportSecurity;

/// A bind DN and its secret.
#[derive(Clone, PartialEq, Eq)]
pub struct BindCredentials {
    dn: String,
    secret: String,
}

impl BindCredentials {
    /// Create credentials.
    pub fn new(dn: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            secret: secret.into(),
        }
    }

    /// The bind DN.
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// The secret.
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for BindCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindCredentials")
            .field("dn", &self.dn)
            .field("secret", &"***")
            .finish()
    }
}

/// Everything a connector needs for one connection attempt.
#[derive(Debug, Clone, Copy)]
pub struct ConnectRequest<'a> {
    /// Host to connect to.
    pub target: &'a HostPort,
    /// Transport security to use.
    pub security: &'a TransportSecurity,
    /// Credentials to bind with after connecting, if any.
    pub credentials: Option<&'a BindCredentials>,
    /// Timeout for the attempt.
    pub connect_timeout: Duration,
}

/// Opens connections to one kind of backend.
///
/// Connectors are the only place that talks to a wire client. The pool calls
/// them for every new connection and never interprets what they return.
///
/// # Invariants
///
/// - `connect` either returns a connection that is bound (when credentials
///   are given) or an error; it never returns half-open connections
/// - a TLS handshake refused because of the offered protocol version must be
///   reported as [`ConnectError::HandshakeRejected`], any other connect failure
///   as [`ConnectError::Unreachable`] or [`ConnectError::Other`]
pub trait Connector: Send + Sync + 'static {
    /// Connection handle produced by this connector.
    type Connection: Send + 'static;

    /// Open and bind a connection to a single host.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectError`] classified as described on the trait.
    fn connect(&self, request: &ConnectRequest<'_>) -> Result<Self::Connection, ConnectError>;

    /// Read the server's root metadata.
    ///
    /// # Errors
    ///
    /// Any error; the pool logs it and keeps the conservative defaults.
    fn probe(&self, connection: &mut Self::Connection) -> Result<ServerCapabilities, ConnectError> {
        let _ = connection;
        Ok(ServerCapabilities::default())
    }

    /// Cheap liveness check before an idle connection is handed out.
    fn is_usable(&self, connection: &Self::Connection) -> bool {
        let _ = connection;
        true
    }

    /// Close a connection that leaves the pool.
    fn disconnect(&self, connection: Self::Connection) {
        drop(connection);
    }
}
