//! Transport security settings.

use std::fmt;
use std::path::PathBuf;

/// TLS protocol versions, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TlsProtocol {
    /// TLS 1.2.
    Tls12,
    /// TLS 1.1.
    Tls11,
    /// TLS 1.0.
    Tls10,
    /// SSL 3.0.
    Ssl3,
}

impl TlsProtocol {
    /// Negotiation order: each rejected handshake falls back to the next entry.
    pub const PREFERENCE: [TlsProtocol; 4] = [
        TlsProtocol::Tls12,
        TlsProtocol::Tls11,
        TlsProtocol::Tls10,
        TlsProtocol::Ssl3,
    ];

    /// Conventional protocol name.
    pub fn name(self) -> &'static str {
        match self {
            TlsProtocol::Tls12 => "TLSv1.2",
            TlsProtocol::Tls11 => "TLSv1.1",
            TlsProtocol::Tls10 => "TLSv1",
            TlsProtocol::Ssl3 => "SSLv3",
        }
    }
}

impl fmt::Display for TlsProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which server certificates are accepted.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum TrustPolicy {
    /// Accept any certificate.
    #[default]
    TrustAll,
    /// Accept certificates issued by the CAs in a trust store file.
    TrustStore {
        /// Path to the trust store.
        path: PathBuf,
        /// Trust store password, if any.
        pin: Option<String>,
        /// Store format (`pem`, `der`, `pkcs12`); inferred from the extension when absent.
        format: Option<String>,
    },
}

impl TrustPolicy {
    /// Trust-all unless a trust store file is configured.
    pub fn from_store(path: Option<&str>, pin: Option<&str>, format: Option<&str>) -> Self {
        match path.map(str::trim).filter(|p| !p.is_empty()) {
            Some(path) => TrustPolicy::TrustStore {
                path: PathBuf::from(path),
                pin: pin.map(str::to_string),
                format: format.map(str::to_ascii_lowercase),
            },
            None => TrustPolicy::TrustAll,
        }
    }
}

impl fmt::Debug for TrustPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustPolicy::TrustAll => f.write_str("TrustAll"),
            TrustPolicy::TrustStore { path, format, .. } => f
                .debug_struct("TrustStore")
                .field("path", path)
                .field("format", format)
                .finish_non_exhaustive(),
        }
    }
}

/// Transport a connection is opened with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransportSecurity {
    /// Clear text.
    #[default]
    Plain,
    /// TLS pinned to one protocol version.
    Tls {
        /// Protocol version to offer.
        protocol: TlsProtocol,
        /// Certificate trust policy.
        trust: TrustPolicy,
    },
}

impl TransportSecurity {
    /// Protocol in use, if TLS.
    pub fn protocol(&self) -> Option<TlsProtocol> {
        match self {
            TransportSecurity::Plain => None,
            TransportSecurity::Tls { protocol, .. } => Some(*protocol),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_is_newest_first() {
        let names: Vec<_> = TlsProtocol::PREFERENCE.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["TLSv1.2", "TLSv1.1", "TLSv1", "SSLv3"]);
    }

    #[test]
    fn trust_policy_selection() {
        assert_eq!(TrustPolicy::from_store(None, None, None), TrustPolicy::TrustAll);
        assert_eq!(TrustPolicy::from_store(Some("  "), None, None), TrustPolicy::TrustAll);
        match TrustPolicy::from_store(Some("/etc/certs/ca.pem"), Some("secret"), Some("PEM")) {
            TrustPolicy::TrustStore { path, pin, format } => {
                assert_eq!(path, PathBuf::from("/etc/certs/ca.pem"));
                assert_eq!(pin.as_deref(), Some("secret"));
                assert_eq!(format.as_deref(), Some("pem"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn debug_hides_pin() {
        let policy = TrustPolicy::from_store(Some("/ca.p12"), Some("hunter2"), None);
        assert!(!format!("{policy:?}").contains("hunter2"));
    }
}
