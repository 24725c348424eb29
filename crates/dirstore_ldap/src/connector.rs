//! Opening, probing and closing `ldap3` connections for the pool.

use std::path::Path;

use dirstore_core::ldap::DirectoryConnection;
use dirstore_pool::{
    ConnectError, ConnectRequest, Connector, ServerCapabilities, TlsProtocol, TransportSecurity, TrustPolicy,
};
use ldap3::{LdapConn, LdapConnSettings, LdapError};
use native_tls::{Certificate, Protocol, TlsConnector};
use tracing::{debug, trace};

use crate::connection::Ldap3Connection;

const ROOT_ATTRIBUTES: [&str; 3] = ["supportedLDAPVersion", "subschemaSubentry", "supportedControl"];
const PEM_END: &str = "-----END CERTIFICATE-----";

/// [`Connector`] for LDAP servers.
///
/// Plain transport uses `ldap://`; TLS uses `ldaps://` with the offered
/// protocol pinned to exactly the version the pool asks for.
#[derive(Debug, Clone, Default)]
pub struct Ldap3Connector {
    _private: (),
}

impl Ldap3Connector {
    /// Create a connector.
    pub fn new() -> Self {
        Self::default()
    }
}

fn native_protocol(protocol: TlsProtocol) -> Protocol {
    match protocol {
        TlsProtocol::Tls12 => Protocol::Tlsv12,
        TlsProtocol::Tls11 => Protocol::Tlsv11,
        TlsProtocol::Tls10 => Protocol::Tlsv10,
        TlsProtocol::Ssl3 => Protocol::Sslv3,
    }
}

fn store_format(path: &Path, format: Option<&str>) -> String {
    format
        .map(str::to_string)
        .or_else(|| path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase))
        .unwrap_or_else(|| "pem".to_string())
}

/// Load the CA certificates of a trust store file.
///
/// # Errors
///
/// Fails for unreadable files, unparsable certificates and key store
/// formats that carry no plain CA certificates.
pub fn load_trust_store(path: &Path, format: Option<&str>) -> Result<Vec<Certificate>, ConnectError> {
    let bytes = std::fs::read(path)
        .map_err(|err| ConnectError::other(format!("cannot read trust store {}: {err}", path.display())))?;
    let parse_error = |err: native_tls::Error| ConnectError::other(format!("bad certificate in {}: {err}", path.display()));

    match store_format(path, format).as_str() {
        "der" | "cer" => Ok(vec![Certificate::from_der(&bytes).map_err(parse_error)?]),
        "pem" | "crt" => {
            let text = String::from_utf8_lossy(&bytes);
            let certificates = text
                .split_inclusive(PEM_END)
                .filter(|block| block.contains(PEM_END))
                .map(|block| Certificate::from_pem(block.trim_start().as_bytes()).map_err(parse_error))
                .collect::<Result<Vec<_>, _>>()?;
            if certificates.is_empty() {
                return Err(ConnectError::other(format!("no certificates in {}", path.display())));
            }
            Ok(certificates)
        }
        other => Err(ConnectError::other(format!("unsupported trust store format {other}"))),
    }
}

/// TLS connector offering exactly `protocol`.
///
/// # Errors
///
/// Fails when the trust store cannot be loaded or the TLS library rejects
/// the settings.
pub fn tls_connector(protocol: TlsProtocol, trust: &TrustPolicy) -> Result<TlsConnector, ConnectError> {
    let pinned = native_protocol(protocol);
    let mut builder = TlsConnector::builder();
    builder
        .min_protocol_version(Some(pinned))
        .max_protocol_version(Some(pinned));
    match trust {
        TrustPolicy::TrustAll => {
            builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        TrustPolicy::TrustStore { path, format, .. } => {
            builder.disable_built_in_roots(true);
            for certificate in load_trust_store(path, format.as_deref())? {
                builder.add_root_certificate(certificate);
            }
        }
    }
    builder
        .build()
        .map_err(|err| ConnectError::other(format!("TLS setup failed: {err}")))
}

fn url(request: &ConnectRequest<'_>) -> String {
    let scheme = match request.security {
        TransportSecurity::Plain => "ldap",
        TransportSecurity::Tls { .. } => "ldaps",
    };
    format!("{scheme}://{}:{}", request.target.host, request.target.port)
}

/// TLS library messages that mean the peer and client share no protocol
/// version. Certificate and trust failures never match.
const VERSION_MISMATCH_MARKERS: [&str; 7] = [
    "unsupported protocol",
    "protocol version",
    "wrong version number",
    "no protocols available",
    "version too low",
    "inappropriate fallback",
    "wrong ssl version",
];

fn is_version_mismatch(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    VERSION_MISMATCH_MARKERS.iter().any(|marker| message.contains(marker))
}

fn connect_error(request: &ConnectRequest<'_>, err: LdapError) -> ConnectError {
    match (err, request.security) {
        (LdapError::NativeTLS { source }, TransportSecurity::Tls { protocol, .. }) => {
            let message = source.to_string();
            if is_version_mismatch(&message) {
                ConnectError::HandshakeRejected {
                    target: request.target.to_string(),
                    protocol: *protocol,
                    message,
                }
            } else {
                ConnectError::other(format!("TLS handshake with {} failed: {message}", request.target))
            }
        }
        (err, _) => ConnectError::unreachable(request.target, err.to_string()),
    }
}

impl Connector for Ldap3Connector {
    type Connection = Ldap3Connection;

    fn connect(&self, request: &ConnectRequest<'_>) -> Result<Ldap3Connection, ConnectError> {
        let url = url(request);
        let mut settings = LdapConnSettings::new().set_conn_timeout(request.connect_timeout);
        if let TransportSecurity::Tls { protocol, trust } = request.security {
            settings = settings.set_connector(tls_connector(*protocol, trust)?);
        }
        trace!(%url, "connecting");
        let conn = LdapConn::with_settings(settings, &url).map_err(|err| connect_error(request, err))?;
        let mut connection = Ldap3Connection::new(conn, request.target.to_string());

        if let Some(credentials) = request.credentials {
            if let Err(err) = connection.bind(credentials.dn(), credentials.secret()) {
                connection.unbind();
                return Err(match err.code() {
                    Some(dirstore_model::ResultCode::InvalidCredentials) => ConnectError::InvalidCredentials {
                        dn: credentials.dn().to_string(),
                    },
                    _ if err.is_connection_loss() => ConnectError::unreachable(request.target, err.to_string()),
                    _ => ConnectError::other(err.to_string()),
                });
            }
        }
        debug!(%url, bound = request.credentials.is_some(), "connection open");
        Ok(connection)
    }

    fn probe(&self, connection: &mut Ldap3Connection) -> Result<ServerCapabilities, ConnectError> {
        let root = connection
            .root_metadata(&ROOT_ATTRIBUTES)
            .map_err(|err| ConnectError::other(format!("root metadata search failed: {err}")))?
            .ok_or_else(|| ConnectError::other("server returned no root metadata"))?;
        let texts = |name: &str| -> Vec<String> {
            root.get(name)
                .map(|a| a.values.iter().map(|v| v.to_text().into_owned()).collect())
                .unwrap_or_default()
        };
        let subschema = texts("subschemaSubentry").into_iter().next();
        Ok(ServerCapabilities::from_root_metadata(
            &texts("supportedLDAPVersion"),
            subschema.as_deref(),
            texts("supportedControl"),
        ))
    }

    fn is_usable(&self, connection: &Ldap3Connection) -> bool {
        !connection.is_broken()
    }

    fn disconnect(&self, connection: Ldap3Connection) {
        debug!(host = connection.target(), "disconnecting");
        connection.unbind();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use dirstore_pool::{BindCredentials, HostPort};

    use super::*;

    fn request<'a>(target: &'a HostPort, security: &'a TransportSecurity) -> ConnectRequest<'a> {
        ConnectRequest {
            target,
            security,
            credentials: None,
            connect_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn url_follows_transport() {
        let target = HostPort::new("ldap.example.org", 1636);
        let tls = TransportSecurity::Tls {
            protocol: TlsProtocol::Tls12,
            trust: TrustPolicy::TrustAll,
        };
        assert_eq!(url(&request(&target, &tls)), "ldaps://ldap.example.org:1636");
        assert_eq!(url(&request(&target, &TransportSecurity::Plain)), "ldap://ldap.example.org:1636");
    }

    #[test]
    fn protocols_are_pinned_one_to_one() {
        let mapped: Vec<Protocol> = TlsProtocol::PREFERENCE.iter().map(|p| native_protocol(*p)).collect();
        assert!(matches!(
            mapped.as_slice(),
            [Protocol::Tlsv12, Protocol::Tlsv11, Protocol::Tlsv10, Protocol::Sslv3]
        ));
    }

    #[test]
    fn trust_store_format_from_extension() {
        assert_eq!(store_format(Path::new("/etc/ca.DER"), None), "der");
        assert_eq!(store_format(Path::new("/etc/ca"), None), "pem");
        assert_eq!(store_format(Path::new("/etc/ca.pem"), Some("der")), "der");
    }

    #[test]
    fn missing_and_unsupported_trust_stores_fail() {
        let missing = load_trust_store(Path::new("/nonexistent/ca.pem"), None).err().unwrap();
        assert!(missing.to_string().contains("cannot read trust store"), "{missing}");

        let mut store = tempfile::Builder::new().suffix(".p12").tempfile().unwrap();
        store.write_all(b"not a key store").unwrap();
        let err = load_trust_store(store.path(), None).err().unwrap();
        assert!(err.to_string().contains("unsupported trust store format p12"), "{err}");
    }

    #[test]
    fn pem_without_certificates_fails() {
        let mut store = tempfile::Builder::new().suffix(".pem").tempfile().unwrap();
        store.write_all(b"# empty bundle\n").unwrap();
        let err = load_trust_store(store.path(), None).err().unwrap();
        assert!(err.to_string().contains("no certificates"), "{err}");
    }

    #[test]
    fn only_version_mismatches_downgrade() {
        let target = HostPort::new("ldap.example.org", 636);
        let tls = TransportSecurity::Tls {
            protocol: TlsProtocol::Tls12,
            trust: TrustPolicy::TrustAll,
        };
        let attempt = request(&target, &tls);

        let bad_certificate = Certificate::from_der(b"not a certificate").err().unwrap();
        let err = connect_error(&attempt, LdapError::NativeTLS { source: bad_certificate });
        assert!(matches!(err, ConnectError::Other { .. }), "{err}");

        assert!(is_version_mismatch("error:1425F102:SSL routines:ssl_choose_client_version:unsupported protocol"));
        assert!(is_version_mismatch("tlsv1 alert protocol version"));
        assert!(is_version_mismatch("SSL routines:ssl3_get_record:wrong version number"));
        assert!(!is_version_mismatch("certificate verify failed: unable to get local issuer certificate"));
        assert!(!is_version_mismatch("hostname mismatch"));
    }

    #[test]
    fn transport_failures_are_unreachable() {
        let target = HostPort::new("ldap.example.org", 636);
        let tls = TransportSecurity::Tls {
            protocol: TlsProtocol::Tls12,
            trust: TrustPolicy::TrustAll,
        };
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = connect_error(&request(&target, &tls), LdapError::from(io));
        assert!(matches!(err, ConnectError::Unreachable { .. }), "{err}");
    }

    #[test]
    fn unreachable_hosts_allow_failover() {
        let target = HostPort::new("127.0.0.1", 1);
        let credentials = BindCredentials::new("cn=admin,o=example", "secret");
        let mut attempt = request(&target, &TransportSecurity::Plain);
        attempt.credentials = Some(&credentials);
        let err = Ldap3Connector::new().connect(&attempt).unwrap_err();
        assert!(err.allows_failover(), "{err}");
        assert!(matches!(err, ConnectError::Unreachable { .. }), "{err}");
    }
}
