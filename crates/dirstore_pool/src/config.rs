//! Pool configuration.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::connector::BindCredentials;
use crate::error::{PoolError, PoolResult};
use crate::tls::TrustPolicy;

/// A `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostPort {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl HostPort {
    /// Create a host/port pair.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for HostPort {
    type Err = PoolError;

    /// Parse `host:port` or `[v6addr]:port`.
    fn from_str(s: &str) -> PoolResult<Self> {
        let s = s.trim();
        let malformed = || PoolError::configuration(format!("malformed server entry '{s}'"));

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(malformed)?;
            (host, tail.strip_prefix(':').ok_or_else(malformed)?)
        } else {
            s.rsplit_once(':').ok_or_else(malformed)?
        };

        let host = host.trim();
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(malformed());
        }
        let port = port.trim().parse::<u16>().map_err(|_| malformed())?;
        if port == 0 {
            return Err(malformed());
        }
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parse a comma separated server list, keeping declared order.
pub fn parse_hosts(servers: &str) -> PoolResult<Vec<HostPort>> {
    let hosts = servers
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(HostPort::from_str)
        .collect::<PoolResult<Vec<_>>>()?;
    if hosts.is_empty() {
        return Err(PoolError::configuration("no servers configured"));
    }
    Ok(hosts)
}

/// Configuration for one logical backend.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Servers in failover priority order.
    pub hosts: Vec<HostPort>,
    /// Service bind DN.
    pub bind_dn: Option<String>,
    /// Service bind secret.
    pub bind_secret: Option<String>,
    /// Open connections over TLS.
    pub use_tls: bool,
    /// Certificate trust policy for TLS.
    pub trust_policy: TrustPolicy,
    /// Upper bound on live connections.
    pub max_connections: usize,
    /// Timeout for a single connect attempt.
    pub connect_timeout: Duration,
    /// How long `acquire` blocks, and how long creation keeps retrying.
    pub pool_acquire_timeout: Duration,
    /// Sleep between creation attempts while no server is reachable.
    pub creation_retry_interval: Duration,
}

impl PoolConfig {
    /// Create a configuration for the given hosts with default sizing.
    pub fn new(hosts: Vec<HostPort>) -> Self {
        Self {
            hosts,
            bind_dn: None,
            bind_secret: None,
            use_tls: false,
            trust_policy: TrustPolicy::TrustAll,
            max_connections: 10,
            connect_timeout: Duration::from_secs(30),
            pool_acquire_timeout: Duration::from_secs(30),
            creation_retry_interval: Duration::from_secs(5),
        }
    }

    /// Sets the service credentials.
    pub fn with_credentials(mut self, bind_dn: impl Into<String>, secret: impl Into<String>) -> Self {
        self.bind_dn = Some(bind_dn.into());
        self.bind_secret = Some(secret.into());
        self
    }

    /// Enables TLS with the given trust policy.
    pub fn with_tls(mut self, trust_policy: TrustPolicy) -> Self {
        self.use_tls = true;
        self.trust_policy = trust_policy;
        self
    }

    /// Sets the maximum number of live connections.
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the acquire timeout.
    pub fn with_pool_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.pool_acquire_timeout = timeout;
        self
    }

    /// Sets the creation retry interval.
    pub fn with_creation_retry_interval(mut self, interval: Duration) -> Self {
        self.creation_retry_interval = interval;
        self
    }

    /// Service credentials, when both DN and secret are set.
    pub fn credentials(&self) -> Option<BindCredentials> {
        match (&self.bind_dn, &self.bind_secret) {
            (Some(dn), Some(secret)) if !dn.is_empty() => {
                Some(BindCredentials::new(dn.clone(), secret.clone()))
            }
            _ => None,
        }
    }

    /// Check the configuration before any connection is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Configuration`] if no hosts are configured, the
    /// pool size is zero, the bind DN has no secret, or a configured trust
    /// store does not exist.
    pub fn validate(&self) -> PoolResult<()> {
        if self.hosts.is_empty() {
            return Err(PoolError::configuration("no servers configured"));
        }
        if self.max_connections == 0 {
            return Err(PoolError::configuration("maxconnections must be at least 1"));
        }
        if self.bind_dn.as_deref().is_some_and(|dn| !dn.is_empty()) && self.bind_secret.is_none() {
            return Err(PoolError::configuration("bindDN is set without bindPassword"));
        }
        if let (true, TrustPolicy::TrustStore { path, .. }) = (self.use_tls, &self.trust_policy) {
            if !path.is_file() {
                return Err(PoolError::configuration(format!(
                    "trust store {} does not exist",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Build from backend property file entries.
    ///
    /// Understands `servers`, `bindDN`, `bindPassword`, `useSSL`,
    /// `ssl.trustStoreFile`, `ssl.trustStorePin`, `ssl.trustStoreFormat`,
    /// `maxconnections`, `connection.connect-timeout` (ms),
    /// `connection-pool-max-wait-time` (ms, falls back to
    /// `connection-max-wait-time`) and `connection.creation-retry-interval` (ms).
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Configuration`] for a missing server list or
    /// malformed numbers.
    pub fn from_properties(properties: &HashMap<String, String>) -> PoolResult<Self> {
        Self::from_prefixed_properties(properties, "")
    }

    /// Build the dedicated bind pool configuration from `bindConnection.*`
    /// properties, if a bind server list is present. Missing bind keys
    /// inherit the TLS settings of the main configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Configuration`] for malformed values.
    pub fn bind_pool_from_properties(properties: &HashMap<String, String>) -> PoolResult<Option<Self>> {
        const PREFIX: &str = "bindConnection.";
        if !properties.contains_key(&format!("{PREFIX}servers")) {
            return Ok(None);
        }
        let mut merged = properties.clone();
        for key in ["useSSL", "ssl.trustStoreFile", "ssl.trustStorePin", "ssl.trustStoreFormat"] {
            let prefixed = format!("{PREFIX}{key}");
            if !merged.contains_key(&prefixed) {
                if let Some(value) = properties.get(key) {
                    merged.insert(prefixed, value.clone());
                }
            }
        }
        let mut config = Self::from_prefixed_properties(&merged, PREFIX)?;
        // The bind pool authenticates end users; it never binds as the service.
        config.bind_dn = None;
        config.bind_secret = None;
        Ok(Some(config))
    }

    fn from_prefixed_properties(properties: &HashMap<String, String>, prefix: &str) -> PoolResult<Self> {
        let get = |key: &str| {
            properties
                .get(&format!("{prefix}{key}"))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };
        let millis = |key: &str| -> PoolResult<Option<Duration>> {
            get(key)
                .map(|v| {
                    v.parse::<u64>()
                        .map(Duration::from_millis)
                        .map_err(|_| PoolError::configuration(format!("{prefix}{key} is not a number: '{v}'")))
                })
                .transpose()
        };

        let servers = get("servers")
            .ok_or_else(|| PoolError::configuration(format!("{prefix}servers is not set")))?;
        let mut config = Self::new(parse_hosts(servers)?);

        config.bind_dn = get("bindDN").map(str::to_string);
        config.bind_secret = get("bindPassword").map(str::to_string);
        config.use_tls = get("useSSL").is_some_and(|v| v.eq_ignore_ascii_case("true"));
        config.trust_policy = TrustPolicy::from_store(
            get("ssl.trustStoreFile"),
            get("ssl.trustStorePin"),
            get("ssl.trustStoreFormat"),
        );

        if let Some(max) = get("maxconnections") {
            config.max_connections = max.parse().map_err(|_| {
                PoolError::configuration(format!("{prefix}maxconnections is not a number: '{max}'"))
            })?;
        }
        if let Some(timeout) = millis("connection.connect-timeout")? {
            config.connect_timeout = timeout;
        }
        if let Some(timeout) = millis("connection-pool-max-wait-time")?
            .or(millis("connection-max-wait-time")?)
        {
            config.pool_acquire_timeout = timeout;
        }
        if let Some(interval) = millis("connection.creation-retry-interval")? {
            config.creation_retry_interval = interval;
        }
        Ok(config)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parse_host_port() {
        assert_eq!("ldap1:1636".parse::<HostPort>().unwrap(), HostPort::new("ldap1", 1636));
        assert_eq!("[::1]:389".parse::<HostPort>().unwrap(), HostPort::new("::1", 389));
        assert_eq!(HostPort::new("::1", 389).to_string(), "[::1]:389");
    }

    #[test]
    fn malformed_hosts_are_configuration_errors() {
        for bad in ["ldap1", "ldap1:", ":389", "ldap1:notaport", "ldap1:0", "ldap 1:389", "[::1]389"] {
            assert!(
                matches!(bad.parse::<HostPort>(), Err(PoolError::Configuration { .. })),
                "{bad} should be rejected"
            );
        }
        assert!(parse_hosts(" , ").is_err());
    }

    #[test]
    fn host_order_is_preserved() {
        let hosts = parse_hosts("b:1, a:2 ,c:3").unwrap();
        let names: Vec<_> = hosts.iter().map(|h| h.host.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn from_properties() {
        let config = PoolConfig::from_properties(&props(&[
            ("servers", "ldap1:1636,ldap2:1636"),
            ("bindDN", "cn=directory manager"),
            ("bindPassword", "secret"),
            ("useSSL", "true"),
            ("maxconnections", "4"),
            ("connection-max-wait-time", "2500"),
        ]))
        .unwrap();
        assert_eq!(config.hosts.len(), 2);
        assert!(config.use_tls);
        assert_eq!(config.trust_policy, TrustPolicy::TrustAll);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.pool_acquire_timeout, Duration::from_millis(2500));
        assert_eq!(config.credentials().unwrap().dn(), "cn=directory manager");
    }

    #[test]
    fn from_properties_rejects_bad_numbers() {
        let err = PoolConfig::from_properties(&props(&[("servers", "a:1"), ("maxconnections", "lots")]))
            .unwrap_err();
        assert!(matches!(err, PoolError::Configuration { .. }));
        assert!(PoolConfig::from_properties(&props(&[])).is_err());
    }

    #[test]
    fn bind_pool_properties() {
        let base = props(&[("servers", "a:1"), ("useSSL", "true")]);
        assert!(PoolConfig::bind_pool_from_properties(&base).unwrap().is_none());

        let mut with_bind = base.clone();
        with_bind.insert("bindConnection.servers".into(), "b:2".into());
        with_bind.insert("bindConnection.maxconnections".into(), "2".into());
        with_bind.insert("bindDN".into(), "cn=admin".into());
        let bind = PoolConfig::bind_pool_from_properties(&with_bind).unwrap().unwrap();
        assert_eq!(bind.hosts, vec![HostPort::new("b", 2)]);
        assert_eq!(bind.max_connections, 2);
        assert!(bind.use_tls);
        assert!(bind.credentials().is_none());
    }

    #[test]
    fn validation() {
        assert!(PoolConfig::default().validate().is_err());

        let hosts = vec![HostPort::new("a", 1)];
        assert!(PoolConfig::new(hosts.clone()).validate().is_ok());
        assert!(PoolConfig::new(hosts.clone()).with_max_connections(0).validate().is_err());

        let mut half = PoolConfig::new(hosts.clone());
        half.bind_dn = Some("cn=admin".into());
        assert!(half.validate().is_err());

        let missing = PoolConfig::new(hosts.clone())
            .with_tls(TrustPolicy::from_store(Some("/nonexistent/ca.pem"), None, None));
        assert!(missing.validate().is_err());

        let store = tempfile::NamedTempFile::new().unwrap();
        let present = PoolConfig::new(hosts)
            .with_tls(TrustPolicy::from_store(store.path().to_str(), None, None));
        assert!(present.validate().is_ok());
    }
}
