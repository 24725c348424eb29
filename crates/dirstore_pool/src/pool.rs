//! The connection pool.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace, warn};

use crate::capabilities::ServerCapabilities;
use crate::config::PoolConfig;
use crate::connector::{BindCredentials, ConnectRequest, Connector};
use crate::error::{ConnectError, PoolError, PoolResult};
use crate::tls::{TlsProtocol, TransportSecurity};

/// Identity of a pooled connection, unique for the lifetime of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatistics {
    /// Connections currently open, idle or checked out.
    pub live: usize,
    /// Connections waiting in the pool.
    pub idle: usize,
    /// Configured upper bound.
    pub max: usize,
}

struct Slot<C> {
    id: ConnectionId,
    connection: C,
}

struct PoolState<C> {
    idle: VecDeque<Slot<C>>,
    live: usize,
    closed: bool,
}

struct PoolInner<K: Connector> {
    connector: K,
    config: PoolConfig,
    credentials: Option<BindCredentials>,
    security: TransportSecurity,
    capabilities: ServerCapabilities,
    state: Mutex<PoolState<K::Connection>>,
    available: Condvar,
    next_id: AtomicU64,
}

enum CreateFailure {
    NoServerReachable(ConnectError),
    Fatal(PoolError),
}

/// A bounded pool of connections to one logical backend.
///
/// Cloning is cheap; clones share the same connections.
pub struct ConnectionPool<K: Connector> {
    inner: Arc<PoolInner<K>>,
}

impl<K: Connector> Clone for ConnectionPool<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Connector> fmt::Debug for ConnectionPool<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("hosts", &self.inner.config.hosts)
            .field("security", &self.inner.security)
            .field("statistics", &self.statistics())
            .finish()
    }
}

impl<K: Connector> ConnectionPool<K> {
    /// Create a pool and open its first connection.
    ///
    /// With TLS enabled, protocols are offered newest first and a protocol is
    /// abandoned only when the server rejects its handshake. While no server
    /// is reachable, creation sleeps `creation_retry_interval` and tries
    /// again until `pool_acquire_timeout` has elapsed. Once connected, the
    /// server's root metadata is probed if service credentials are set.
    ///
    /// # Errors
    ///
    /// - [`PoolError::Configuration`] for invalid configuration or when every
    ///   TLS protocol was rejected
    /// - [`PoolError::Connection`] when the retry window elapsed or a
    ///   non-retryable connect error occurred
    pub fn create(connector: K, config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        let credentials = config.credentials();
        let started = Instant::now();
        let deadline = started + config.pool_acquire_timeout;
        let mut attempt: u32 = 0;

        let (security, mut first) = loop {
            attempt += 1;
            match negotiate(&connector, &config, credentials.as_ref()) {
                Ok(established) => break established,
                Err(CreateFailure::Fatal(err)) => return Err(err),
                Err(CreateFailure::NoServerReachable(err)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(attempt, error = %err, "giving up on connection pool creation");
                        return Err(err.into());
                    }
                    let pause = config.creation_retry_interval.min(deadline - now);
                    warn!(attempt, error = %err, ?pause, "no server reachable, retrying pool creation");
                    thread::sleep(pause);
                }
            }
        };

        let capabilities = if credentials.is_some() {
            connector.probe(&mut first).unwrap_or_else(|err| {
                warn!(error = %err, "root metadata probe failed, using defaults");
                ServerCapabilities::default()
            })
        } else {
            ServerCapabilities::default()
        };

        info!(
            hosts = config.hosts.len(),
            max_connections = config.max_connections,
            protocol = ?security.protocol(),
            elapsed = ?started.elapsed(),
            "connection pool created"
        );

        let mut idle = VecDeque::with_capacity(config.max_connections);
        idle.push_back(Slot {
            id: ConnectionId(1),
            connection: first,
        });

        Ok(Self {
            inner: Arc::new(PoolInner {
                connector,
                config,
                credentials,
                security,
                capabilities,
                state: Mutex::new(PoolState {
                    idle,
                    live: 1,
                    closed: false,
                }),
                available: Condvar::new(),
                next_id: AtomicU64::new(2),
            }),
        })
    }

    /// Take a connection, opening a new one if the pool is below its bound.
    ///
    /// Blocks up to `pool_acquire_timeout` when every connection is in use.
    ///
    /// # Errors
    ///
    /// - [`PoolError::AcquireTimeout`] if none became available in time
    /// - [`PoolError::Connection`] if a new connection could not be opened
    /// - [`PoolError::Closed`] after [`ConnectionPool::close`]
    pub fn acquire(&self) -> PoolResult<PooledConnection<K>> {
        let inner = &self.inner;
        let started = Instant::now();
        let deadline = started + inner.config.pool_acquire_timeout;
        let mut state = inner.state.lock();

        loop {
            if state.closed {
                return Err(PoolError::Closed);
            }

            if let Some(slot) = state.idle.pop_front() {
                if inner.connector.is_usable(&slot.connection) {
                    trace!(id = %slot.id, "reusing pooled connection");
                    return Ok(self.lease(slot));
                }
                debug!(id = %slot.id, "discarding unusable idle connection");
                state.live -= 1;
                inner.connector.disconnect(slot.connection);
                continue;
            }

            if state.live < inner.config.max_connections {
                state.live += 1;
                drop(state);
                return match inner.open() {
                    Ok(connection) => {
                        let id = ConnectionId(inner.next_id.fetch_add(1, Ordering::Relaxed));
                        debug!(%id, "opened pooled connection");
                        Ok(self.lease(Slot { id, connection }))
                    }
                    Err(err) => {
                        inner.forget_one();
                        Err(err.into())
                    }
                };
            }

            if inner.available.wait_until(&mut state, deadline).timed_out() {
                return Err(PoolError::AcquireTimeout {
                    waited: started.elapsed(),
                });
            }
        }
    }

    /// Return a healthy connection to the pool.
    pub fn release(&self, connection: PooledConnection<K>) {
        drop(connection);
    }

    /// Discard a connection instead of recycling it.
    ///
    /// Use this after a transport error and after binding as an end user.
    pub fn release_defunct(&self, mut connection: PooledConnection<K>) {
        connection.mark_defunct();
        drop(connection);
    }

    /// Disconnect idle connections and reject further acquisitions.
    ///
    /// Connections still checked out are disconnected when released.
    pub fn close(&self) {
        let drained: Vec<_> = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.live -= drained.len();
            drained
        };
        for slot in drained {
            self.inner.connector.disconnect(slot.connection);
        }
        self.inner.available.notify_all();
        info!("connection pool closed");
    }

    /// Returns true once [`ConnectionPool::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Capabilities probed at creation.
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.inner.capabilities
    }

    /// Transport negotiated at creation.
    pub fn security(&self) -> &TransportSecurity {
        &self.inner.security
    }

    /// The pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// The connector backing this pool.
    pub fn connector(&self) -> &K {
        &self.inner.connector
    }

    /// Current counters.
    pub fn statistics(&self) -> PoolStatistics {
        let state = self.inner.state.lock();
        PoolStatistics {
            live: state.live,
            idle: state.idle.len(),
            max: self.inner.config.max_connections,
        }
    }

    fn lease(&self, slot: Slot<K::Connection>) -> PooledConnection<K> {
        PooledConnection {
            pool: Arc::clone(&self.inner),
            slot: Some(slot),
            defunct: false,
        }
    }
}

impl<K: Connector> PoolInner<K> {
    fn open(&self) -> Result<K::Connection, ConnectError> {
        open_with_failover(
            &self.connector,
            &self.config,
            &self.security,
            self.credentials.as_ref(),
        )
    }

    fn forget_one(&self) {
        self.state.lock().live -= 1;
        self.available.notify_one();
    }

    fn give_back(&self, slot: Slot<K::Connection>, defunct: bool) {
        let mut state = self.state.lock();
        if defunct || state.closed {
            state.live -= 1;
            drop(state);
            debug!(id = %slot.id, defunct, "disconnecting released connection");
            self.connector.disconnect(slot.connection);
        } else {
            trace!(id = %slot.id, "connection returned to pool");
            state.idle.push_back(slot);
            drop(state);
        }
        self.available.notify_one();
    }
}

/// Open one connection, trying hosts in declared order.
///
/// A handshake rejection is reported only after every host refused, so the
/// caller downgrades the protocol only when no host accepts the current one.
fn open_with_failover<K: Connector>(
    connector: &K,
    config: &PoolConfig,
    security: &TransportSecurity,
    credentials: Option<&BindCredentials>,
) -> Result<K::Connection, ConnectError> {
    let mut last_error = None;
    let mut rejected = None;

    for (index, target) in config.hosts.iter().enumerate() {
        let request = ConnectRequest {
            target,
            security,
            credentials,
            connect_timeout: config.connect_timeout,
        };
        match connector.connect(&request) {
            Ok(connection) => {
                if index > 0 {
                    info!(%target, skipped = index, "failed over to secondary server");
                }
                return Ok(connection);
            }
            Err(err @ ConnectError::HandshakeRejected { .. }) => {
                debug!(%target, error = %err, "handshake rejected, trying next server");
                rejected.get_or_insert(err);
            }
            Err(err) if err.allows_failover() => {
                debug!(%target, error = %err, "server attempt failed");
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(rejected
        .or(last_error)
        .unwrap_or_else(|| ConnectError::other("no servers configured")))
}

/// Pick the transport and open the first connection.
fn negotiate<K: Connector>(
    connector: &K,
    config: &PoolConfig,
    credentials: Option<&BindCredentials>,
) -> Result<(TransportSecurity, K::Connection), CreateFailure> {
    let classify = |err: ConnectError| match err {
        ConnectError::Unreachable { .. } => CreateFailure::NoServerReachable(err),
        other => CreateFailure::Fatal(other.into()),
    };

    if !config.use_tls {
        let security = TransportSecurity::Plain;
        let connection = open_with_failover(connector, config, &security, credentials).map_err(classify)?;
        return Ok((security, connection));
    }

    for protocol in TlsProtocol::PREFERENCE {
        let security = TransportSecurity::Tls {
            protocol,
            trust: config.trust_policy.clone(),
        };
        match open_with_failover(connector, config, &security, credentials) {
            Ok(connection) => {
                debug!(%protocol, "TLS protocol accepted");
                return Ok((security, connection));
            }
            Err(ConnectError::HandshakeRejected { target, message, .. }) => {
                warn!(%protocol, %target, %message, "TLS handshake rejected, trying older protocol");
            }
            Err(err) => return Err(classify(err)),
        }
    }

    Err(CreateFailure::Fatal(PoolError::configuration(format!(
        "no mutually supported TLS protocol (tried {})",
        TlsProtocol::PREFERENCE
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(", ")
    ))))
}

/// A connection checked out of a [`ConnectionPool`].
///
/// Dropping it returns the connection to the pool, or disconnects it if it
/// was marked defunct.
pub struct PooledConnection<K: Connector> {
    pool: Arc<PoolInner<K>>,
    slot: Option<Slot<K::Connection>>,
    defunct: bool,
}

impl<K: Connector> PooledConnection<K> {
    /// Identity of the underlying connection.
    pub fn id(&self) -> ConnectionId {
        self.slot().id
    }

    /// Ensure the connection is discarded instead of recycled.
    pub fn mark_defunct(&mut self) {
        self.defunct = true;
    }

    /// Returns true if the connection will be discarded on release.
    pub fn is_defunct(&self) -> bool {
        self.defunct
    }

    fn slot(&self) -> &Slot<K::Connection> {
        self.slot
            .as_ref()
            .expect("pooled connection is present until dropped")
    }
}

impl<K: Connector> Deref for PooledConnection<K> {
    type Target = K::Connection;

    fn deref(&self) -> &Self::Target {
        &self.slot().connection
    }
}

impl<K: Connector> DerefMut for PooledConnection<K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self
            .slot
            .as_mut()
            .expect("pooled connection is present until dropped")
            .connection
    }
}

impl<K: Connector> Drop for PooledConnection<K> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.give_back(slot, self.defunct);
        }
    }
}

impl<K: Connector> fmt::Debug for PooledConnection<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.slot.as_ref().map(|s| s.id))
            .field("defunct", &self.defunct)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostPort;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Connects to hosts named "up*", refuses everything else.
    struct FakeConnector {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    impl FakeConnector {
        fn new() -> Self {
            Self {
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            }
        }
    }

    impl Connector for FakeConnector {
        type Connection = String;

        fn connect(&self, request: &ConnectRequest<'_>) -> Result<String, ConnectError> {
            if request.target.host.starts_with("up") {
                self.opened.fetch_add(1, Ordering::SeqCst);
                Ok(request.target.to_string())
            } else {
                Err(ConnectError::unreachable(request.target, "refused"))
            }
        }

        fn disconnect(&self, _connection: String) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(hosts: &[&str]) -> PoolConfig {
        PoolConfig::new(hosts.iter().map(|h| HostPort::new(*h, 389)).collect())
            .with_max_connections(2)
            .with_pool_acquire_timeout(Duration::from_millis(50))
            .with_creation_retry_interval(Duration::from_millis(10))
    }

    #[test]
    fn acquire_prefers_declared_order() {
        let pool = ConnectionPool::create(FakeConnector::new(), config(&["down", "up1", "up2"])).unwrap();
        let conn = pool.acquire().unwrap();
        assert_eq!(conn.as_str(), "up1:389");
    }

    #[test]
    fn release_recycles_and_defunct_discards() {
        let pool = ConnectionPool::create(FakeConnector::new(), config(&["up"])).unwrap();
        let first = pool.acquire().unwrap();
        let id = first.id();
        pool.release(first);
        let again = pool.acquire().unwrap();
        assert_eq!(again.id(), id);

        pool.release_defunct(again);
        assert_eq!(pool.connector().closed.load(Ordering::SeqCst), 1);
        let fresh = pool.acquire().unwrap();
        assert_ne!(fresh.id(), id);
        assert_eq!(pool.statistics().live, 1);
    }

    #[test]
    fn acquire_times_out_at_capacity() {
        let pool = ConnectionPool::create(FakeConnector::new(), config(&["up"])).unwrap();
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert_eq!(pool.statistics().live, 2);
        assert!(matches!(pool.acquire(), Err(PoolError::AcquireTimeout { .. })));
    }

    #[test]
    fn waiting_acquirer_gets_released_connection() {
        let pool = ConnectionPool::create(
            FakeConnector::new(),
            config(&["up"]).with_pool_acquire_timeout(Duration::from_secs(5)),
        )
        .unwrap();
        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        let id = a.id();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire().map(|c| c.id()))
        };
        thread::sleep(Duration::from_millis(20));
        drop(a);
        assert_eq!(waiter.join().unwrap().unwrap(), id);
    }

    #[test]
    fn creation_gives_up_after_window() {
        let started = Instant::now();
        let err = ConnectionPool::create(FakeConnector::new(), config(&["down1", "down2"])).unwrap_err();
        assert!(matches!(err, PoolError::Connection { .. }));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn close_rejects_acquire() {
        let pool = ConnectionPool::create(FakeConnector::new(), config(&["up"])).unwrap();
        let held = pool.acquire().unwrap();
        pool.close();
        assert!(pool.is_closed());
        assert!(matches!(pool.acquire(), Err(PoolError::Closed)));
        drop(held);
        assert_eq!(pool.statistics().live, 0);
    }

    #[test]
    fn no_probe_without_credentials() {
        let pool = ConnectionPool::create(FakeConnector::new(), config(&["up"])).unwrap();
        assert_eq!(pool.capabilities(), &ServerCapabilities::default());
        assert_eq!(pool.security(), &TransportSecurity::Plain);
    }
}
