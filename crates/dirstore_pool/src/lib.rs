//! # dirstore pool
//!
//! A bounded, blocking connection pool for directory-style backends.
//!
//! The pool knows nothing about wire protocols. A backend adapter implements
//! [`Connector`] to open, probe and health-check connections; the pool adds
//! ordered host failover, TLS protocol negotiation, a bounded creation retry
//! window and defunct-connection isolation.
//!
//! ## Lifecycle
//!
//! - [`ConnectionPool::create`] negotiates transport security, opens the
//!   first connection and probes the server's root metadata
//! - [`ConnectionPool::acquire`] blocks up to the configured acquire timeout
//! - dropping a [`PooledConnection`] (or [`ConnectionPool::release`]) returns
//!   it to the pool; [`ConnectionPool::release_defunct`] discards it
//! - [`ConnectionPool::close`] disconnects idle connections and rejects new
//!   acquisitions

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod capabilities;
mod config;
mod connector;
mod error;
mod pool;
mod tls;

pub use capabilities::{
    ServerCapabilities, PAGED_RESULTS_OID, SERVER_SIDE_SORT_OID, SUBTREE_DELETE_OID,
    VIRTUAL_LIST_VIEW_OID,
};
pub use config::{parse_hosts, HostPort, PoolConfig};
pub use connector::{BindCredentials, ConnectRequest, Connector};
pub use error::{ConnectError, PoolError, PoolResult};
pub use pool::{ConnectionId, ConnectionPool, PoolStatistics, PooledConnection};
pub use tls::{TlsProtocol, TransportSecurity, TrustPolicy};
