//! # dirstore ldap
//!
//! Directory adapter for [`dirstore_core`] over the synchronous `ldap3`
//! client.
//!
//! [`Ldap3Connector`] plugs into the connection pool; the connections it
//! opens implement [`dirstore_core::DirectoryConnection`], so the directory
//! engine can be built directly from properties:
//!
//! ```ignore
//! use dirstore_core::LdapEntryManager;
//! use dirstore_ldap::Ldap3Connector;
//!
//! let engine = LdapEntryManager::from_properties(Ldap3Connector::new(), &properties)?;
//! ```
//!
//! Paged results, server-side sort and virtual list view are sent as raw
//! BER-encoded controls; subtree deletes use the tree delete control.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod connector;
pub mod controls;
mod convert;

pub use connection::Ldap3Connection;
pub use connector::{load_trust_store, tls_connector, Ldap3Connector};

use dirstore_core::LdapEntryManager;

/// Directory engine over `ldap3` connections.
pub type Ldap3EntryManager = LdapEntryManager<Ldap3Connector>;
