//! # dirstore core
//!
//! Backend-agnostic entry persistence: typed records are mapped to
//! entries, filters are translated per backend, and searches are paged
//! with resume cookies, offset windows or local slicing.
//!
//! The [`PersistenceEngine`] trait is implemented by:
//!
//! - [`LdapEntryManager`] - hierarchical directories reached through a
//!   [`DirectoryConnection`] adapter
//! - [`DocumentEntryManager`] - flat JSON document stores reached through
//!   a [`DocumentConnection`] adapter
//! - [`HybridPersistenceEngine`] - routes each DN branch to one of the
//!   above
//!
//! Typed access goes through [`EntryManager`], implemented for every
//! engine:
//!
//! ```ignore
//! use dirstore_core::EntryManager;
//!
//! engine.persist(&person)?;
//! let found: Vec<Person> = engine.find_entries("ou=people,o=example", None, SearchScope::Subtree, 0)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
pub mod batch;
mod config;
pub mod document;
mod engine;
mod error;
pub mod filter;
pub mod hints;
mod hybrid;
pub mod ldap;
pub mod mapping;
mod notify;
mod password;

pub use backend::{OperationError, OperationResult};
pub use batch::{BatchCursor, ScanOutcome};
pub use config::{strip_binary_option, EngineConfig, DEFAULT_PASSWORD_ATTRIBUTES};
pub use document::{DocumentConnection, DocumentEntryManager};
pub use engine::{EntryManager, PersistenceEngine};
pub use error::{PersistError, PersistResult};
pub use filter::{DocumentFilterTranslator, FilterTranslator, LdapFilterTranslator, Translated};
pub use hints::{AttributeHint, AttributeHints, AttributeSyntax, AttributeTypeCache, AttributeTypes, SchemaHints};
pub use hybrid::HybridPersistenceEngine;
pub use ldap::{DirectoryConnection, LdapEntryManager, OperationsFacade};
pub use mapping::{AttributeMapper, AttributeType, DataEntry, EntrySchema, FieldRole, MappingProfile};
pub use notify::{DeleteNotifier, DeleteNotifiers};
pub use password::PasswordEncoding;
