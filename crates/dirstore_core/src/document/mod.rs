//! Document store backend.
//!
//! Entries are stored as flat JSON documents keyed by their DN. Scope
//! selection works on keys, filters are lowered to [`DocumentExpression`]s
//! and windows use offset and limit.
//!
//! [`DocumentExpression`]: crate::filter::DocumentExpression

mod connection;
mod convert;
mod key;
mod manager;

pub use connection::{Document, DocumentConnection, DocumentMutation, DocumentQuery, ScanConsistency};
pub use convert::{DocumentCodec, DN_FIELD};
pub use key::{document_key, key_in_scope};
pub use manager::DocumentEntryManager;
