//! # dirstore Testkit
//!
//! Simulated backends and fixtures for testing dirstore.
//!
//! This crate provides:
//! - [`MemoryDirectory`], an in-memory directory server with paging, sort,
//!   virtual list view and subtree delete controls plus fault injection
//! - [`MemoryDocumentStore`], an in-memory document store with expiry and a
//!   lagging index
//! - [`MemoryRemoteCache`], a remote cache client with server-side expiry
//! - an RFC 4515 filter parser and evaluator
//! - fixtures, pool helpers and proptest strategies
//! - [`init_test_tracing`] for log output in tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dirstore_testkit::prelude::*;
//!
//! #[test]
//! fn finds_alice() {
//!     let directory = populated_directory(three_people());
//!     let engine = directory_engine(&directory);
//!     let alice: Person = engine.find("uid=alice,ou=people,o=example").unwrap();
//!     assert_eq!(alice.uid, "alice");
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod directory;
pub mod documents;
pub mod filter;
pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod remote_cache;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::directory::*;
    pub use crate::documents::*;
    pub use crate::filter::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::remote_cache::*;
}

pub use directory::*;
pub use documents::*;
pub use filter::*;
pub use fixtures::*;
pub use generators::*;
pub use logging::*;
pub use remote_cache::*;
