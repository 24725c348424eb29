//! # dirstore model
//!
//! Backend-neutral types shared by the connection pool, the persistence
//! engines and the cache providers.
//!
//! An [`Entry`] is a distinguished name plus an ordered list of
//! [`Attribute`]s. Attribute names are matched case-insensitively on lookup
//! but keep the case they were written with.
//!
//! ```
//! use dirstore_model::{Entry, Filter};
//!
//! let mut entry = Entry::new("uid=alice,ou=people,o=example");
//! entry.set_text("UID", "alice");
//! assert_eq!(entry.first_text("uid").as_deref(), Some("alice"));
//!
//! let filter = Filter::and(vec![
//!     Filter::equality("objectClass", "person"),
//!     Filter::equality("uid", "alice"),
//! ]);
//! assert_eq!(filter.attributes(), vec!["objectClass", "uid"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod dn;
mod entry;
mod error;
mod filter;
mod modification;
mod result_code;
mod search;
pub mod time;
mod value;

pub use entry::{Entry, OBJECT_CLASS};
pub use error::{ModelError, ModelResult};
pub use filter::Filter;
pub use modification::{Modification, ModificationKind};
pub use result_code::ResultCode;
pub use search::{PagedResult, SearchRequest, SearchScope, SortOrder, DEFAULT_PAGE_SIZE};
pub use value::{Attribute, Value};
