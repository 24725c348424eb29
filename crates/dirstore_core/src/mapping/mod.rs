//! Typed records and their storage layout.
//!
//! Record types implement [`DataEntry`] by registering an [`EntrySchema`]
//! with a builder. [`AttributeMapper`] uses the schema to convert records
//! to entries, back again, and to compute the modifications of a merge.

mod convert;
mod mapper;
mod schema;

pub use convert::AttributeType;
pub use mapper::{AttributeMapper, MappingProfile};
pub use schema::{DataEntry, EntrySchema, EntrySchemaBuilder, FieldBinding, FieldRole};
