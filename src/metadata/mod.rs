#![forbid(unsafe_code)]

//! Metadata about the tables, fields and joins views may reference.

/// Snapshot cache merged from schema describers.
pub mod cache;

/// Field records and the describer collaborator.
pub mod schema;

pub use cache::{MetadataCache, MetadataSnapshot, TableEntry};
pub use schema::{
    FieldMetadata, FieldType, JoinPath, SchemaDescriber, StaticField, StaticSchema, StaticTable,
};
