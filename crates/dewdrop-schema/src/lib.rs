//! Catalog introspection and relationship resolution for Dewdrop.
//!
//! - [`Introspector`] loads column, primary-key and foreign-key metadata
//! - [`TableMetadata`] / [`ColumnMetadata`] hold the immutable result
//! - [`MetadataCache`] shares loaded metadata for the life of the process
//! - [`resolve`] detects title columns and junction tables, and validates
//!   option-group configuration

pub mod cache;
pub mod inflect;
pub mod introspect;
pub mod metadata;
mod patterns;
pub mod resolve;

pub use cache::MetadataCache;
pub use introspect::Introspector;
pub use metadata::{ColumnMetadata, ForeignKeyReference, GenericType, ParsedSqlType, TableMetadata};
pub use resolve::{
    JunctionMapping, detect_junction_tables, detect_title_column, resolve_junction,
    validate_group_column, validate_group_keys,
};
