//! Core types and traits for Dewdrop.
//!
//! This crate provides the foundations shared by the schema, field and
//! table crates:
//!
//! - `Value` and result `Row` types
//! - `Connection` trait for the host's database adapter
//! - `Dialect` for placeholder, quoting and aggregate differences
//! - `HostEnvironment` and `RequestContext` for host capabilities
//! - `Changes` for many-to-many selection diffs
//! - `Outcome` and `Cx` re-exported from asupersync

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod changes;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod host;
pub mod row;
pub mod value;

pub use changes::{Changes, ordered_difference};
pub use connection::{Connection, TransactionOps};
pub use dialect::Dialect;
pub use error::{
    ConfigError, ConnectionError, Error, FieldError, MetadataError, QueryError, QueryErrorKind,
    RelationshipError, RelationshipErrorKind, Result, RowNotFoundError, SaveError,
    TransactionError, TypeError,
};
pub use host::{
    Config, HostEnvironment, MemorySessionStore, RequestContext, SessionStore, StaticEnvironment,
    UserContext, prefixed_table_name,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
