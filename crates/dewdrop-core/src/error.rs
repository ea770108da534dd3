//! Error types for Dewdrop operations.
//!
//! Configuration-class errors (relationship resolution, field setup) carry a
//! structured diagnostic payload and example-based remediation text. Both are
//! part of the public contract, so callers can render them in a developer
//! error page without parsing messages.

use crate::value::Value;
use std::fmt;

/// The primary error type for all Dewdrop operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors reported by the adapter
    Connection(ConnectionError),
    /// Query execution errors reported by the adapter
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Transaction errors
    Transaction(TransactionError),
    /// Schema introspection failed (MetadataUnavailable)
    Metadata(MetadataError),
    /// Relationship resolution failed
    Relationship(RelationshipError),
    /// Requested primary key is absent
    RowNotFound(RowNotFoundError),
    /// Insert or update was rejected by the database
    SaveFailed(SaveError),
    /// Field registry misconfiguration
    Field(FieldError),
    /// Configuration errors
    Config(ConfigError),
    /// Operation was cancelled via asupersync
    Cancelled,
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub message: String,
}

/// Schema introspection failed for a table.
#[derive(Debug)]
pub struct MetadataError {
    /// Table whose metadata could not be loaded
    pub table: String,
    /// Why introspection failed
    pub reason: String,
    /// Underlying adapter error, if any
    pub source: Option<Box<Error>>,
}

/// Relationship resolution failures.
///
/// Every variant is a development-time configuration problem and carries
/// enough context to fix it.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationshipError {
    /// Zero or several junction tables could back a many-to-many alias.
    AmbiguousRelationship {
        /// Owning table
        table: String,
        /// Relationship alias declared with `has_many`
        alias: String,
        /// Junction tables that matched (empty when none did)
        candidates: Vec<String>,
    },
    /// No text column could serve as the display title.
    TitleColumnNotDetected {
        /// Table that was scanned
        table: String,
        /// Text columns considered, in ordinal order
        columns_considered: Vec<String>,
    },
    /// The option-group column is unset or not a column of the table.
    GroupColumnNotSet {
        /// Table providing the options
        table: String,
        /// Column that was requested, if any
        column: Option<String>,
        /// Columns that exist on the table
        available: Vec<String>,
    },
    /// An option row's group key was not among the fetched groups.
    GroupKeyNotPresentInResultset {
        /// Grouping column
        group_column: String,
        /// Offending group key
        group_key: Value,
        /// The offending option row as (column, value) pairs
        row: Vec<(String, Value)>,
        /// Group keys that were available
        expected_keys: Vec<Value>,
    },
}

/// Discriminant of a [`RelationshipError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipErrorKind {
    AmbiguousRelationship,
    TitleColumnNotDetected,
    GroupColumnNotSet,
    GroupKeyNotPresentInResultset,
}

impl RelationshipError {
    /// The kind of this error.
    pub const fn kind(&self) -> RelationshipErrorKind {
        match self {
            RelationshipError::AmbiguousRelationship { .. } => {
                RelationshipErrorKind::AmbiguousRelationship
            }
            RelationshipError::TitleColumnNotDetected { .. } => {
                RelationshipErrorKind::TitleColumnNotDetected
            }
            RelationshipError::GroupColumnNotSet { .. } => RelationshipErrorKind::GroupColumnNotSet,
            RelationshipError::GroupKeyNotPresentInResultset { .. } => {
                RelationshipErrorKind::GroupKeyNotPresentInResultset
            }
        }
    }

    /// Example-based guidance for fixing the configuration.
    pub fn remediation(&self) -> String {
        match self {
            RelationshipError::AmbiguousRelationship {
                table,
                alias,
                candidates,
            } => {
                if candidates.is_empty() {
                    format!(
                        "no junction table references both '{table}' and the related table; \
                         declare it explicitly, e.g. \
                         table.has_many(\"{alias}\", \"{table}_{alias}\")"
                    )
                } else {
                    format!(
                        "several junction tables match ({}); name one explicitly, e.g. \
                         table.has_many(\"{alias}\", \"{}\")",
                        candidates.join(", "),
                        candidates[0]
                    )
                }
            }
            RelationshipError::TitleColumnNotDetected {
                table,
                columns_considered,
            } => {
                let example = columns_considered
                    .first()
                    .map_or("name", String::as_str);
                format!(
                    "no title column could be detected for '{table}'; specify one explicitly, \
                     e.g. options.set_title_column(\"{example}\")"
                )
            }
            RelationshipError::GroupColumnNotSet {
                table, available, ..
            } => {
                let example = available
                    .iter()
                    .find(|c| c.ends_with("_id"))
                    .or_else(|| available.first())
                    .map_or("parent_id", String::as_str);
                format!(
                    "option groups for '{table}' need a group column on the table that references \
                     a parent table; available columns: {}; e.g. \
                     groups.set_group_column(\"{example}\")",
                    available.join(", ")
                )
            }
            RelationshipError::GroupKeyNotPresentInResultset {
                group_column,
                group_key,
                ..
            } => format!(
                "option row has {group_column} = '{}' but no such group was fetched; \
                 make sure the group query is not filtered more narrowly than the options, \
                 e.g. drop the WHERE clause on the group table",
                group_key.to_display_string()
            ),
        }
    }
}

/// Requested row is absent.
#[derive(Debug, Clone, PartialEq)]
pub struct RowNotFoundError {
    /// Table that was searched
    pub table: String,
    /// Primary key that was requested
    pub primary_key: Vec<(String, Value)>,
}

/// An insert or update was rejected.
#[derive(Debug)]
pub struct SaveError {
    /// Table being written
    pub table: String,
    /// Underlying adapter error
    pub source: Box<Error>,
}

impl SaveError {
    /// Whether the underlying failure was a constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self.source.as_ref(),
            Error::Query(QueryError {
                kind: QueryErrorKind::Constraint,
                ..
            })
        )
    }
}

/// Field registry misconfiguration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// A different field is already registered under this name.
    DuplicateField {
        /// Field name
        field: String,
        /// Model of the field already registered
        existing_model: Option<String>,
        /// Model of the field being added
        model: Option<String>,
    },
    /// Neither the field nor the helper can supply a callable.
    HelperCallableNotAvailableForField {
        /// Field name
        field: String,
        /// Helper identifier
        helper: String,
    },
    /// No field with this name is registered.
    UnknownField {
        /// Field name
        field: String,
    },
    /// The current user may not sort by this field.
    NotSortable {
        /// Field name
        field: String,
    },
}

impl FieldError {
    /// Example-based guidance for fixing the field setup.
    pub fn remediation(&self) -> String {
        match self {
            FieldError::DuplicateField { field, .. } => format!(
                "a different field named '{field}' is already registered; remove it first \
                 or give the new field a distinct name, e.g. fields.add(Field::custom(\"{field}_2\"))"
            ),
            FieldError::HelperCallableNotAvailableForField { field, helper } => format!(
                "field '{field}' has no callable for helper '{helper}' and the helper has no \
                 default for it; assign one, e.g. field.assign(\"{helper}\", callable)"
            ),
            FieldError::UnknownField { field } => {
                format!("register '{field}' before using it, e.g. fields.add_custom(\"{field}\")")
            }
            FieldError::NotSortable { field } => format!(
                "'{field}' is not sortable for this user; sort by one of \
                 fields.sortable_fields(user), or grant it, \
                 e.g. field.set_sortable(Permission::Everyone)"
            ),
        }
    }
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl Error {
    /// Errors a caller may handle at runtime (not-found responses, re-prompting the user).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::RowNotFound(_) | Error::SaveFailed(_))
    }

    /// Get SQLSTATE if available (e.g., "23505" for unique violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            Error::SaveFailed(s) => s.source.sqlstate(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// Shorthand for a MetadataUnavailable error.
    pub fn metadata_unavailable(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Metadata(MetadataError {
            table: table.into(),
            reason: reason.into(),
            source: None,
        })
    }

    /// Wrap an adapter failure as a failed save of `table`.
    pub fn save_failed(table: impl Into<String>, source: Error) -> Self {
        Error::SaveFailed(SaveError {
            table: table.into(),
            source: Box::new(source),
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Metadata(e) => write!(f, "Metadata unavailable: {}", e),
            Error::Relationship(e) => write!(f, "Relationship error: {}", e),
            Error::RowNotFound(e) => write!(f, "{}", e),
            Error::SaveFailed(e) => write!(f, "Save failed: {}", e),
            Error::Field(e) => write!(f, "Field error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Metadata(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::SaveFailed(e) => Some(e.source.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table '{}': {}", self.table, self.reason)
    }
}

impl fmt::Display for RelationshipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationshipError::AmbiguousRelationship {
                table,
                alias,
                candidates,
            } => write!(
                f,
                "could not resolve junction table for '{}.{}' ({} candidates)",
                table,
                alias,
                candidates.len()
            )?,
            RelationshipError::TitleColumnNotDetected {
                table,
                columns_considered,
            } => write!(
                f,
                "title column not detected for '{}' (considered: [{}])",
                table,
                columns_considered.join(", ")
            )?,
            RelationshipError::GroupColumnNotSet { table, column, .. } => write!(
                f,
                "group column {} not set on '{}'",
                column.as_deref().map_or("<none>".to_string(), |c| format!("'{c}'")),
                table
            )?,
            RelationshipError::GroupKeyNotPresentInResultset {
                group_column,
                group_key,
                ..
            } => write!(
                f,
                "group key '{}' for column '{}' not present in resultset",
                group_key.to_display_string(),
                group_column
            )?,
        }
        write!(f, "; {}", self.remediation())
    }
}

impl fmt::Display for RowNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self
            .primary_key
            .iter()
            .map(|(col, v)| format!("{col}={}", v.to_display_string()))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "no row in '{}' with {}", self.table, key)
    }
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table '{}': {}", self.table, self.source)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::DuplicateField {
                field,
                existing_model,
                model,
            } => write!(
                f,
                "duplicate field '{}' (registered for {}, added for {})",
                field,
                existing_model.as_deref().unwrap_or("<no model>"),
                model.as_deref().unwrap_or("<no model>")
            ),
            FieldError::HelperCallableNotAvailableForField { field, helper } => write!(
                f,
                "helper '{}' has no callable for field '{}'",
                helper, field
            ),
            FieldError::UnknownField { field } => write!(f, "unknown field '{}'", field),
            FieldError::NotSortable { field } => write!(f, "field '{}' is not sortable", field),
        }
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<MetadataError> for Error {
    fn from(err: MetadataError) -> Self {
        Error::Metadata(err)
    }
}

impl From<RelationshipError> for Error {
    fn from(err: RelationshipError) -> Self {
        Error::Relationship(err)
    }
}

impl From<RowNotFoundError> for Error {
    fn from(err: RowNotFoundError) -> Self {
        Error::RowNotFound(err)
    }
}

impl From<FieldError> for Error {
    fn from(err: FieldError) -> Self {
        Error::Field(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for Dewdrop operations.
pub type Result<T> = std::result::Result<T, Error>;
