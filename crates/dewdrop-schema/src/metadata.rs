//! Column and table metadata.
//!
//! Metadata is loaded once per process (see [`crate::cache::MetadataCache`])
//! and is immutable afterwards. It can also be restored from a JSON snapshot
//! instead of querying the catalog.

use crate::inflect;
use crate::patterns;
use dewdrop_core::error::ConfigError;
use dewdrop_core::{Error, Result, Value};
use serde::{Deserialize, Serialize};

/// Parsed SQL type with extracted metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSqlType {
    /// Base type name (e.g., VARCHAR, INTEGER, DECIMAL)
    pub base_type: String,
    /// Length for character types (e.g., VARCHAR(255) -> 255)
    pub length: Option<u32>,
    /// Precision for numeric types (e.g., DECIMAL(10,2) -> 10)
    pub precision: Option<u32>,
    /// Scale for numeric types (e.g., DECIMAL(10,2) -> 2)
    pub scale: Option<u32>,
    /// Whether the type is unsigned (MySQL)
    pub unsigned: bool,
    /// Whether this is an array type (PostgreSQL)
    pub array: bool,
}

impl ParsedSqlType {
    /// Parse a SQL type string into structured metadata.
    ///
    /// - `VARCHAR(255)` -> base_type: "VARCHAR", length: 255
    /// - `DECIMAL(10,2)` -> base_type: "DECIMAL", precision: 10, scale: 2
    /// - `INT(10) UNSIGNED` -> base_type: "INT", length: 10, unsigned: true
    /// - `TEXT[]` -> base_type: "TEXT", array: true
    pub fn parse(type_str: &str) -> Self {
        let upper = type_str.trim().to_uppercase();

        let (rest, array) = match upper.strip_suffix("[]") {
            Some(stripped) => (stripped.trim_end(), true),
            None => (upper.as_str(), false),
        };

        let (rest, unsigned) = match rest.strip_suffix(" UNSIGNED") {
            Some(stripped) => (stripped.trim_end(), true),
            None => (rest, false),
        };

        let Some(paren_start) = rest.find('(') else {
            return Self {
                base_type: rest.to_string(),
                unsigned,
                array,
                ..Self::default()
            };
        };

        let base_type = rest[..paren_start].trim().to_string();
        let params = rest[paren_start + 1..]
            .split(')')
            .next()
            .unwrap_or_default();

        if params.contains(',') {
            let mut parts = params.split(',');
            let precision = parts.next().and_then(|s| s.trim().parse().ok());
            let scale = parts.next().and_then(|s| s.trim().parse().ok());
            Self {
                base_type,
                length: None,
                precision,
                scale,
                unsigned,
                array,
            }
        } else {
            Self {
                base_type,
                length: params.trim().parse().ok(),
                precision: None,
                scale: None,
                unsigned,
                array,
            }
        }
    }

    /// Check if this is a text/string type.
    pub fn is_text(&self) -> bool {
        matches!(
            self.base_type.as_str(),
            "VARCHAR"
                | "CHAR"
                | "TEXT"
                | "CLOB"
                | "NVARCHAR"
                | "NCHAR"
                | "NTEXT"
                | "CHARACTER"
                | "CHARACTER VARYING"
                | "TINYTEXT"
                | "MEDIUMTEXT"
                | "LONGTEXT"
                | "CITEXT"
                | "STRING"
                | "ENUM"
        )
    }

    /// Check if this is a boolean type. MySQL reports booleans as `TINYINT(1)`.
    pub fn is_boolean(&self) -> bool {
        matches!(self.base_type.as_str(), "BOOL" | "BOOLEAN")
            || (self.base_type == "TINYINT" && self.length == Some(1))
    }

    /// Check if this is an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(
            self.base_type.as_str(),
            "INT"
                | "INTEGER"
                | "BIGINT"
                | "SMALLINT"
                | "TINYINT"
                | "MEDIUMINT"
                | "SERIAL"
                | "BIGSERIAL"
                | "SMALLSERIAL"
        )
    }

    /// Check if this is a numeric type.
    pub fn is_numeric(&self) -> bool {
        self.is_integer()
            || matches!(
                self.base_type.as_str(),
                "DECIMAL" | "NUMERIC" | "FLOAT" | "DOUBLE" | "REAL" | "DOUBLE PRECISION"
            )
    }

    /// Check if this is a date/time type.
    pub fn is_datetime(&self) -> bool {
        matches!(self.generic(), GenericType::Date | GenericType::Timestamp | GenericType::Time)
    }

    fn generic(&self) -> GenericType {
        let base = self.base_type.as_str();
        if self.is_boolean() {
            GenericType::Boolean
        } else if self.is_integer() {
            GenericType::Integer
        } else if self.is_numeric() {
            GenericType::Float
        } else if self.is_text() {
            GenericType::Text
        } else if base == "DATE" {
            GenericType::Date
        } else if base.starts_with("TIMESTAMP") || base == "DATETIME" {
            GenericType::Timestamp
        } else if base.starts_with("TIME") {
            GenericType::Time
        } else if matches!(
            base,
            "BLOB" | "BYTEA" | "BINARY" | "VARBINARY" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB"
        ) {
            GenericType::Binary
        } else {
            GenericType::Other
        }
    }
}

/// Coarse column classification used by field helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenericType {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Timestamp,
    Time,
    Binary,
    /// Foreign-key column, whatever its storage type
    Reference,
    Other,
}

/// Target of a foreign-key reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyReference {
    /// Referenced table
    pub table: String,
    /// Referenced column
    pub column: String,
    /// Whether this reference was inferred from the `<singular>_id` naming convention
    #[serde(default)]
    pub inferred: bool,
}

impl ForeignKeyReference {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            inferred: false,
        }
    }
}

/// Metadata for one table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// Column name
    pub name: String,
    /// SQL type as raw string
    pub sql_type: String,
    /// Parsed SQL type with extracted metadata
    pub parsed_type: ParsedSqlType,
    /// Whether the column is nullable
    pub nullable: bool,
    /// Default value expression as reported by the catalog
    pub default: Option<String>,
    /// Whether this is part of the primary key
    pub primary: bool,
    /// 1-based position within the primary key
    pub primary_position: Option<u32>,
    /// Whether this column auto-increments
    pub identity: bool,
    /// 1-based declaration ordinal
    pub position: u32,
    /// Foreign-key target, declared or inferred
    pub references: Option<ForeignKeyReference>,
}

impl ColumnMetadata {
    /// A nullable, non-key column of the given SQL type.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        let sql_type = sql_type.into();
        Self {
            name: name.into(),
            parsed_type: ParsedSqlType::parse(&sql_type),
            sql_type,
            nullable: true,
            default: None,
            primary: false,
            primary_position: None,
            identity: false,
            position: 0,
            references: None,
        }
    }

    /// Mark as part of the primary key at `position` (1-based).
    pub fn primary_key(mut self, position: u32) -> Self {
        self.primary = true;
        self.primary_position = Some(position);
        self.nullable = false;
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn at_position(mut self, position: u32) -> Self {
        self.position = position;
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKeyReference::new(table, column));
        self
    }

    /// Coarse classification; foreign keys classify as `Reference`.
    pub fn generic_type(&self) -> GenericType {
        if self.references.is_some() {
            GenericType::Reference
        } else {
            self.parsed_type.generic()
        }
    }

    /// Whether the column stores text (regardless of being a foreign key).
    pub fn is_text(&self) -> bool {
        self.parsed_type.is_text()
    }

    /// The default as a literal value, when the catalog default is a literal.
    ///
    /// Quoted strings, integers, decimals, booleans and `NULL` are parsed.
    /// Expressions (`CURRENT_TIMESTAMP`, `nextval(..)`, function calls)
    /// return `None` and are left for the database to apply.
    pub fn default_value(&self) -> Option<Value> {
        let raw = self.default.as_deref()?.trim();
        // Postgres decorates literals with a cast: 'draft'::character varying
        let raw = match raw.find("::") {
            Some(idx) if !raw[..idx].contains('(') => raw[..idx].trim(),
            _ => raw,
        };
        let raw = raw
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .map_or(raw, str::trim);

        if raw.eq_ignore_ascii_case("null") {
            return Some(Value::Null);
        }
        if let Some(text) = patterns::capture(raw, r"^'((?:[^']|'')*)'$") {
            return Some(Value::Text(text.replace("''", "'")));
        }
        if patterns::is_match(raw, r"^-?\d+$") {
            return raw.parse::<i64>().ok().map(|v| {
                if self.parsed_type.is_boolean() {
                    Value::Bool(v != 0)
                } else {
                    Value::BigInt(v)
                }
            });
        }
        if patterns::is_match(raw, r"^-?\d*\.\d+$") {
            return raw.parse::<f64>().ok().map(Value::Double);
        }
        match raw.to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        }
    }
}

/// Metadata for a table: columns in declaration order plus key structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    /// Table name
    pub name: String,
    /// Display title for one row (`Product Category`)
    pub singular_title: String,
    /// Display title for many rows (`Product Categories`)
    pub plural_title: String,
    columns: Vec<ColumnMetadata>,
    primary_key: Vec<String>,
}

impl TableMetadata {
    /// Build metadata from columns.
    ///
    /// Columns are ordered by `position`; columns without one take their
    /// index in `columns`. The primary key is ordered by `primary_position`.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnMetadata>) -> Self {
        let name = name.into();
        let (singular_title, plural_title) = inflect::table_titles(&name);

        let mut columns: Vec<ColumnMetadata> = columns
            .into_iter()
            .enumerate()
            .map(|(i, mut col)| {
                if col.position == 0 {
                    col.position = u32::try_from(i + 1).unwrap_or(u32::MAX);
                }
                col
            })
            .collect();
        columns.sort_by_key(|c| c.position);

        let mut keyed: Vec<(u32, u32, &ColumnMetadata)> = columns
            .iter()
            .filter(|c| c.primary)
            .map(|c| (c.primary_position.unwrap_or(u32::MAX), c.position, c))
            .collect();
        keyed.sort_by_key(|(pk_pos, pos, _)| (*pk_pos, *pos));
        let primary_key = keyed.into_iter().map(|(_, _, c)| c.name.clone()).collect();

        Self {
            name,
            singular_title,
            plural_title,
            columns,
            primary_key,
        }
    }

    /// Override the derived display titles.
    pub fn with_titles(mut self, singular: impl Into<String>, plural: impl Into<String>) -> Self {
        self.singular_title = singular.into();
        self.plural_title = plural.into();
        self
    }

    /// Restore metadata from a JSON snapshot.
    #[allow(clippy::result_large_err)]
    pub fn from_snapshot_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid metadata snapshot: {e}"),
            })
        })
    }

    /// Serialize to a JSON snapshot.
    #[allow(clippy::result_large_err)]
    pub fn to_snapshot_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("cannot serialize metadata snapshot: {e}"),
            })
        })
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Primary key column names in key order.
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// The primary key column when the key has exactly one column.
    pub fn single_primary_key(&self) -> Option<&str> {
        match self.primary_key.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    /// Check if this table has a single-column auto-increment primary key.
    pub fn has_identity_pk(&self) -> bool {
        self.single_primary_key()
            .and_then(|pk| self.column(pk))
            .is_some_and(|c| c.identity)
    }

    /// Foreign-key columns and their targets, in declaration order.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&str, &ForeignKeyReference)> {
        self.columns
            .iter()
            .filter_map(|c| c.references.as_ref().map(|r| (c.name.as_str(), r)))
    }

    /// Foreign-key columns pointing at `table`.
    pub fn references_to(&self, table: &str) -> Vec<&ColumnMetadata> {
        self.columns
            .iter()
            .filter(|c| c.references.as_ref().is_some_and(|r| r.table == table))
            .collect()
    }

    /// Text-typed, non-reference columns in ordinal order.
    pub fn text_columns(&self) -> Vec<&ColumnMetadata> {
        self.columns
            .iter()
            .filter(|c| c.is_text() && c.references.is_none())
            .collect()
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [ColumnMetadata] {
        &mut self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_sql_type_varchar() {
        let t = ParsedSqlType::parse("VARCHAR(255)");
        assert_eq!(t.base_type, "VARCHAR");
        assert_eq!(t.length, Some(255));
        assert!(t.is_text());
    }

    #[test]
    fn test_parsed_sql_type_decimal_and_unsigned() {
        let t = ParsedSqlType::parse("decimal(10, 2)");
        assert_eq!(t.base_type, "DECIMAL");
        assert_eq!((t.precision, t.scale), (Some(10), Some(2)));

        let t = ParsedSqlType::parse("int(10) unsigned");
        assert_eq!(t.base_type, "INT");
        assert_eq!(t.length, Some(10));
        assert!(t.unsigned);
    }

    #[test]
    fn test_parsed_sql_type_array() {
        let t = ParsedSqlType::parse("text[]");
        assert_eq!(t.base_type, "TEXT");
        assert!(t.array);
    }

    #[test]
    fn test_generic_types() {
        let kind = |ty: &str| ColumnMetadata::new("c", ty).generic_type();
        assert_eq!(kind("VARCHAR(50)"), GenericType::Text);
        assert_eq!(kind("character varying(50)"), GenericType::Text);
        assert_eq!(kind("INTEGER"), GenericType::Integer);
        assert_eq!(kind("tinyint(1)"), GenericType::Boolean);
        assert_eq!(kind("NUMERIC(8,2)"), GenericType::Float);
        assert_eq!(kind("date"), GenericType::Date);
        assert_eq!(kind("timestamp with time zone"), GenericType::Timestamp);
        assert_eq!(kind("DATETIME"), GenericType::Timestamp);
        assert_eq!(kind("time"), GenericType::Time);
        assert_eq!(kind("bytea"), GenericType::Binary);
        assert_eq!(kind("geometry"), GenericType::Other);
        assert_eq!(
            ColumnMetadata::new("category_id", "INTEGER")
                .references("categories", "id")
                .generic_type(),
            GenericType::Reference
        );
    }

    #[test]
    fn test_default_literals() {
        let with = |ty: &str, d: &str| ColumnMetadata::new("c", ty).default_expr(d).default_value();
        assert_eq!(with("TEXT", "'draft'"), Some(Value::Text("draft".into())));
        assert_eq!(with("TEXT", "'it''s'"), Some(Value::Text("it's".into())));
        assert_eq!(
            with("varchar", "'draft'::character varying"),
            Some(Value::Text("draft".into()))
        );
        assert_eq!(with("INTEGER", "0"), Some(Value::BigInt(0)));
        assert_eq!(with("INTEGER", "(-5)"), Some(Value::BigInt(-5)));
        assert_eq!(with("tinyint(1)", "1"), Some(Value::Bool(true)));
        assert_eq!(with("NUMERIC", "9.50"), Some(Value::Double(9.5)));
        assert_eq!(with("BOOLEAN", "false"), Some(Value::Bool(false)));
        assert_eq!(with("TEXT", "NULL"), Some(Value::Null));
        assert_eq!(with("TIMESTAMP", "CURRENT_TIMESTAMP"), None);
        assert_eq!(with("INTEGER", "nextval('seq'::regclass)"), None);
        assert_eq!(ColumnMetadata::new("c", "TEXT").default_value(), None);
    }

    fn order_lines() -> TableMetadata {
        TableMetadata::new(
            "order_lines",
            vec![
                ColumnMetadata::new("line_no", "INTEGER").primary_key(2),
                ColumnMetadata::new("order_id", "INTEGER")
                    .primary_key(1)
                    .references("orders", "id"),
                ColumnMetadata::new("sku", "VARCHAR(20)"),
            ],
        )
    }

    #[test]
    fn test_composite_primary_key_follows_primary_position() {
        let meta = order_lines();
        assert_eq!(meta.primary_key(), &["order_id", "line_no"]);
        assert_eq!(meta.single_primary_key(), None);
        assert_eq!(
            meta.column_names(),
            vec!["line_no".to_string(), "order_id".to_string(), "sku".to_string()]
        );
    }

    #[test]
    fn test_titles_and_lookup() {
        let meta = order_lines();
        assert_eq!(meta.singular_title, "Order Line");
        assert_eq!(meta.plural_title, "Order Lines");
        assert!(meta.has_column("sku"));
        assert_eq!(meta.references_to("orders").len(), 1);
        let fks: Vec<_> = meta.foreign_keys().map(|(c, r)| (c, r.table.as_str())).collect();
        assert_eq!(fks, vec![("order_id", "orders")]);
        assert_eq!(meta.text_columns().len(), 1);

        let renamed = meta.with_titles("Line", "Lines");
        assert_eq!(renamed.plural_title, "Lines");
    }

    #[test]
    fn test_snapshot_round_trip_preserves_key_order() {
        let meta = order_lines();
        let json = meta.to_snapshot_json().unwrap();
        let restored = TableMetadata::from_snapshot_json(&json).unwrap();
        assert_eq!(restored, meta);
        assert!(TableMetadata::from_snapshot_json("{\"name\": 1}").is_err());
    }
}
