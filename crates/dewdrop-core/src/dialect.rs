//! SQL dialect differences that matter to generated statements.

use serde::{Deserialize, Serialize};

/// SQL dialect for generating database-specific SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// SQLite dialect (uses ?1, ?2 placeholders)
    Sqlite,
    /// MySQL dialect (uses ? placeholders)
    Mysql,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are doubled.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => {
                let escaped = name.replace('"', "\"\"");
                format!("\"{}\"", escaped)
            }
            Dialect::Mysql => {
                let escaped = name.replace('`', "``");
                format!("`{}`", escaped)
            }
        }
    }

    /// Quote a `qualifier.name` pair.
    pub fn quote_qualified(self, qualifier: &str, name: &str) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(qualifier),
            self.quote_identifier(name)
        )
    }

    /// Aggregate `expr` into one string joined by `separator`.
    ///
    /// `separator` is emitted as a string literal with single quotes doubled.
    pub fn string_agg(self, expr: &str, separator: &str) -> String {
        let sep = separator.replace('\'', "''");
        match self {
            Dialect::Sqlite => format!("group_concat({expr}, '{sep}')"),
            Dialect::Postgres => format!("string_agg(CAST({expr} AS TEXT), '{sep}')"),
            Dialect::Mysql => format!("GROUP_CONCAT({expr} SEPARATOR '{sep}')"),
        }
    }

    /// Guess the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "sqlite" | "file" => Some(Dialect::Sqlite),
            "mysql" | "mariadb" => Some(Dialect::Mysql),
            _ => None,
        }
    }
}
