//! Option data for select inputs.
//!
//! [`OptionPairs`] fetches `(key, title)` pairs from a reference table;
//! [`OptionGroups`] partitions them by a column referencing a parent table.

use asupersync::{Cx, Outcome};
use dewdrop_core::error::{ConfigError, FieldError, RelationshipError};
use dewdrop_core::{Connection, Error, Result, Row, Value};
use dewdrop_schema::{
    MetadataCache, TableMetadata, detect_title_column, validate_group_column, validate_group_keys,
};
use std::sync::Arc;

const VALUE_ALIAS: &str = "value";
const TITLE_ALIAS: &str = "title";

/// One selectable option: key and display title.
pub type OptionPair = (Value, String);

fn option_from_row(row: &Row) -> OptionPair {
    let key = row.get_by_name(VALUE_ALIAS).cloned().unwrap_or(Value::Null);
    let title = row
        .get_by_name(TITLE_ALIAS)
        .map(Value::to_display_string)
        .unwrap_or_default();
    (key, title)
}

#[allow(clippy::result_large_err)]
fn single_key(meta: &TableMetadata) -> Result<&str> {
    meta.single_primary_key().ok_or_else(|| {
        Error::Config(ConfigError {
            message: format!(
                "options from '{}' need a single-column primary key, found [{}]",
                meta.name,
                meta.primary_key().join(", ")
            ),
        })
    })
}

/// `(key, title)` pairs from a reference table, ordered by title.
#[derive(Debug, Clone)]
pub struct OptionPairs {
    table: Arc<TableMetadata>,
    title_column: Option<String>,
}

impl OptionPairs {
    pub fn new(table: Arc<TableMetadata>) -> Self {
        Self {
            table,
            title_column: None,
        }
    }

    pub fn table(&self) -> &TableMetadata {
        &self.table
    }

    /// Use `column` as the title instead of detecting one.
    pub fn set_title_column(&mut self, column: impl Into<String>) -> &mut Self {
        self.title_column = Some(column.into());
        self
    }

    /// The explicit title column, or the detected one.
    #[allow(clippy::result_large_err)]
    pub fn title_column(&self) -> Result<String> {
        match &self.title_column {
            Some(column) if self.table.has_column(column) => Ok(column.clone()),
            Some(column) => Err(Error::Field(FieldError::UnknownField {
                field: format!("{}.{}", self.table.name, column),
            })),
            None => detect_title_column(&self.table),
        }
    }

    /// SELECT list shared by pairs and groups: `key AS value, title AS title`.
    #[allow(clippy::result_large_err)]
    fn select_sql(&self, dialect: dewdrop_core::Dialect, extra: Option<&str>) -> Result<String> {
        let key = single_key(&self.table)?;
        let title = self.title_column()?;
        let mut columns = vec![
            format!(
                "{} AS {}",
                dialect.quote_identifier(key),
                dialect.quote_identifier(VALUE_ALIAS)
            ),
            format!(
                "{} AS {}",
                dialect.quote_identifier(&title),
                dialect.quote_identifier(TITLE_ALIAS)
            ),
        ];
        if let Some(extra) = extra {
            columns.push(dialect.quote_identifier(extra));
        }
        Ok(format!(
            "SELECT {} FROM {} ORDER BY {}",
            columns.join(", "),
            dialect.quote_identifier(&self.table.name),
            dialect.quote_identifier(&title)
        ))
    }

    #[tracing::instrument(level = "debug", skip(self, cx, conn), fields(table = %self.table.name))]
    pub async fn fetch<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<Vec<OptionPair>, Error> {
        let sql = match self.select_sql(conn.dialect(), None) {
            Ok(sql) => sql,
            Err(e) => return Outcome::Err(e),
        };
        conn.query(cx, &sql, &[])
            .await
            .map(|rows| rows.iter().map(option_from_row).collect())
    }
}

/// Options sharing one parent row.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionGroup {
    /// Parent row key
    pub key: Value,
    /// Parent row title
    pub title: String,
    /// Options in this group, ordered by title
    pub options: Vec<OptionPair>,
}

/// Option pairs partitioned by a column referencing a parent table.
#[derive(Debug, Clone)]
pub struct OptionGroups {
    options: OptionPairs,
    group_column: Option<String>,
    group_title_column: Option<String>,
}

impl OptionGroups {
    pub fn new(table: Arc<TableMetadata>) -> Self {
        Self {
            options: OptionPairs::new(table),
            group_column: None,
            group_title_column: None,
        }
    }

    pub fn set_group_column(&mut self, column: impl Into<String>) -> &mut Self {
        self.group_column = Some(column.into());
        self
    }

    /// Title column of the parent table, instead of detecting one.
    pub fn set_group_title_column(&mut self, column: impl Into<String>) -> &mut Self {
        self.group_title_column = Some(column.into());
        self
    }

    /// Title column of the option rows.
    pub fn set_title_column(&mut self, column: impl Into<String>) -> &mut Self {
        self.options.set_title_column(column);
        self
    }

    /// Fetch groups in parent-title order, each with its options.
    ///
    /// Groups without options are omitted. An option whose group key is not
    /// among the fetched parent rows fails with
    /// `GroupKeyNotPresentInResultset`.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, cache), fields(table = %self.options.table.name))]
    pub async fn fetch<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        cache: &MetadataCache,
    ) -> Outcome<Vec<OptionGroup>, Error> {
        let table = Arc::clone(&self.options.table);
        let group_column = match validate_group_column(&table, self.group_column.as_deref()) {
            Ok(column) => column,
            Err(e) => return Outcome::Err(e),
        };
        let Some(parent_ref) = group_column.references.clone() else {
            return Outcome::Err(Error::Relationship(RelationshipError::GroupColumnNotSet {
                table: table.name.clone(),
                column: Some(group_column.name.clone()),
                available: table
                    .foreign_keys()
                    .map(|(column, _)| column.to_string())
                    .collect(),
            }));
        };
        let group_name = group_column.name.clone();

        let parent = match cache.get_or_load(cx, conn, &parent_ref.table).await {
            Outcome::Ok(meta) => meta,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let mut parents = OptionPairs::new(parent);
        if let Some(column) = &self.group_title_column {
            parents.set_title_column(column.clone());
        }
        let groups = match parents.fetch(cx, conn).await {
            Outcome::Ok(groups) => groups,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let sql = match self.options.select_sql(conn.dialect(), Some(&group_name)) {
            Ok(sql) => sql,
            Err(e) => return Outcome::Err(e),
        };
        let rows = match conn.query(cx, &sql, &[]).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let expected: Vec<Value> = groups.iter().map(|(key, _)| key.clone()).collect();
        if let Err(e) = validate_group_keys(&rows, &group_name, &expected) {
            return Outcome::Err(e);
        }

        let mut grouped: Vec<OptionGroup> = groups
            .into_iter()
            .map(|(key, title)| OptionGroup {
                key,
                title,
                options: Vec::new(),
            })
            .collect();
        for row in &rows {
            let key = row.get_by_name(&group_name).cloned().unwrap_or(Value::Null);
            if let Some(group) = grouped.iter_mut().find(|g| g.key.same_key(&key)) {
                group.options.push(option_from_row(row));
            }
        }
        grouped.retain(|g| !g.options.is_empty());
        tracing::debug!(groups = grouped.len(), options = rows.len(), "Option groups built");
        Outcome::Ok(grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dewdrop_core::Dialect;
    use dewdrop_schema::ColumnMetadata;

    fn cities() -> Arc<TableMetadata> {
        Arc::new(TableMetadata::new(
            "cities",
            vec![
                ColumnMetadata::new("id", "INTEGER").primary_key(1),
                ColumnMetadata::new("city_name", "VARCHAR(80)"),
                ColumnMetadata::new("state_id", "INTEGER").references("states", "id"),
            ],
        ))
    }

    #[test]
    fn test_title_column_detected_or_explicit() {
        let mut pairs = OptionPairs::new(cities());
        assert_eq!(pairs.title_column().unwrap(), "city_name");
        pairs.set_title_column("missing");
        assert!(pairs.title_column().is_err());
    }

    #[test]
    fn test_select_sql() {
        let pairs = OptionPairs::new(cities());
        assert_eq!(
            pairs.select_sql(Dialect::Sqlite, Some("state_id")).unwrap(),
            r#"SELECT "id" AS "value", "city_name" AS "title", "state_id" FROM "cities" ORDER BY "city_name""#
        );
    }

    #[test]
    fn test_composite_key_rejected() {
        let meta = Arc::new(TableMetadata::new(
            "links",
            vec![
                ColumnMetadata::new("a", "INTEGER").primary_key(1),
                ColumnMetadata::new("b", "INTEGER").primary_key(2),
                ColumnMetadata::new("label", "TEXT"),
            ],
        ));
        match OptionPairs::new(meta).select_sql(Dialect::Postgres, None) {
            Err(Error::Config(e)) => assert!(e.message.contains("[a, b]")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
