//! Catalog introspection.
//!
//! Loads column, primary-key and foreign-key metadata for SQLite, PostgreSQL
//! and MySQL through the host's [`Connection`]. All queries are read-only.

use crate::inflect;
use crate::metadata::{ColumnMetadata, ForeignKeyReference, ParsedSqlType, TableMetadata};
use asupersync::{Cx, Outcome};
use dewdrop_core::error::MetadataError;
use dewdrop_core::{Connection, Dialect, Error, Row, Value};
use std::collections::HashMap;

/// Database introspector.
#[derive(Debug, Clone, Copy)]
pub struct Introspector {
    /// Database type for dialect-specific queries
    dialect: Dialect,
}

fn unavailable(table: &str, err: Error) -> Error {
    Error::Metadata(MetadataError {
        table: table.to_string(),
        reason: format!("introspection query rejected: {err}"),
        source: Some(Box::new(err)),
    })
}

impl Introspector {
    /// Create a new introspector for the given dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Create an introspector speaking the connection's dialect.
    pub fn for_connection<C: Connection>(conn: &C) -> Self {
        Self::new(conn.dialect())
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// List all table names in the database.
    #[tracing::instrument(level = "debug", skip(self, cx, conn))]
    pub async fn table_names<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<Vec<String>, Error> {
        let sql = match self.dialect {
            Dialect::Sqlite => {
                "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
            }
            Dialect::Postgres => {
                "SELECT table_name FROM information_schema.tables WHERE table_schema = 'public' ORDER BY table_name"
            }
            Dialect::Mysql => "SHOW TABLES",
        };

        let rows = match conn.query(cx, sql, &[]).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let names: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get(0).and_then(|v| v.as_str().map(String::from)))
            .collect();

        Outcome::Ok(names)
    }

    /// Load columns in declaration order.
    ///
    /// Fails with `MetadataUnavailable` when the table has no columns (it
    /// does not exist) or the catalog query is rejected.
    #[tracing::instrument(level = "debug", skip(self, cx, conn))]
    pub async fn load_columns<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<Vec<ColumnMetadata>, Error> {
        let loaded = match self.dialect {
            Dialect::Sqlite => self.sqlite_columns(cx, conn, table_name).await,
            Dialect::Postgres => self.postgres_columns(cx, conn, table_name).await,
            Dialect::Mysql => self.mysql_columns(cx, conn, table_name).await,
        };

        let columns = match loaded {
            Outcome::Ok(cols) => cols,
            Outcome::Err(e) => return Outcome::Err(unavailable(table_name, e)),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        if columns.is_empty() {
            tracing::debug!(table = table_name, "Catalog reported no columns");
            return Outcome::Err(Error::metadata_unavailable(
                table_name,
                "table does not exist or has no columns",
            ));
        }

        Outcome::Ok(columns)
    }

    /// Load primary key columns ordered by their position in the key.
    pub async fn load_primary_key<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<Vec<String>, Error> {
        let columns = match self.load_columns(cx, conn, table_name).await {
            Outcome::Ok(cols) => cols,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        Outcome::Ok(TableMetadata::new(table_name, columns).primary_key().to_vec())
    }

    /// Load declared foreign keys, keyed by local column.
    ///
    /// Databases without referential metadata yield an empty map. A rejected
    /// catalog query degrades to an empty map as well.
    #[tracing::instrument(level = "debug", skip(self, cx, conn))]
    pub async fn load_foreign_keys<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<HashMap<String, ForeignKeyReference>, Error> {
        let loaded = match self.dialect {
            Dialect::Sqlite => self.sqlite_foreign_keys(cx, conn, table_name).await,
            Dialect::Postgres => self.postgres_foreign_keys(cx, conn, table_name).await,
            Dialect::Mysql => self.mysql_foreign_keys(cx, conn, table_name).await,
        };

        match loaded {
            Outcome::Ok(fks) => Outcome::Ok(fks),
            Outcome::Err(e) => {
                tracing::warn!(
                    table = table_name,
                    error = %e,
                    "Foreign key metadata unavailable, falling back to naming conventions"
                );
                Outcome::Ok(HashMap::new())
            }
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Load complete table metadata.
    ///
    /// Columns named `<singular>_id` with no declared foreign key get an
    /// inferred reference when a table with that singular name exists and
    /// has a single-column primary key.
    #[tracing::instrument(level = "debug", skip(self, cx, conn))]
    pub async fn load_table<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<TableMetadata, Error> {
        let columns = match self.load_columns(cx, conn, table_name).await {
            Outcome::Ok(cols) => cols,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut foreign_keys = match self.load_foreign_keys(cx, conn, table_name).await {
            Outcome::Ok(fks) => fks,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut meta = TableMetadata::new(table_name, columns);

        let unresolved: Vec<(String, String)> = meta
            .columns()
            .iter()
            .filter(|c| !foreign_keys.contains_key(&c.name))
            .filter_map(|c| {
                let stem = c.name.strip_suffix("_id")?;
                (!stem.is_empty()).then(|| (c.name.clone(), stem.to_string()))
            })
            .collect();

        if !unresolved.is_empty() {
            let tables = match self.table_names(cx, conn).await {
                Outcome::Ok(names) => names,
                Outcome::Err(e) => {
                    tracing::warn!(
                        table = table_name,
                        error = %e,
                        "Cannot list tables, skipping naming-convention references"
                    );
                    Vec::new()
                }
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };

            for (column, stem) in unresolved {
                let Some(target) = tables
                    .iter()
                    .find(|t| t.as_str() == stem || inflect::singularize(t) == stem)
                else {
                    continue;
                };
                if target == table_name && meta.primary_key().contains(&column) {
                    continue;
                }
                let target_pk = if target == table_name {
                    meta.primary_key().to_vec()
                } else {
                    match self.load_primary_key(cx, conn, target).await {
                        Outcome::Ok(pk) => pk,
                        Outcome::Err(e) => {
                            tracing::debug!(referenced = %target, error = %e, "Skipping inferred reference");
                            continue;
                        }
                        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                        Outcome::Panicked(p) => return Outcome::Panicked(p),
                    }
                };
                if let [pk] = target_pk.as_slice() {
                    tracing::debug!(
                        table = table_name,
                        column = %column,
                        referenced = %target,
                        "Inferred reference from column name"
                    );
                    foreign_keys.insert(
                        column,
                        ForeignKeyReference {
                            table: target.clone(),
                            column: pk.clone(),
                            inferred: true,
                        },
                    );
                }
            }
        }

        for col in meta.columns_mut() {
            if let Some(reference) = foreign_keys.remove(&col.name) {
                col.references = Some(reference);
            }
        }

        Outcome::Ok(meta)
    }

    async fn sqlite_columns<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<Vec<ColumnMetadata>, Error> {
        let sql = format!(
            "PRAGMA table_info({})",
            self.dialect.quote_identifier(table_name)
        );
        let rows = match conn.query(cx, &sql, &[]).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut columns: Vec<ColumnMetadata> = rows
            .iter()
            .filter_map(|row| {
                let name = row.get_named::<String>("name").ok()?;
                let sql_type = row.get_named::<String>("type").ok().unwrap_or_default();
                let cid = row.get_named::<i64>("cid").ok().unwrap_or(0);
                let notnull = row.get_named::<i64>("notnull").ok().unwrap_or(0);
                let default = row.get_named::<Option<String>>("dflt_value").ok().flatten();
                let pk = row.get_named::<i64>("pk").ok().unwrap_or(0);

                Some(ColumnMetadata {
                    name,
                    parsed_type: ParsedSqlType::parse(&sql_type),
                    sql_type,
                    nullable: notnull == 0 && pk == 0,
                    default,
                    primary: pk > 0,
                    primary_position: u32::try_from(pk).ok().filter(|p| *p > 0),
                    identity: false,
                    position: u32::try_from(cid + 1).unwrap_or(0),
                    references: None,
                })
            })
            .collect();

        // A lone INTEGER PRIMARY KEY aliases the rowid
        let pk_count = columns.iter().filter(|c| c.primary).count();
        if pk_count == 1 {
            if let Some(col) = columns
                .iter_mut()
                .find(|c| c.primary && c.parsed_type.base_type == "INTEGER")
            {
                col.identity = true;
            }
        }

        Outcome::Ok(columns)
    }

    async fn postgres_columns<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<Vec<ColumnMetadata>, Error> {
        let sql = "SELECT
                       c.column_name,
                       c.data_type,
                       c.udt_name,
                       c.character_maximum_length,
                       c.numeric_precision,
                       c.numeric_scale,
                       c.is_nullable,
                       c.column_default,
                       c.is_identity,
                       c.ordinal_position
                   FROM information_schema.columns c
                   WHERE c.table_name = $1 AND c.table_schema = 'public'
                   ORDER BY c.ordinal_position";

        let rows = match conn
            .query(cx, sql, &[Value::Text(table_name.to_string())])
            .await
        {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut columns: Vec<ColumnMetadata> = rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| {
                let name = row.get_named::<String>("column_name").ok()?;
                let data_type = row.get_named::<String>("data_type").ok()?;
                let udt_name = row.get_named::<String>("udt_name").ok().unwrap_or_default();
                let char_len = row.get_named::<i64>("character_maximum_length").ok();
                let precision = row.get_named::<i64>("numeric_precision").ok();
                let scale = row.get_named::<i64>("numeric_scale").ok();
                let nullable = row.get_named::<String>("is_nullable").ok()?;
                let default = row
                    .get_named::<Option<String>>("column_default")
                    .ok()
                    .flatten();
                let is_identity = row.get_named::<String>("is_identity").ok();
                let ordinal = row.get_named::<i64>("ordinal_position").ok();

                let sql_type =
                    build_postgres_type(&data_type, &udt_name, char_len, precision, scale);
                let identity = is_identity.as_deref() == Some("YES")
                    || default.as_ref().is_some_and(|d| d.starts_with("nextval("));

                Some(ColumnMetadata {
                    name,
                    parsed_type: ParsedSqlType::parse(&sql_type),
                    sql_type,
                    nullable: nullable == "YES",
                    default,
                    primary: false,
                    primary_position: None,
                    identity,
                    position: ordinal_or_index(ordinal, i),
                    references: None,
                })
            })
            .collect();

        let pk_sql = "SELECT kcu.column_name, kcu.ordinal_position
                      FROM information_schema.table_constraints tc
                      JOIN information_schema.key_column_usage kcu
                          ON tc.constraint_name = kcu.constraint_name
                          AND tc.table_schema = kcu.table_schema
                      WHERE tc.constraint_type = 'PRIMARY KEY'
                          AND tc.table_name = $1
                          AND tc.table_schema = 'public'
                      ORDER BY kcu.ordinal_position";
        let pk_rows = match conn
            .query(cx, pk_sql, &[Value::Text(table_name.to_string())])
            .await
        {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        apply_primary_key_rows(&mut columns, &pk_rows);

        Outcome::Ok(columns)
    }

    async fn mysql_columns<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<Vec<ColumnMetadata>, Error> {
        let sql = format!(
            "SHOW FULL COLUMNS FROM {}",
            self.dialect.quote_identifier(table_name)
        );
        let rows = match conn.query(cx, &sql, &[]).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut columns: Vec<ColumnMetadata> = rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| {
                let name = row.get_named::<String>("Field").ok()?;
                let sql_type = row.get_named::<String>("Type").ok()?;
                let null = row.get_named::<String>("Null").ok()?;
                let default = row.get_named::<Option<String>>("Default").ok().flatten();
                let extra = row.get_named::<String>("Extra").ok().unwrap_or_default();

                Some(ColumnMetadata {
                    name,
                    parsed_type: ParsedSqlType::parse(&sql_type),
                    sql_type,
                    nullable: null == "YES",
                    // MySQL reports string defaults unquoted
                    default: default.map(|d| quote_mysql_default(&d)),
                    primary: false,
                    primary_position: None,
                    identity: extra.contains("auto_increment"),
                    position: ordinal_or_index(None, i),
                    references: None,
                })
            })
            .collect();

        let pk_sql = "SELECT column_name, ordinal_position
                      FROM information_schema.key_column_usage
                      WHERE table_schema = DATABASE()
                          AND table_name = ?
                          AND constraint_name = 'PRIMARY'
                      ORDER BY ordinal_position";
        let pk_rows = match conn
            .query(cx, pk_sql, &[Value::Text(table_name.to_string())])
            .await
        {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        apply_primary_key_rows(&mut columns, &pk_rows);

        Outcome::Ok(columns)
    }

    async fn sqlite_foreign_keys<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<HashMap<String, ForeignKeyReference>, Error> {
        let sql = format!(
            "PRAGMA foreign_key_list({})",
            self.dialect.quote_identifier(table_name)
        );
        let rows = match conn.query(cx, &sql, &[]).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let fks = rows
            .iter()
            .filter_map(|row| {
                let table = row.get_named::<String>("table").ok()?;
                let from = row.get_named::<String>("from").ok()?;
                // `to` is NULL when the reference targets the implicit primary key
                let to = row
                    .get_named::<Option<String>>("to")
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| "id".to_string());
                Some((from, ForeignKeyReference::new(table, to)))
            })
            .collect();

        Outcome::Ok(fks)
    }

    async fn postgres_foreign_keys<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<HashMap<String, ForeignKeyReference>, Error> {
        let sql = "SELECT
                       kcu.column_name,
                       ccu.table_name AS foreign_table_name,
                       ccu.column_name AS foreign_column_name
                   FROM information_schema.table_constraints AS tc
                   JOIN information_schema.key_column_usage AS kcu
                       ON tc.constraint_name = kcu.constraint_name
                       AND tc.table_schema = kcu.table_schema
                   JOIN information_schema.constraint_column_usage AS ccu
                       ON ccu.constraint_name = tc.constraint_name
                       AND ccu.table_schema = tc.table_schema
                   WHERE tc.constraint_type = 'FOREIGN KEY'
                       AND tc.table_name = $1
                       AND tc.table_schema = 'public'";

        let rows = match conn
            .query(cx, sql, &[Value::Text(table_name.to_string())])
            .await
        {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        Outcome::Ok(reference_rows(
            &rows,
            "column_name",
            "foreign_table_name",
            "foreign_column_name",
        ))
    }

    async fn mysql_foreign_keys<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<HashMap<String, ForeignKeyReference>, Error> {
        let sql = "SELECT
                       column_name,
                       referenced_table_name,
                       referenced_column_name
                   FROM information_schema.key_column_usage
                   WHERE table_schema = DATABASE()
                       AND table_name = ?
                       AND referenced_table_name IS NOT NULL";

        let rows = match conn
            .query(cx, sql, &[Value::Text(table_name.to_string())])
            .await
        {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        Outcome::Ok(reference_rows(
            &rows,
            "column_name",
            "referenced_table_name",
            "referenced_column_name",
        ))
    }
}

fn ordinal_or_index(ordinal: Option<i64>, index: usize) -> u32 {
    ordinal
        .and_then(|o| u32::try_from(o).ok())
        .unwrap_or_else(|| u32::try_from(index + 1).unwrap_or(u32::MAX))
}

fn apply_primary_key_rows(columns: &mut [ColumnMetadata], pk_rows: &[Row]) {
    for (i, row) in pk_rows.iter().enumerate() {
        let Ok(name) = row.get_named::<String>("column_name") else {
            continue;
        };
        let ordinal = row.get_named::<i64>("ordinal_position").ok();
        if let Some(col) = columns.iter_mut().find(|c| c.name == name) {
            col.primary = true;
            col.nullable = false;
            col.primary_position = Some(ordinal_or_index(ordinal, i));
        }
    }
}

fn reference_rows(
    rows: &[Row],
    column_key: &str,
    table_key: &str,
    target_key: &str,
) -> HashMap<String, ForeignKeyReference> {
    rows.iter()
        .filter_map(|row| {
            let column = row.get_named::<String>(column_key).ok()?;
            let table = row.get_named::<String>(table_key).ok()?;
            let target = row.get_named::<String>(target_key).ok()?;
            Some((column, ForeignKeyReference::new(table, target)))
        })
        .collect()
}

fn quote_mysql_default(raw: &str) -> String {
    let is_number = raw.parse::<f64>().is_ok();
    let is_keyword = raw.eq_ignore_ascii_case("null")
        || raw.to_ascii_uppercase().starts_with("CURRENT_")
        || raw.contains('(');
    if is_number || is_keyword || raw.starts_with('\'') {
        raw.to_string()
    } else {
        format!("'{}'", raw.replace('\'', "''"))
    }
}

/// Build a complete PostgreSQL type string from information_schema data.
fn build_postgres_type(
    data_type: &str,
    udt_name: &str,
    char_len: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
) -> String {
    if data_type == "ARRAY" {
        return format!("{}[]", udt_name.trim_start_matches('_'));
    }

    if let Some(len) = char_len {
        return format!("{}({})", data_type.to_uppercase(), len);
    }

    if let (Some(p), Some(s)) = (precision, scale) {
        if data_type == "numeric" {
            return format!("NUMERIC({},{})", p, s);
        }
    }

    data_type.to_uppercase()
}
