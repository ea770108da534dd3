//! Table handles: metadata, declared relationships, and row access.

use crate::many_to_many::ManyToManyRelationship;
use crate::row::TableRow;
use crate::select::Select;
use asupersync::{Cx, Outcome};
use dewdrop_core::{
    Connection, Error, RelationshipError, RequestContext, Result, Row, RowNotFoundError, Value,
    prefixed_table_name,
};
use dewdrop_fields::{CellContent, CsvCell, Field, Fields, SortKey, title_column_alias};
use dewdrop_schema::{
    ForeignKeyReference, MetadataCache, TableMetadata, detect_title_column, resolve_junction,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Alias of the main table in generated SELECTs.
pub const MAIN_ALIAS: &str = "main";

/// A relationship of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relationship {
    /// Declared with [`Table::has_many`]: a child or junction table.
    HasMany {
        /// Name the relationship is addressed by
        alias: String,
        /// Table named in the declaration
        table: String,
    },
    /// A foreign key of this table.
    Reference {
        /// Referencing column of this table
        column: String,
        /// Referenced table
        table: String,
        /// Referenced column
        referenced_column: String,
    },
}

/// A database table with loaded metadata.
#[derive(Debug, Clone)]
pub struct Table {
    meta: Arc<TableMetadata>,
    has_many: Vec<(String, String)>,
    table_prefix: String,
}

fn propagate<T, U>(outcome: Outcome<T, Error>) -> std::result::Result<T, Outcome<U, Error>> {
    match outcome {
        Outcome::Ok(v) => Ok(v),
        Outcome::Err(e) => Err(Outcome::Err(e)),
        Outcome::Cancelled(r) => Err(Outcome::Cancelled(r)),
        Outcome::Panicked(p) => Err(Outcome::Panicked(p)),
    }
}

impl Table {
    /// Load the logical table `name` through `cache` and return a handle for it.
    ///
    /// The physical name carries the configured table prefix, as do tables
    /// later named in [`Table::has_many`].
    #[tracing::instrument(level = "debug", skip(ctx, cx, conn, cache))]
    pub async fn init<C: Connection>(
        ctx: &RequestContext<'_>,
        cx: &Cx,
        conn: &C,
        cache: &MetadataCache,
        name: &str,
    ) -> Outcome<Self, Error> {
        let table_prefix = ctx.config().table_prefix.clone();
        let physical = ctx.table_name(name);
        cache.get_or_load(cx, conn, &physical).await.map(|meta| Self {
            table_prefix,
            ..Self::from_metadata(meta)
        })
    }

    /// A handle over already loaded metadata.
    pub fn from_metadata(meta: Arc<TableMetadata>) -> Self {
        Self {
            meta,
            has_many: Vec::new(),
            table_prefix: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn meta(&self) -> &Arc<TableMetadata> {
        &self.meta
    }

    pub fn singular_title(&self) -> &str {
        &self.meta.singular_title
    }

    pub fn plural_title(&self) -> &str {
        &self.meta.plural_title
    }

    /// Override the display titles for this handle.
    pub fn with_titles(mut self, singular: impl Into<String>, plural: impl Into<String>) -> Self {
        let meta = (*self.meta).clone().with_titles(singular, plural);
        self.meta = Arc::new(meta);
        self
    }

    /// Declare a relationship named `alias` to `table`.
    ///
    /// `table` is either the junction table itself or the related table,
    /// in which case the junction is detected from the catalog.
    pub fn has_many(mut self, alias: impl Into<String>, table: impl Into<String>) -> Self {
        let alias = alias.into();
        let table = prefixed_table_name(&self.table_prefix, &table.into());
        match self.has_many.iter_mut().find(|(a, _)| *a == alias) {
            Some(entry) => entry.1 = table,
            None => self.has_many.push((alias, table)),
        }
        self
    }

    /// Declared relationships followed by foreign-key references.
    pub fn relationships(&self) -> Vec<Relationship> {
        let declared = self.has_many.iter().map(|(alias, table)| Relationship::HasMany {
            alias: alias.clone(),
            table: table.clone(),
        });
        let references = self.meta.foreign_keys().map(|(column, r)| Relationship::Reference {
            column: column.to_string(),
            table: r.table.clone(),
            referenced_column: r.column.clone(),
        });
        declared.chain(references).collect()
    }

    /// Resolve the junction behind the `has_many` declaration `alias`.
    ///
    /// Fails with `AmbiguousRelationship` when the alias is undeclared or
    /// when zero or several junction tables match.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, cache), fields(table = %self.meta.name))]
    pub async fn many_to_many<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        cache: &MetadataCache,
        alias: &str,
    ) -> Outcome<ManyToManyRelationship, Error> {
        let Some((_, declared_name)) = self.has_many.iter().find(|(a, _)| a == alias) else {
            return Outcome::Err(Error::Relationship(
                RelationshipError::AmbiguousRelationship {
                    table: self.meta.name.clone(),
                    alias: alias.to_string(),
                    candidates: Vec::new(),
                },
            ));
        };

        let declared = match propagate(cache.get_or_load(cx, conn, declared_name).await) {
            Ok(meta) => meta,
            Err(out) => return out,
        };

        let catalog = if declared.references_to(&self.meta.name).is_empty() {
            match propagate(self.load_catalog(cx, conn, cache).await) {
                Ok(catalog) => catalog,
                Err(out) => return out,
            }
        } else {
            Vec::new()
        };

        match resolve_junction(&self.meta, alias, &declared, &catalog) {
            Ok(mapping) => {
                tracing::debug!(alias, junction = %mapping.junction_table, "Junction resolved");
                Outcome::Ok(ManyToManyRelationship::from_mapping(
                    alias,
                    &self.meta.name,
                    mapping,
                ))
            }
            Err(e) => Outcome::Err(e),
        }
    }

    /// Metadata for every catalog table; tables that fail to load are skipped.
    async fn load_catalog<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        cache: &MetadataCache,
    ) -> Outcome<Vec<Arc<TableMetadata>>, Error> {
        let names = match propagate(cache.table_names(cx, conn).await) {
            Ok(names) => names,
            Err(out) => return out,
        };
        let mut catalog = Vec::with_capacity(names.len());
        for name in names.iter() {
            match cache.get_or_load(cx, conn, name).await {
                Outcome::Ok(meta) => catalog.push(meta),
                Outcome::Err(e) => {
                    tracing::debug!(table = %name, error = %e, "Skipping catalog table");
                }
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }
        Outcome::Ok(catalog)
    }

    /// The listing query for this table.
    ///
    /// Selects `main.*`, joins each referenced table whose title column can
    /// be detected (exposed as `<column>_title`), and aggregates the titles
    /// of each many-to-many relationship into a column named by its alias.
    /// References and relationships that cannot be resolved or titled are
    /// skipped.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, cache), fields(table = %self.meta.name))]
    pub async fn select_admin_listing<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        cache: &MetadataCache,
    ) -> Outcome<Select, Error> {
        let dialect = conn.dialect();
        let mut select = Select::new(dialect, &self.meta.name, MAIN_ALIAS);

        let references: Vec<(String, ForeignKeyReference)> = self
            .meta
            .foreign_keys()
            .map(|(column, r)| (column.to_string(), r.clone()))
            .collect();
        for (column, reference) in references {
            let referenced = match cache.get_or_load(cx, conn, &reference.table).await {
                Outcome::Ok(meta) => meta,
                Outcome::Err(e) => {
                    tracing::debug!(column = %column, error = %e, "Skipping reference without metadata");
                    continue;
                }
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            let title = match detect_title_column(&referenced) {
                Ok(title) => title,
                Err(e) => {
                    tracing::debug!(column = %column, error = %e, "Skipping untitled reference");
                    continue;
                }
            };
            let join_alias = format!("ref_{column}");
            select = select
                .column(format!(
                    "{} AS {}",
                    dialect.quote_qualified(&join_alias, &title),
                    dialect.quote_identifier(&title_column_alias(&column))
                ))
                .join(format!(
                    "LEFT JOIN {} AS {} ON {} = {}",
                    dialect.quote_identifier(&reference.table),
                    dialect.quote_identifier(&join_alias),
                    dialect.quote_qualified(&join_alias, &reference.column),
                    dialect.quote_qualified(MAIN_ALIAS, &column)
                ));
        }

        let Some(owner_key) = self.meta.single_primary_key().map(str::to_string) else {
            if !self.has_many.is_empty() {
                tracing::debug!("Skipping many-to-many columns: no single-column primary key");
            }
            return Outcome::Ok(select);
        };

        for (alias, _) in &self.has_many {
            let rel = match self.many_to_many(cx, conn, cache, alias).await {
                Outcome::Ok(rel) => rel,
                Outcome::Err(e @ (Error::Relationship(_) | Error::Metadata(_))) => {
                    tracing::debug!(alias = %alias, error = %e, "Skipping unresolved relationship");
                    continue;
                }
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            let related = match propagate(cache.get_or_load(cx, conn, &rel.reference_table).await) {
                Ok(meta) => meta,
                Err(out) => return out,
            };
            let title = match detect_title_column(&related) {
                Ok(title) => title,
                Err(e) => {
                    tracing::debug!(alias = %alias, error = %e, "Skipping untitled relationship");
                    continue;
                }
            };
            let junction_alias = format!("j_{alias}");
            let related_alias = format!("r_{alias}");
            select = select.column(format!(
                "(SELECT {} FROM {} AS {} JOIN {} AS {} ON {} = {} WHERE {} = {}) AS {}",
                dialect.string_agg(&dialect.quote_qualified(&related_alias, &title), ", "),
                dialect.quote_identifier(&rel.junction_table),
                dialect.quote_identifier(&junction_alias),
                dialect.quote_identifier(&rel.reference_table),
                dialect.quote_identifier(&related_alias),
                dialect.quote_qualified(&related_alias, &rel.reference_pk),
                dialect.quote_qualified(&junction_alias, &rel.reference_column),
                dialect.quote_qualified(&junction_alias, &rel.source_column),
                dialect.quote_qualified(MAIN_ALIAS, &owner_key),
                dialect.quote_identifier(alias)
            ));
        }

        Outcome::Ok(select)
    }

    /// The row with primary key `key`, given in key-column order.
    ///
    /// A key of the wrong length is reported as `RowNotFound`.
    #[tracing::instrument(level = "debug", skip(self, cx, conn), fields(table = %self.meta.name))]
    pub async fn find<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        key: &[Value],
    ) -> Outcome<TableRow, Error> {
        let pk = self.meta.primary_key();
        let not_found = || {
            Error::RowNotFound(RowNotFoundError {
                table: self.meta.name.clone(),
                primary_key: pk.iter().cloned().zip(key.iter().cloned()).collect(),
            })
        };
        if pk.is_empty() || pk.len() != key.len() {
            tracing::warn!(
                expected = pk.len(),
                given = key.len(),
                "Primary key arity mismatch"
            );
            return Outcome::Err(not_found());
        }

        let select = pk
            .iter()
            .zip(key)
            .fold(Select::new(conn.dialect(), &self.meta.name, MAIN_ALIAS), |s, (c, v)| {
                s.filter_eq(c, v.clone())
            })
            .limit(1);
        let (sql, params) = select.build();

        match conn.query_one(cx, &sql, &params).await {
            Outcome::Ok(Some(row)) => Outcome::Ok(self.row_from_result(&row)),
            Outcome::Ok(None) => Outcome::Err(not_found()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// A new, unsaved row with literal column defaults applied.
    pub fn create_row(&self) -> TableRow {
        let values: HashMap<String, Value> = self
            .meta
            .columns()
            .iter()
            .filter_map(|c| c.default_value().map(|v| (c.name.clone(), v)))
            .collect();
        TableRow::new(Arc::clone(&self.meta), values)
    }

    /// A persisted row from a query result of this table.
    pub fn row_from_result(&self, row: &Row) -> TableRow {
        TableRow::from_result(Arc::clone(&self.meta), row)
    }

    /// Fields for every column plus one per `has_many` alias.
    ///
    /// Relationship fields read the aggregated titles produced by
    /// [`Table::select_admin_listing`].
    #[allow(clippy::result_large_err)]
    pub fn default_fields(&self) -> Result<Fields> {
        let mut fields = Fields::new();
        for column in self.meta.columns() {
            fields.add_column(&self.meta, &column.name)?;
        }
        for (alias, _) in &self.has_many {
            let field = fields.add(Field::computed(alias.as_str()).with_model(&self.meta.name))?;
            for helper in [CellContent::ID, CsvCell::ID] {
                let column = alias.clone();
                field.assign(helper, move |row: &Row| {
                    Value::Text(
                        row.get_by_name(&column)
                            .map(Value::to_display_string)
                            .unwrap_or_default(),
                    )
                });
            }
            let column = alias.clone();
            field.assign(SortKey::ID, move |row: &Row| {
                Value::Text(
                    row.get_by_name(&column)
                        .map(|v| v.to_display_string().to_lowercase())
                        .unwrap_or_default(),
                )
            });
        }
        Ok(fields)
    }
}
