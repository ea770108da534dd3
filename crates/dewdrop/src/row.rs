//! Active-record rows.

use asupersync::{Cx, Outcome};
use dewdrop_core::error::FieldError;
use dewdrop_core::{Connection, Dialect, Error, Result, Row, RowNotFoundError, Value};
use dewdrop_schema::TableMetadata;
use std::collections::HashMap;
use std::sync::Arc;

/// Lifecycle of a [`TableRow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    /// Not yet inserted
    New,
    /// Persisted with no pending changes
    Clean,
    /// Persisted with pending changes
    Dirty,
}

/// One row of a table, tracking changes until saved.
#[derive(Debug, Clone)]
pub struct TableRow {
    table: Arc<TableMetadata>,
    values: HashMap<String, Value>,
    /// Changed columns, in the order they were first changed
    dirty: Vec<String>,
    /// Primary key as last persisted; used to address UPDATE and DELETE
    persisted_key: Vec<Value>,
    state: RowState,
}

impl TableRow {
    /// A new, unsaved row.
    pub(crate) fn new(table: Arc<TableMetadata>, values: HashMap<String, Value>) -> Self {
        Self {
            table,
            values,
            dirty: Vec::new(),
            persisted_key: Vec::new(),
            state: RowState::New,
        }
    }

    /// A persisted row built from a query result.
    ///
    /// Result columns that the table does not have (joined titles,
    /// aggregates) are ignored.
    pub fn from_result(table: Arc<TableMetadata>, row: &Row) -> Self {
        let values: HashMap<String, Value> = row
            .iter()
            .filter(|(name, _)| table.has_column(name))
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        let mut this = Self {
            table,
            values,
            dirty: Vec::new(),
            persisted_key: Vec::new(),
            state: RowState::Clean,
        };
        this.persisted_key = this.primary_key_values();
        this
    }

    pub fn table(&self) -> &TableMetadata {
        &self.table
    }

    pub fn state(&self) -> RowState {
        self.state
    }

    pub fn is_new(&self) -> bool {
        self.state == RowState::New
    }

    pub fn is_dirty(&self) -> bool {
        self.state == RowState::Dirty
    }

    /// Columns changed since the row was loaded or last saved.
    pub fn dirty_columns(&self) -> &[String] {
        &self.dirty
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Set `column` to `value`.
    ///
    /// On a persisted row the column becomes dirty unless the value is
    /// unchanged.
    #[allow(clippy::result_large_err)]
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<()> {
        if !self.table.has_column(column) {
            return Err(Error::Field(FieldError::UnknownField {
                field: format!("{}.{}", self.table.name, column),
            }));
        }
        let value = value.into();
        if self.values.get(column) == Some(&value) {
            return Ok(());
        }
        self.values.insert(column.to_string(), value);
        if self.state != RowState::New {
            if !self.dirty.iter().any(|c| c == column) {
                self.dirty.push(column.to_string());
            }
            self.state = RowState::Dirty;
        }
        Ok(())
    }

    /// Current primary key values in key order; unset columns are NULL.
    pub fn primary_key_values(&self) -> Vec<Value> {
        self.table
            .primary_key()
            .iter()
            .map(|c| self.values.get(c).cloned().unwrap_or(Value::Null))
            .collect()
    }

    fn key_pairs(&self, key: &[Value]) -> Vec<(String, Value)> {
        self.table
            .primary_key()
            .iter()
            .cloned()
            .zip(key.iter().cloned())
            .collect()
    }

    fn where_primary_key(&self, dialect: Dialect, first_param: usize) -> String {
        self.table
            .primary_key()
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "{} = {}",
                    dialect.quote_identifier(c),
                    dialect.placeholder(first_param + i)
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    #[allow(clippy::result_large_err)]
    fn require_primary_key(&self) -> Result<()> {
        if self.table.primary_key().is_empty() {
            return Err(Error::metadata_unavailable(
                &self.table.name,
                "table has no primary key",
            ));
        }
        Ok(())
    }

    /// Persist the row.
    ///
    /// A new row is inserted with every set column; an identity key left
    /// unset is filled from the adapter's last insert id. A dirty row
    /// updates only its dirty columns. A clean row is left alone. Adapter
    /// failures surface as [`Error::SaveFailed`].
    #[tracing::instrument(level = "debug", skip(self, cx, conn), fields(table = %self.table.name))]
    pub async fn save<C: Connection>(&mut self, cx: &Cx, conn: &C) -> Outcome<(), Error> {
        match self.state {
            RowState::Clean => {
                tracing::trace!("Row is clean, nothing to save");
                Outcome::Ok(())
            }
            RowState::New => self.insert(cx, conn).await,
            RowState::Dirty => self.update(cx, conn).await,
        }
    }

    async fn insert<C: Connection>(&mut self, cx: &Cx, conn: &C) -> Outcome<(), Error> {
        let dialect = conn.dialect();
        let identity = self
            .table
            .columns()
            .iter()
            .find(|c| c.identity && self.values.get(&c.name).is_none_or(Value::is_null))
            .map(|c| c.name.clone());

        let (columns, params): (Vec<String>, Vec<Value>) = self
            .table
            .columns()
            .iter()
            .filter(|c| Some(&c.name) != identity.as_ref())
            .filter_map(|c| self.values.get(&c.name).map(|v| (c.name.clone(), v.clone())))
            .unzip();

        let sql = if columns.is_empty() {
            format!(
                "INSERT INTO {} DEFAULT VALUES",
                dialect.quote_identifier(&self.table.name)
            )
        } else {
            let placeholders: Vec<String> =
                (1..=columns.len()).map(|i| dialect.placeholder(i)).collect();
            let quoted: Vec<String> = columns.iter().map(|c| dialect.quote_identifier(c)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                dialect.quote_identifier(&self.table.name),
                quoted.join(", "),
                placeholders.join(", ")
            )
        };
        tracing::trace!(sql = %sql, "Inserting row");

        let outcome = match &identity {
            Some(_) => conn.insert(cx, &sql, &params).await,
            None => conn.execute(cx, &sql, &params).await.map(|_| 0),
        };
        let id = match outcome {
            Outcome::Ok(id) => id,
            Outcome::Err(e) => {
                tracing::warn!(error = %e, "Insert failed");
                return Outcome::Err(Error::save_failed(&self.table.name, e));
            }
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        if let Some(column) = identity {
            tracing::debug!(column = %column, id, "Identity assigned");
            self.values.insert(column, Value::BigInt(id));
        }
        self.mark_clean();
        Outcome::Ok(())
    }

    async fn update<C: Connection>(&mut self, cx: &Cx, conn: &C) -> Outcome<(), Error> {
        if let Err(e) = self.require_primary_key() {
            return Outcome::Err(e);
        }
        let dialect = conn.dialect();

        let mut params: Vec<Value> = Vec::with_capacity(self.dirty.len() + self.persisted_key.len());
        let mut assignments = Vec::with_capacity(self.dirty.len());
        for column in &self.dirty {
            params.push(self.values.get(column).cloned().unwrap_or(Value::Null));
            assignments.push(format!(
                "{} = {}",
                dialect.quote_identifier(column),
                dialect.placeholder(params.len())
            ));
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            dialect.quote_identifier(&self.table.name),
            assignments.join(", "),
            self.where_primary_key(dialect, params.len() + 1)
        );
        params.extend(self.persisted_key.iter().cloned());
        tracing::trace!(sql = %sql, dirty = ?self.dirty, "Updating row");

        match conn.execute(cx, &sql, &params).await {
            Outcome::Ok(0) => {
                let missing = Error::RowNotFound(RowNotFoundError {
                    table: self.table.name.clone(),
                    primary_key: self.key_pairs(&self.persisted_key),
                });
                Outcome::Err(Error::save_failed(&self.table.name, missing))
            }
            Outcome::Ok(_) => {
                self.mark_clean();
                Outcome::Ok(())
            }
            Outcome::Err(e) => {
                tracing::warn!(error = %e, "Update failed");
                Outcome::Err(Error::save_failed(&self.table.name, e))
            }
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    fn mark_clean(&mut self) {
        self.dirty.clear();
        self.persisted_key = self.primary_key_values();
        self.state = RowState::Clean;
    }

    /// Delete the persisted row by primary key.
    ///
    /// After a successful delete the row is [`RowState::New`] again and
    /// saving it re-inserts it.
    #[tracing::instrument(level = "debug", skip(self, cx, conn), fields(table = %self.table.name))]
    pub async fn delete<C: Connection>(&mut self, cx: &Cx, conn: &C) -> Outcome<(), Error> {
        if let Err(e) = self.require_primary_key() {
            return Outcome::Err(e);
        }
        let not_found = |row: &Self, key: &[Value]| {
            Error::RowNotFound(RowNotFoundError {
                table: row.table.name.clone(),
                primary_key: row.key_pairs(key),
            })
        };
        if self.is_new() {
            return Outcome::Err(not_found(self, &self.primary_key_values()));
        }

        let dialect = conn.dialect();
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            dialect.quote_identifier(&self.table.name),
            self.where_primary_key(dialect, 1)
        );
        tracing::trace!(sql = %sql, "Deleting row");

        match conn.execute(cx, &sql, &self.persisted_key).await {
            Outcome::Ok(0) => Outcome::Err(not_found(self, &self.persisted_key)),
            Outcome::Ok(_) => {
                self.dirty.clear();
                self.persisted_key.clear();
                self.state = RowState::New;
                Outcome::Ok(())
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}
