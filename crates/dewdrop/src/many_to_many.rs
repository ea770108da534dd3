//! Many-to-many relationships persisted through a junction table.

use asupersync::{Cx, Outcome};
use dewdrop_core::{Changes, Connection, Dialect, Error, TransactionOps, Value};
use dewdrop_schema::JunctionMapping;

/// A single junction-table write.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOp {
    /// Insert a junction row.
    Link {
        /// Junction table name.
        junction: String,
        /// Column referencing the owning row.
        source_column: String,
        /// Owning row's key.
        owner_key: Value,
        /// Column referencing the related row.
        reference_column: String,
        /// Related row's key.
        related_key: Value,
    },
    /// Delete a junction row.
    Unlink {
        /// Junction table name.
        junction: String,
        /// Column referencing the owning row.
        source_column: String,
        /// Owning row's key.
        owner_key: Value,
        /// Column referencing the related row.
        reference_column: String,
        /// Related row's key.
        related_key: Value,
    },
}

impl LinkOp {
    /// Whether this op inserts a junction row.
    pub fn is_link(&self) -> bool {
        matches!(self, LinkOp::Link { .. })
    }

    /// Whether this op deletes a junction row.
    pub fn is_unlink(&self) -> bool {
        matches!(self, LinkOp::Unlink { .. })
    }

    /// The related row's key.
    pub fn related_key(&self) -> &Value {
        match self {
            LinkOp::Link { related_key, .. } | LinkOp::Unlink { related_key, .. } => related_key,
        }
    }

    /// SQL and parameters for this op.
    pub fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        match self {
            LinkOp::Link {
                junction,
                source_column,
                owner_key,
                reference_column,
                related_key,
            } => (
                format!(
                    "INSERT INTO {} ({}, {}) VALUES ({}, {})",
                    dialect.quote_identifier(junction),
                    dialect.quote_identifier(source_column),
                    dialect.quote_identifier(reference_column),
                    dialect.placeholder(1),
                    dialect.placeholder(2)
                ),
                vec![owner_key.clone(), related_key.clone()],
            ),
            LinkOp::Unlink {
                junction,
                source_column,
                owner_key,
                reference_column,
                related_key,
            } => (
                format!(
                    "DELETE FROM {} WHERE {} = {} AND {} = {}",
                    dialect.quote_identifier(junction),
                    dialect.quote_identifier(source_column),
                    dialect.placeholder(1),
                    dialect.quote_identifier(reference_column),
                    dialect.placeholder(2)
                ),
                vec![owner_key.clone(), related_key.clone()],
            ),
        }
    }

    /// Execute this op inside `tx`.
    #[tracing::instrument(level = "debug", skip(cx, tx))]
    pub async fn execute<T: TransactionOps>(
        &self,
        cx: &Cx,
        tx: &T,
        dialect: Dialect,
    ) -> Outcome<(), Error> {
        let (sql, params) = self.to_sql(dialect);
        tracing::trace!(sql = %sql, "Executing junction write");
        tx.execute(cx, &sql, &params).await.map(|_| ())
    }
}

/// A resolved `has_many` relationship through a junction table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManyToManyRelationship {
    /// Alias the relationship was declared under
    pub alias: String,
    /// Owning table
    pub owner_table: String,
    /// Junction table
    pub junction_table: String,
    /// Junction column referencing the owning table
    pub source_column: String,
    /// Related table
    pub reference_table: String,
    /// Junction column referencing the related table
    pub reference_column: String,
    /// Column of the related table the junction points at
    pub reference_pk: String,
}

async fn rollback_quietly<T: TransactionOps>(cx: &Cx, tx: T) {
    match tx.rollback(cx).await {
        Outcome::Ok(()) => tracing::debug!("Junction transaction rolled back"),
        Outcome::Err(e) => tracing::warn!(error = %e, "Rollback failed"),
        Outcome::Cancelled(_) | Outcome::Panicked(_) => {
            tracing::warn!("Rollback did not complete");
        }
    }
}

impl ManyToManyRelationship {
    pub fn from_mapping(
        alias: impl Into<String>,
        owner_table: impl Into<String>,
        mapping: JunctionMapping,
    ) -> Self {
        Self {
            alias: alias.into(),
            owner_table: owner_table.into(),
            junction_table: mapping.junction_table,
            source_column: mapping.source_column,
            reference_table: mapping.reference_table,
            reference_column: mapping.reference_column,
            reference_pk: mapping.reference_pk,
        }
    }

    /// Related keys currently linked to `owner_key`.
    #[tracing::instrument(level = "debug", skip(self, cx, conn), fields(alias = %self.alias))]
    pub async fn load_initial_value<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        owner_key: &Value,
    ) -> Outcome<Vec<Value>, Error> {
        let dialect = conn.dialect();
        let reference = dialect.quote_identifier(&self.reference_column);
        let sql = format!(
            "SELECT {reference} FROM {} WHERE {} = {} ORDER BY {reference}",
            dialect.quote_identifier(&self.junction_table),
            dialect.quote_identifier(&self.source_column),
            dialect.placeholder(1),
        );
        conn.query(cx, &sql, std::slice::from_ref(owner_key))
            .await
            .map(|rows| {
                rows.iter()
                    .map(|row| row.get(0).cloned().unwrap_or(Value::Null))
                    .collect()
            })
    }

    /// Junction writes that turn `changes` into stored state: removals
    /// first, then additions.
    pub fn link_ops(&self, owner_key: &Value, changes: &Changes<Value>) -> Vec<LinkOp> {
        let unlinks = changes.removals().iter().map(|key| LinkOp::Unlink {
            junction: self.junction_table.clone(),
            source_column: self.source_column.clone(),
            owner_key: owner_key.clone(),
            reference_column: self.reference_column.clone(),
            related_key: key.clone(),
        });
        let links = changes.additions().iter().map(|key| LinkOp::Link {
            junction: self.junction_table.clone(),
            source_column: self.source_column.clone(),
            owner_key: owner_key.clone(),
            reference_column: self.reference_column.clone(),
            related_key: key.clone(),
        });
        unlinks.chain(links).collect()
    }

    /// Store the edit from `original` to `current` for `owner_key`.
    ///
    /// Every junction write runs in one transaction. On any failure the
    /// transaction is rolled back, the junction table is left as it was,
    /// and the failure surfaces as [`Error::SaveFailed`]. Keys compare with
    /// [`Value::same_key`], so `3` and `"3"` from a form are the same key.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, original, current), fields(alias = %self.alias))]
    pub async fn save<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        owner_key: &Value,
        original: Option<Vec<Value>>,
        current: Option<Vec<Value>>,
    ) -> Outcome<Changes<Value>, Error> {
        let changes = Changes::with_eq(original, current, Value::same_key);
        if changes.is_empty() {
            tracing::trace!("No junction changes");
            return Outcome::Ok(changes);
        }

        let ops = self.link_ops(owner_key, &changes);
        tracing::info!(
            additions = changes.additions().len(),
            removals = changes.removals().len(),
            "Saving many-to-many changes"
        );

        let dialect = conn.dialect();
        let tx = match conn.begin(cx).await {
            Outcome::Ok(tx) => tx,
            Outcome::Err(e) => return Outcome::Err(Error::save_failed(&self.junction_table, e)),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        for op in &ops {
            match op.execute(cx, &tx, dialect).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => {
                    tracing::warn!(error = %e, related_key = ?op.related_key(), "Junction write failed");
                    rollback_quietly(cx, tx).await;
                    return Outcome::Err(Error::save_failed(&self.junction_table, e));
                }
                Outcome::Cancelled(r) => {
                    rollback_quietly(cx, tx).await;
                    return Outcome::Cancelled(r);
                }
                Outcome::Panicked(p) => {
                    tracing::warn!(related_key = ?op.related_key(), "Junction write panicked");
                    rollback_quietly(cx, tx).await;
                    return Outcome::Panicked(p);
                }
            }
        }

        match tx.commit(cx).await {
            Outcome::Ok(()) => {
                tracing::debug!(writes = ops.len(), "Junction transaction committed");
                Outcome::Ok(changes)
            }
            Outcome::Err(e) => Outcome::Err(Error::save_failed(&self.junction_table, e)),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}
