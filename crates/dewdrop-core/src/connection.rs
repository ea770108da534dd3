//! Database adapter traits.
//!
//! - [`Connection`] executes queries and opens transactions
//! - [`TransactionOps`] is the transactional subset used for junction-table writes
//!
//! All operations take asupersync's `Cx` so the adapter can observe
//! cancellation and budgets. Dewdrop awaits each call inline; nothing is
//! spawned in the background.

use crate::dialect::Dialect;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};

/// A database connection supplied by the host.
///
/// Catalog queries (`PRAGMA`, `information_schema`) go through [`Connection::query`]
/// like any other statement.
///
/// # Example
///
/// ```rust,ignore
/// let rows = conn.query(&cx, "SELECT * FROM products WHERE id = $1", &[Value::Int(1)]).await;
///
/// let tx = conn.begin(&cx).await?;
/// tx.execute(&cx, "DELETE FROM product_tags WHERE product_id = $1", &[Value::Int(1)]).await?;
/// tx.commit(&cx).await?;
/// ```
pub trait Connection: Send + Sync {
    /// The transaction type returned by this connection.
    type Tx<'conn>: TransactionOps
    where
        Self: 'conn;

    /// SQL dialect spoken by this connection.
    fn dialect(&self) -> Dialect;

    /// Execute a query and return all rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, crate::Error>> + Send;

    /// Execute a query and return the first row, if any.
    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, crate::Error>> + Send;

    /// Execute a statement (INSERT, UPDATE, DELETE) and return rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, crate::Error>> + Send;

    /// Execute an INSERT and return the last inserted ID.
    ///
    /// For PostgreSQL this typically uses RETURNING. The exact behavior
    /// depends on the adapter.
    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, crate::Error>> + Send;

    /// Begin a transaction.
    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, crate::Error>> + Send;
}

/// Operations available inside a transaction.
///
/// Transactions must be explicitly committed or rolled back.
pub trait TransactionOps: Send {
    /// Execute a query within this transaction.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, crate::Error>> + Send;

    /// Execute a statement within this transaction.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, crate::Error>> + Send;

    /// Commit the transaction, making all changes permanent.
    fn commit(self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send;

    /// Rollback the transaction, discarding all changes.
    fn rollback(self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send;
}
