//! SELECT statement builder for admin listings.

use asupersync::{Cx, Outcome};
use dewdrop_core::{Connection, Dialect, Error, Row, Value};

/// Sort direction for ORDER BY and in-memory sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A SELECT query over one aliased table.
///
/// Column expressions and joins are raw SQL fragments produced by the table
/// model; filter values are bound as parameters in the connection's dialect.
#[derive(Debug, Clone)]
pub struct Select {
    dialect: Dialect,
    table: String,
    alias: String,
    /// Column expressions (empty = `alias.*`)
    columns: Vec<String>,
    joins: Vec<String>,
    conditions: Vec<String>,
    params: Vec<Value>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Select {
    /// Create a new SELECT from `table AS alias`.
    pub fn new(dialect: Dialect, table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            alias: alias.into(),
            columns: Vec::new(),
            joins: Vec::new(),
            conditions: Vec::new(),
            params: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Add a raw column expression.
    pub fn column(mut self, expr: impl Into<String>) -> Self {
        self.columns.push(expr.into());
        self
    }

    /// Add a raw JOIN clause (`LEFT JOIN ... ON ...`).
    pub fn join(mut self, clause: impl Into<String>) -> Self {
        self.joins.push(clause.into());
        self
    }

    /// Add `alias.column = value`, ANDed with earlier conditions.
    pub fn filter_eq(mut self, column: &str, value: Value) -> Self {
        let placeholder = self.dialect.placeholder(self.params.len() + 1);
        let column = self.dialect.quote_qualified(&self.alias, column);
        self.conditions.push(format!("{column} = {placeholder}"));
        self.params.push(value);
        self
    }

    /// Order by `alias.column`.
    pub fn order_by(mut self, column: &str, direction: SortDirection) -> Self {
        self.order_by.push(format!(
            "{} {}",
            self.dialect.quote_qualified(&self.alias, column),
            direction.as_sql()
        ));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Number of column expressions added so far.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Build the SQL and its parameters.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut sql = String::from("SELECT ");

        let table_alias = self.dialect.quote_identifier(&self.alias);
        let mut columns = vec![format!("{table_alias}.*")];
        columns.extend(self.columns.iter().cloned());
        sql.push_str(&columns.join(", "));

        sql.push_str(" FROM ");
        sql.push_str(&self.dialect.quote_identifier(&self.table));
        sql.push_str(" AS ");
        sql.push_str(&table_alias);

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }

        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        (sql, self.params.clone())
    }

    /// Execute the query and return all rows.
    #[tracing::instrument(level = "debug", skip(self, cx, conn), fields(table = %self.table))]
    pub async fn all<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<Vec<Row>, Error> {
        let (sql, params) = self.build();
        tracing::trace!(sql = %sql, params = params.len(), "Executing SELECT");
        conn.query(cx, &sql, &params).await
    }
}
