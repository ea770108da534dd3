//! Shared fixtures: a recording in-memory connection and a shop schema.

#![allow(dead_code)]

use asupersync::runtime::RuntimeBuilder;
use asupersync::{Cx, Outcome, PanicPayload};
use dewdrop::{ColumnMetadata, MetadataCache, TableMetadata};
use dewdrop_core::error::QueryError;
use dewdrop_core::{
    Config, Connection, Dialect, Error, QueryErrorKind, RequestContext, Row, StaticEnvironment,
    TransactionOps, UserContext, Value,
};
use std::sync::{Arc, LazyLock, Mutex};

static ADMIN_ENV: LazyLock<StaticEnvironment> =
    LazyLock::new(|| StaticEnvironment::new(Config::default(), "/admin"));
static GUEST: LazyLock<UserContext> = LazyLock::new(UserContext::anonymous);

/// An anonymous request against an unprefixed schema.
pub fn guest() -> RequestContext<'static> {
    RequestContext::new(&*ADMIN_ENV, &GUEST)
}

#[derive(Default)]
pub struct MockState {
    /// Every statement seen, in order; transactions log BEGIN/COMMIT/ROLLBACK.
    pub log: Vec<(String, Vec<Value>)>,
    /// Catalog table names answered to `sqlite_master` queries.
    pub tables: Vec<String>,
    /// (sql fragment, rows): the first fragment contained in a query wins.
    pub responses: Vec<(String, Vec<Row>)>,
    /// Writes whose SQL contains this fragment fail with a constraint error.
    pub fail_when: Option<String>,
    /// Writes whose SQL contains this fragment panic.
    pub panic_when: Option<String>,
    /// Rows affected reported by writes.
    pub affected: u64,
    pub next_id: i64,
}

#[derive(Clone)]
pub struct MockConnection {
    pub state: Arc<Mutex<MockState>>,
}

fn constraint_error(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Constraint,
        sql: Some(sql.to_string()),
        sqlstate: Some("23505".to_string()),
        message: "UNIQUE constraint failed".to_string(),
    })
}

impl MockState {
    fn record(&mut self, sql: &str, params: &[Value]) {
        self.log.push((sql.to_string(), params.to_vec()));
    }

    fn answer(&mut self, sql: &str, params: &[Value]) -> Vec<Row> {
        self.record(sql, params);
        if sql.contains("sqlite_master") {
            return self
                .tables
                .iter()
                .map(|t| Row::new(vec!["name".into()], vec![Value::Text(t.clone())]))
                .collect();
        }
        self.responses
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }

    fn write(&mut self, sql: &str, params: &[Value]) -> Outcome<u64, Error> {
        self.record(sql, params);
        let hit = |fragment: &Option<String>| fragment.as_deref().is_some_and(|f| sql.contains(f));
        if hit(&self.panic_when) {
            Outcome::Panicked(PanicPayload::new(format!("adapter panicked on: {sql}")))
        } else if hit(&self.fail_when) {
            Outcome::Err(constraint_error(sql))
        } else {
            Outcome::Ok(self.affected)
        }
    }
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                affected: 1,
                next_id: 100,
                ..MockState::default()
            })),
        }
    }

    pub fn respond(&self, fragment: &str, rows: Vec<Row>) {
        self.lock().responses.push((fragment.to_string(), rows));
    }

    pub fn fail_when(&self, fragment: &str) {
        self.lock().fail_when = Some(fragment.to_string());
    }

    pub fn panic_when(&self, fragment: &str) {
        self.lock().panic_when = Some(fragment.to_string());
    }

    pub fn set_affected(&self, affected: u64) {
        self.lock().affected = affected;
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    /// Logged SQL, without parameters.
    pub fn statements(&self) -> Vec<String> {
        self.lock().log.iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }
}

pub struct MockTx {
    state: Arc<Mutex<MockState>>,
}

impl TransactionOps for MockTx {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let rows = self.state.lock().expect("mock state poisoned").answer(sql, params);
        async move { Outcome::Ok(rows) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.state.lock().expect("mock state poisoned").write(sql, params);
        async move { result }
    }

    fn commit(self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.state.lock().expect("mock state poisoned").record("COMMIT", &[]);
        async { Outcome::Ok(()) }
    }

    fn rollback(self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.state.lock().expect("mock state poisoned").record("ROLLBACK", &[]);
        async { Outcome::Ok(()) }
    }
}

impl Connection for MockConnection {
    type Tx<'conn>
        = MockTx
    where
        Self: 'conn;

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let rows = self.lock().answer(sql, params);
        async move { Outcome::Ok(rows) }
    }

    fn query_one(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let row = self.lock().answer(sql, params).into_iter().next();
        async move { Outcome::Ok(row) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.lock().write(sql, params);
        async move { result }
    }

    fn insert(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        let mut state = self.lock();
        let result = match state.write(sql, params) {
            Outcome::Ok(_) => {
                state.next_id += 1;
                Outcome::Ok(state.next_id)
            }
            other => other.map(|n| i64::try_from(n).unwrap_or_default()),
        };
        drop(state);
        async move { result }
    }

    fn begin(&self, _cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        self.lock().record("BEGIN", &[]);
        let tx = MockTx {
            state: Arc::clone(&self.state),
        };
        async move { Outcome::Ok(tx) }
    }
}

pub fn run<F: Future<Output = ()>>(f: impl FnOnce(Cx) -> F) {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(f(cx));
}

pub fn unwrap_outcome<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        other => std::panic::panic_any(format!("unexpected outcome: {other:?}")),
    }
}

pub fn unwrap_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => std::panic::panic_any(format!("expected error, got: {other:?}")),
    }
}

pub fn row(names: &[&str], values: Vec<Value>) -> Row {
    Row::new(names.iter().map(|n| (*n).to_string()).collect(), values)
}

fn id() -> ColumnMetadata {
    ColumnMetadata::new("id", "INTEGER").primary_key(1).identity()
}

/// `shop_schema` with every table and reference renamed under `prefix`.
pub fn prefixed_shop_schema(prefix: &str) -> Vec<TableMetadata> {
    shop_schema()
        .into_iter()
        .map(|table| {
            let columns = table
                .columns()
                .iter()
                .cloned()
                .map(|mut column| {
                    if let Some(r) = column.references.as_mut() {
                        r.table = format!("{prefix}{}", r.table);
                    }
                    column
                })
                .collect();
            TableMetadata::new(format!("{prefix}{}", table.name), columns)
        })
        .collect()
}

/// products -> categories, products <-> tags through product_tags,
/// cities -> states.
pub fn shop_schema() -> Vec<TableMetadata> {
    vec![
        TableMetadata::new(
            "categories",
            vec![id(), ColumnMetadata::new("name", "TEXT").not_null()],
        ),
        TableMetadata::new(
            "products",
            vec![
                id(),
                ColumnMetadata::new("name", "TEXT").not_null(),
                ColumnMetadata::new("price", "INTEGER"),
                ColumnMetadata::new("status", "TEXT").default_expr("'draft'"),
                ColumnMetadata::new("category_id", "INTEGER").references("categories", "id"),
            ],
        ),
        TableMetadata::new("tags", vec![id(), ColumnMetadata::new("label", "TEXT")]),
        TableMetadata::new(
            "product_tags",
            vec![
                ColumnMetadata::new("product_id", "INTEGER")
                    .primary_key(1)
                    .references("products", "id"),
                ColumnMetadata::new("tag_id", "INTEGER")
                    .primary_key(2)
                    .references("tags", "id"),
            ],
        ),
        TableMetadata::new(
            "states",
            vec![id(), ColumnMetadata::new("state_name", "TEXT")],
        ),
        TableMetadata::new(
            "cities",
            vec![
                id(),
                ColumnMetadata::new("city_name", "TEXT"),
                ColumnMetadata::new("state_id", "INTEGER").references("states", "id"),
            ],
        ),
    ]
}

/// A cache seeded with `tables` and a connection whose catalog lists them.
pub fn seeded(tables: Vec<TableMetadata>) -> (MockConnection, MetadataCache) {
    let conn = MockConnection::new();
    let cache = MetadataCache::new();
    {
        let mut state = conn.lock();
        state.tables = tables.iter().map(|t| t.name.clone()).collect();
    }
    for table in tables {
        cache.insert(table);
    }
    (conn, cache)
}
