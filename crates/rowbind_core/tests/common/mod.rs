#![allow(dead_code)]

use rowbind_core::{
    AttributeMap, DbError, DbResult, Driver, ExecutionResult, OrmResult, Params, Query, Record,
    Row, RowEncoding, RowId, SqliteDriver, Statement,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Default)]
pub struct Dummy {
    pub id: RowId,
    pub text: String,
}

impl Dummy {
    pub fn new(text: &str) -> Self {
        Self {
            id: RowId::Transient,
            text: text.to_string(),
        }
    }
}

impl Record for Dummy {
    fn encode_state(&self) -> RowEncoding {
        RowEncoding::new(self.id).with("text", self.text.as_str())
    }

    fn load_state(&mut self, encoding: &RowEncoding) -> OrmResult<()> {
        self.id = encoding.id();
        self.text = encoding.text("text")?.unwrap_or_default().to_string();
        Ok(())
    }
}

/// Later revision of `Dummy` declaring one more column.
#[derive(Debug, Default)]
pub struct RankedDummy {
    pub id: RowId,
    pub text: String,
    pub rank: Option<i64>,
}

impl Record for RankedDummy {
    fn encode_state(&self) -> RowEncoding {
        RowEncoding::new(self.id)
            .with("text", self.text.as_str())
            .with("rank", self.rank)
    }

    fn load_state(&mut self, encoding: &RowEncoding) -> OrmResult<()> {
        self.id = encoding.id();
        self.text = encoding.text("text")?.unwrap_or_default().to_string();
        self.rank = encoding.integer("rank")?;
        Ok(())
    }
}

pub fn dummy_attributes() -> AttributeMap {
    AttributeMap::new().column("text", "varchar(255)")
}

pub fn ranked_attributes() -> AttributeMap {
    AttributeMap::new()
        .column("text", "varchar(255)")
        .column("rank", "integer")
}

#[derive(Default)]
pub struct DriverStats {
    pub executes: Cell<usize>,
    pub fetch_one: Cell<usize>,
    pub fetch_all: Cell<usize>,
    pub for_each_row: Cell<usize>,
    pub prepares: Cell<usize>,
    /// Statements whose SQL starts with this prefix fail without running.
    pub fail_prefix: RefCell<Option<String>>,
}

impl DriverStats {
    pub fn fetches(&self) -> usize {
        self.fetch_one.get() + self.fetch_all.get() + self.for_each_row.get()
    }

    pub fn io_calls(&self) -> usize {
        self.executes.get() + self.fetches() + self.prepares.get()
    }

    pub fn fail_statements_starting_with(&self, prefix: &str) {
        *self.fail_prefix.borrow_mut() = Some(prefix.to_string());
    }

    pub fn stop_failing(&self) {
        *self.fail_prefix.borrow_mut() = None;
    }
}

/// `SqliteDriver` wrapper counting calls and injecting failures.
#[derive(Clone)]
pub struct CountingDriver {
    inner: SqliteDriver,
    pub stats: Rc<DriverStats>,
}

impl CountingDriver {
    pub fn new(inner: SqliteDriver) -> Self {
        Self {
            inner,
            stats: Rc::new(DriverStats::default()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(SqliteDriver::open_in_memory().unwrap())
    }

    fn check(&self, sql: &str) -> DbResult<()> {
        let failing = self
            .stats
            .fail_prefix
            .borrow()
            .as_deref()
            .is_some_and(|prefix| sql.starts_with(prefix));
        if failing {
            return Err(DbError::Worker(format!("injected failure for `{sql}`")));
        }
        Ok(())
    }
}

fn bump(counter: &Cell<usize>) {
    counter.set(counter.get() + 1);
}

impl Driver for CountingDriver {
    async fn execute(&self, query: Query, params: Params) -> DbResult<ExecutionResult> {
        bump(&self.stats.executes);
        self.check(query.sql())?;
        self.inner.execute(query, params).await
    }

    async fn fetch_one(&self, query: Query, params: Params) -> DbResult<Option<Row>> {
        bump(&self.stats.fetch_one);
        self.check(query.sql())?;
        self.inner.fetch_one(query, params).await
    }

    async fn fetch_all(&self, query: Query, params: Params) -> DbResult<Vec<Row>> {
        bump(&self.stats.fetch_all);
        self.check(query.sql())?;
        self.inner.fetch_all(query, params).await
    }

    async fn for_each_row<F>(&self, query: Query, params: Params, on_row: F) -> DbResult<usize>
    where
        F: FnMut(Row),
    {
        bump(&self.stats.for_each_row);
        self.check(query.sql())?;
        self.inner.for_each_row(query, params, on_row).await
    }

    async fn prepare(&self, sql: &str) -> DbResult<Statement> {
        bump(&self.stats.prepares);
        self.check(sql)?;
        self.inner.prepare(sql).await
    }
}

pub async fn row_count(driver: &impl Driver, table: &str) -> i64 {
    let row = driver
        .fetch_one(
            Query::Sql(format!("SELECT COUNT(*) AS n FROM {table}")),
            Params::None,
        )
        .await
        .unwrap()
        .unwrap();
    row.get("n").and_then(|value| value.as_integer()).unwrap()
}
