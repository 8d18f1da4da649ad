//! Asynchronous statement-execution contract.

use super::value::{Params, Row};
use super::DbResult;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Handle to a statement prepared by a driver.
///
/// The handle is cheap to clone and stays valid for the lifetime of the
/// driver that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Statement {
    sql: Arc<str>,
}

impl Statement {
    pub fn new(sql: impl Into<Arc<str>>) -> Self {
        Self { sql: sql.into() }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)
    }
}

/// First argument of every fetch/execute call: raw SQL text or a prepared
/// statement handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Sql(String),
    Prepared(Statement),
}

impl Query {
    pub fn sql(&self) -> &str {
        match self {
            Self::Sql(sql) => sql.as_str(),
            Self::Prepared(statement) => statement.sql(),
        }
    }

    pub fn is_prepared(&self) -> bool {
        matches!(self, Self::Prepared(_))
    }
}

impl From<&str> for Query {
    fn from(value: &str) -> Self {
        Self::Sql(value.to_string())
    }
}

impl From<String> for Query {
    fn from(value: String) -> Self {
        Self::Sql(value)
    }
}

impl From<Statement> for Query {
    fn from(value: Statement) -> Self {
        Self::Prepared(value)
    }
}

impl From<&Statement> for Query {
    fn from(value: &Statement) -> Self {
        Self::Prepared(value.clone())
    }
}

/// Outcome of a side-effect statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionResult {
    /// Row id assigned by the most recent successful insert on the connection.
    pub last_insert_id: i64,
    /// Rows inserted, updated or deleted by this statement.
    pub changes: usize,
}

/// Statement execution engine consumed by repositories.
///
/// Implementations decide where blocking work runs; callers only rely on
/// each future eventually resolving with a value or a `DbError`.
#[allow(async_fn_in_trait)]
pub trait Driver {
    /// Runs a statement for its side effect.
    async fn execute(&self, query: Query, params: Params) -> DbResult<ExecutionResult>;

    /// Returns the first result row, if any.
    async fn fetch_one(&self, query: Query, params: Params) -> DbResult<Option<Row>>;

    /// Returns every result row in result-set order.
    async fn fetch_all(&self, query: Query, params: Params) -> DbResult<Vec<Row>>;

    /// Invokes `on_row` once per result row and resolves with the row count.
    async fn for_each_row<F>(&self, query: Query, params: Params, on_row: F) -> DbResult<usize>
    where
        F: FnMut(Row);

    /// Compiles `sql` once so later executions can reuse it.
    async fn prepare(&self, sql: &str) -> DbResult<Statement>;
}
