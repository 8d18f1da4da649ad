//! rusqlite-backed `Driver` implementation.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections and apply connection settings.
//! - Run every statement on tokio's blocking pool behind one connection lock.
//! - Translate SQLite failures into `DbError` variants callers can classify.
//!
//! # Invariants
//! - `Query::Prepared` statements go through the connection's
//!   prepared-statement cache; raw SQL is compiled per call.
//! - Named parameters must exist in the statement text.

use super::driver::{Driver, ExecutionResult, Query, Statement};
use super::value::{Params, Row, Value};
use super::{DbError, DbResult};
use log::{debug, error, info};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DUPLICATE_COLUMN_MESSAGE_PREFIX: &str = "duplicate column name: ";

/// Connection settings applied when a `SqliteDriver` opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// How long SQLite waits on a locked database before failing.
    pub busy_timeout: Duration,
    pub foreign_keys: bool,
    /// Capacity of the connection's prepared-statement cache.
    pub statement_cache_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            foreign_keys: true,
            statement_cache_capacity: 32,
        }
    }
}

/// SQLite driver sharing one connection between clones.
#[derive(Clone)]
pub struct SqliteDriver {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDriver {
    /// Opens a SQLite database file with default settings.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::open_with(path, &DriverConfig::default())
    }

    /// Opens a SQLite database file.
    ///
    /// # Side effects
    /// - Emits `db_open` logging events with duration and status.
    pub fn open_with(path: impl AsRef<Path>, config: &DriverConfig) -> DbResult<Self> {
        let started_at = Instant::now();
        info!("event=db_open module=db status=start mode=file");
        Self::finish_open(Connection::open(path), config, "file", started_at)
    }

    /// Opens a private in-memory database with default settings.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::open_in_memory_with(&DriverConfig::default())
    }

    pub fn open_in_memory_with(config: &DriverConfig) -> DbResult<Self> {
        let started_at = Instant::now();
        info!("event=db_open module=db status=start mode=memory");
        Self::finish_open(Connection::open_in_memory(), config, "memory", started_at)
    }

    fn finish_open(
        opened: rusqlite::Result<Connection>,
        config: &DriverConfig,
        mode: &str,
        started_at: Instant,
    ) -> DbResult<Self> {
        let conn = match opened {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                    mode,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        match configure_connection(&conn, config) {
            Ok(()) => {
                info!(
                    "event=db_open module=db status=ok mode={} duration_ms={}",
                    mode,
                    started_at.elapsed().as_millis()
                );
                Ok(Self {
                    conn: Arc::new(Mutex::new(conn)),
                })
            }
            Err(err) => {
                error!(
                    "event=db_open module=db status=error mode={} duration_ms={} error_code=db_configure_failed error={}",
                    mode,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn spawn<R, F>(&self, op: F) -> JoinHandle<DbResult<R>>
    where
        R: Send + 'static,
        F: FnOnce(&Connection) -> DbResult<R> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| DbError::ConnectionPoisoned)?;
            op(&*guard).map_err(classify_error)
        })
    }

    async fn run<R, F>(&self, op: F) -> DbResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&Connection) -> DbResult<R> + Send + 'static,
    {
        join_worker(self.spawn(op)).await
    }

    /// Runs a semicolon-separated batch of statements without parameters.
    pub async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let started_at = Instant::now();
        let sql = sql.to_string();
        let result = self
            .run(move |conn| conn.execute_batch(&sql).map_err(DbError::from))
            .await;
        log_outcome("statement_execute_batch", false, started_at, &result);
        result
    }
}

impl Driver for SqliteDriver {
    async fn execute(&self, query: Query, params: Params) -> DbResult<ExecutionResult> {
        let started_at = Instant::now();
        let prepared = query.is_prepared();
        let result = self
            .run(move |conn| {
                with_statement(conn, &query, |stmt| {
                    bind_params(stmt, &params)?;
                    let changes = stmt.raw_execute()?;
                    Ok(ExecutionResult {
                        last_insert_id: conn.last_insert_rowid(),
                        changes,
                    })
                })
            })
            .await;
        log_outcome("statement_execute", prepared, started_at, &result);
        result
    }

    async fn fetch_one(&self, query: Query, params: Params) -> DbResult<Option<Row>> {
        let started_at = Instant::now();
        let prepared = query.is_prepared();
        let result = self
            .run(move |conn| {
                with_statement(conn, &query, |stmt| {
                    let mut first = None;
                    visit_rows(stmt, &params, |row| {
                        first = Some(row);
                        false
                    })?;
                    Ok(first)
                })
            })
            .await;
        log_outcome("statement_fetch_one", prepared, started_at, &result);
        result
    }

    async fn fetch_all(&self, query: Query, params: Params) -> DbResult<Vec<Row>> {
        let started_at = Instant::now();
        let prepared = query.is_prepared();
        let result = self
            .run(move |conn| {
                with_statement(conn, &query, |stmt| {
                    let mut rows = Vec::new();
                    visit_rows(stmt, &params, |row| {
                        rows.push(row);
                        true
                    })?;
                    Ok(rows)
                })
            })
            .await;
        log_outcome("statement_fetch_all", prepared, started_at, &result);
        result
    }

    async fn for_each_row<F>(&self, query: Query, params: Params, mut on_row: F) -> DbResult<usize>
    where
        F: FnMut(Row),
    {
        let started_at = Instant::now();
        let prepared = query.is_prepared();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let worker = self.spawn(move |conn| {
            with_statement(conn, &query, |stmt| {
                visit_rows(stmt, &params, |row| sender.send(row).is_ok())
            })
        });

        while let Some(row) = receiver.recv().await {
            on_row(row);
        }

        let result = join_worker(worker).await;
        log_outcome("statement_for_each_row", prepared, started_at, &result);
        result
    }

    async fn prepare(&self, sql: &str) -> DbResult<Statement> {
        let started_at = Instant::now();
        let sql = sql.to_string();
        let result = self
            .run(move |conn| {
                conn.prepare_cached(&sql)?;
                Ok(Statement::new(sql))
            })
            .await;
        log_outcome("statement_prepare", true, started_at, &result);
        result
    }
}

fn configure_connection(conn: &Connection, config: &DriverConfig) -> DbResult<()> {
    let pragma = if config.foreign_keys {
        "PRAGMA foreign_keys = ON;"
    } else {
        "PRAGMA foreign_keys = OFF;"
    };
    conn.execute_batch(pragma)?;
    conn.busy_timeout(config.busy_timeout)?;
    conn.set_prepared_statement_cache_capacity(config.statement_cache_capacity);
    Ok(())
}

async fn join_worker<R>(worker: JoinHandle<DbResult<R>>) -> DbResult<R> {
    match worker.await {
        Ok(result) => result,
        Err(err) => Err(DbError::Worker(err.to_string())),
    }
}

fn with_statement<R>(
    conn: &Connection,
    query: &Query,
    op: impl FnOnce(&mut rusqlite::Statement<'_>) -> DbResult<R>,
) -> DbResult<R> {
    match query {
        Query::Sql(sql) => {
            let mut stmt = conn.prepare(sql)?;
            op(&mut stmt)
        }
        Query::Prepared(statement) => {
            let mut stmt = conn.prepare_cached(statement.sql())?;
            op(&mut *stmt)
        }
    }
}

fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &Params) -> DbResult<()> {
    match params {
        Params::None => {}
        Params::Positional(values) => {
            for (offset, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(offset + 1, value)?;
            }
        }
        Params::Named(pairs) => {
            for (name, value) in pairs {
                let index = stmt
                    .parameter_index(name)?
                    .ok_or_else(|| DbError::UnknownParameter(name.clone()))?;
                stmt.raw_bind_parameter(index, value)?;
            }
        }
    }
    Ok(())
}

/// Streams result rows into `on_row` until it returns `false`.
fn visit_rows(
    stmt: &mut rusqlite::Statement<'_>,
    params: &Params,
    mut on_row: impl FnMut(Row) -> bool,
) -> DbResult<usize> {
    bind_params(stmt, params)?;

    // Column names are read after the first step; a statement re-prepared
    // after a schema change may expand `*` differently than at prepare time.
    let mut names: Option<Vec<String>> = None;
    let mut rows = stmt.raw_query();
    let mut count = 0;
    while let Some(row) = rows.next()? {
        let names = names.get_or_insert_with(|| {
            row.as_ref()
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect()
        });
        let mut columns = Vec::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            columns.push((name.clone(), Value::from(row.get_ref(index)?)));
        }
        count += 1;
        if !on_row(Row::from_columns(columns)) {
            break;
        }
    }

    Ok(count)
}

fn classify_error(err: DbError) -> DbError {
    match err {
        DbError::Sqlite(rusqlite::Error::SqliteFailure(code, Some(message))) => {
            match message.strip_prefix(DUPLICATE_COLUMN_MESSAGE_PREFIX) {
                Some(column) => DbError::DuplicateColumn(column.trim().to_string()),
                None => DbError::Sqlite(rusqlite::Error::SqliteFailure(code, Some(message))),
            }
        }
        other => other,
    }
}

fn log_outcome<R>(event: &str, prepared: bool, started_at: Instant, result: &DbResult<R>) {
    match result {
        Ok(_) => debug!(
            "event={} module=db status=ok prepared={} duration_ms={}",
            event,
            prepared,
            started_at.elapsed().as_millis()
        ),
        Err(err) => debug!(
            "event={} module=db status=error prepared={} duration_ms={} error={}",
            event,
            prepared,
            started_at.elapsed().as_millis(),
            err
        ),
    }
}
