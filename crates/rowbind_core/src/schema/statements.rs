//! Prepared DML statements owned by one binding.
//!
//! # Invariants
//! - Statements are prepared once, after table and column DDL completed.
//! - Each execution binds only the variables its statement accepts, and
//!   only for columns the encoding actually carries.

use super::sql::{bind_var_name, delete_sql, insert_sql, select_by_id_sql, update_sql};
use crate::db::{DbResult, Driver, ExecutionResult, Params, Query, Statement, Value};
use crate::model::attributes::{AttributeMap, ID_COLUMN};
use crate::model::record::RowEncoding;
use log::debug;

/// Prepared statement plus the columns it binds.
#[derive(Debug, Clone)]
struct PreparedDml {
    statement: Statement,
    columns: Vec<String>,
}

impl PreparedDml {
    async fn prepare<D: Driver>(driver: &D, sql: String, columns: Vec<String>) -> DbResult<Self> {
        let statement = driver.prepare(&sql).await?;
        Ok(Self { statement, columns })
    }

    fn bind(&self, encoding: &RowEncoding) -> Params {
        let mut pairs = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            if column == ID_COLUMN {
                if let Some(id) = encoding.id().persisted() {
                    pairs.push((bind_var_name(column), Value::Integer(id)));
                }
            } else if let Some(value) = encoding.get(column) {
                pairs.push((bind_var_name(column), value.clone()));
            }
        }
        Params::Named(pairs)
    }

    async fn run<D: Driver>(
        &self,
        driver: &D,
        kind: &str,
        encoding: &RowEncoding,
    ) -> DbResult<ExecutionResult> {
        let params = self.bind(encoding);
        debug!(
            "event=dml_run module=schema statement={} bound={}",
            kind,
            params.len()
        );
        driver
            .execute(Query::Prepared(self.statement.clone()), params)
            .await
    }
}

/// Insert, update, delete and select-by-id statements for one table.
#[derive(Debug, Clone)]
pub struct StatementCache {
    insert: PreparedDml,
    update: PreparedDml,
    delete: PreparedDml,
    select_by_id: Statement,
}

impl StatementCache {
    /// Prepares every statement for `table`.
    pub async fn prepare<D: Driver>(
        driver: &D,
        table: &str,
        attributes: &AttributeMap,
    ) -> DbResult<Self> {
        let columns: Vec<String> = attributes.names().map(str::to_string).collect();
        let mut update_columns = columns.clone();
        update_columns.push(ID_COLUMN.to_string());

        let insert = PreparedDml::prepare(driver, insert_sql(table, attributes), columns).await?;
        let update =
            PreparedDml::prepare(driver, update_sql(table, attributes), update_columns).await?;
        let delete =
            PreparedDml::prepare(driver, delete_sql(table), vec![ID_COLUMN.to_string()]).await?;
        let select_by_id = driver.prepare(&select_by_id_sql(table)).await?;

        Ok(Self {
            insert,
            update,
            delete,
            select_by_id,
        })
    }

    /// Resolves with the driver-assigned row id in `last_insert_id`.
    pub async fn perform_insert<D: Driver>(
        &self,
        driver: &D,
        encoding: &RowEncoding,
    ) -> DbResult<ExecutionResult> {
        self.insert.run(driver, "insert", encoding).await
    }

    pub async fn perform_update<D: Driver>(
        &self,
        driver: &D,
        encoding: &RowEncoding,
    ) -> DbResult<ExecutionResult> {
        self.update.run(driver, "update", encoding).await
    }

    pub async fn perform_delete<D: Driver>(
        &self,
        driver: &D,
        encoding: &RowEncoding,
    ) -> DbResult<ExecutionResult> {
        self.delete.run(driver, "delete", encoding).await
    }

    pub fn insert_statement(&self) -> &Statement {
        &self.insert.statement
    }

    pub fn update_statement(&self) -> &Statement {
        &self.update.statement
    }

    pub fn delete_statement(&self) -> &Statement {
        &self.delete.statement
    }

    pub fn select_by_id_statement(&self) -> &Statement {
        &self.select_by_id
    }
}
