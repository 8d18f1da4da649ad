//! Generic repository binding one `Record` type to one table.
//!
//! # Responsibility
//! - Create the table, add declared columns and prepare DML on bind.
//! - Persist, fetch and evict instances while keeping the identity map in
//!   step with storage.
//!
//! # Invariants
//! - Attribute validation runs before any statement is issued.
//! - Only "column already exists" failures are tolerated while migrating.
//! - `RefCell` borrows of the identity map or an instance are never held
//!   across an `.await`.
//! - Fetch paths return the cached instance for a row id when one exists,
//!   reloading it in place.

use super::identity_map::IdentityMap;
use super::{OrmError, OrmResult};
use crate::db::{Driver, Params, Query, Row};
use crate::model::attributes::{AttributeMap, ID_COLUMN};
use crate::model::record::{shared, Record, RowEncoding, RowId, Shared};
use crate::schema::sql::{add_column_sql, bind_var_name, create_table_sql, truncate_sql};
use crate::schema::statements::StatementCache;
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

/// When `delete` drops the instance from the identity map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Evict only after the delete statement succeeded.
    #[default]
    AfterDelete,
    /// Evict before issuing the delete statement. A failed delete leaves the
    /// row stored but uncached.
    BeforeDelete,
}

/// Per-binding behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindOptions {
    pub eviction: EvictionPolicy,
}

/// Data access object for record type `T` over driver `D`.
pub struct Repository<T, D> {
    driver: D,
    table: String,
    attributes: AttributeMap,
    statements: StatementCache,
    identity: RefCell<IdentityMap<T>>,
    options: BindOptions,
}

impl<T: Record, D: Driver> Repository<T, D> {
    /// Binds `T` to `table`, creating and extending the table as needed.
    ///
    /// # Errors
    /// - `OrmError::Schema` when `attributes` is invalid; no statement runs.
    /// - `OrmError::Migration` when adding a column fails for a reason other
    ///   than the column already existing.
    /// - `OrmError::Db` when table creation or statement preparation fails.
    ///
    /// # Side effects
    /// - Emits `schema_bind` logging events with duration and status.
    pub async fn bind(
        driver: D,
        table: impl Into<String>,
        attributes: AttributeMap,
        options: BindOptions,
    ) -> OrmResult<Self> {
        let table = table.into();
        if let Err(err) = attributes.validate(&table) {
            error!(
                "event=schema_bind module=repo status=error table={} error_code=invalid_schema error={}",
                table, err
            );
            return Err(err.into());
        }

        let started_at = Instant::now();
        info!(
            "event=schema_bind module=repo status=start table={} columns={}",
            table,
            attributes.len()
        );

        match Self::prepare_table(&driver, &table, &attributes).await {
            Ok(statements) => {
                info!(
                    "event=schema_bind module=repo status=ok table={} duration_ms={}",
                    table,
                    started_at.elapsed().as_millis()
                );
                Ok(Self {
                    driver,
                    table,
                    attributes,
                    statements,
                    identity: RefCell::new(IdentityMap::new()),
                    options,
                })
            }
            Err(err) => {
                error!(
                    "event=schema_bind module=repo status=error table={} duration_ms={} error_code=bind_failed error={}",
                    table,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    async fn prepare_table(
        driver: &D,
        table: &str,
        attributes: &AttributeMap,
    ) -> OrmResult<StatementCache> {
        driver
            .execute(Query::Sql(create_table_sql(table)), Params::None)
            .await?;
        add_columns(driver, table, attributes).await?;
        Ok(StatementCache::prepare(driver, table, attributes).await?)
    }

    /// Inserts a transient instance or updates a persisted one.
    ///
    /// After an insert the instance is reloaded with its assigned id and
    /// registered in the identity map.
    pub async fn save(&self, instance: &Shared<T>) -> OrmResult<Shared<T>> {
        let mut encoding = encode(instance)?;

        if let Some(id) = encoding.id().persisted() {
            let result = self
                .statements
                .perform_update(&self.driver, &encoding)
                .await?;
            if result.changes == 0 {
                warn!(
                    "event=record_save module=repo status=no_rows op=update table={} id={}",
                    self.table, id
                );
            } else {
                debug!(
                    "event=record_save module=repo status=ok op=update table={} id={}",
                    self.table, id
                );
            }
            return Ok(Rc::clone(instance));
        }

        let result = self
            .statements
            .perform_insert(&self.driver, &encoding)
            .await?;
        let id = result.last_insert_id;
        debug!(
            "event=record_save module=repo status=ok op=insert table={} id={}",
            self.table, id
        );

        encoding.set_id(RowId::Persisted(id));
        self.identity
            .borrow_mut()
            .set(id, Some(Rc::clone(instance)));
        load(instance, &encoding)?;
        Ok(Rc::clone(instance))
    }

    /// Deletes a persisted instance's row and detaches the instance.
    ///
    /// A never-saved instance resolves immediately without I/O, keeping its
    /// transient id.
    pub async fn delete(&self, instance: &Shared<T>) -> OrmResult<Shared<T>> {
        let mut encoding = encode(instance)?;
        let Some(id) = encoding.id().persisted() else {
            debug!(
                "event=record_delete module=repo status=skipped table={} reason=not_persisted",
                self.table
            );
            return Ok(Rc::clone(instance));
        };

        if self.options.eviction == EvictionPolicy::BeforeDelete {
            self.identity.borrow_mut().set(id, None);
        }

        self.statements
            .perform_delete(&self.driver, &encoding)
            .await?;

        if self.options.eviction == EvictionPolicy::AfterDelete {
            self.identity.borrow_mut().set(id, None);
        }
        debug!(
            "event=record_delete module=repo status=ok table={} id={}",
            self.table, id
        );

        encoding.set_id(RowId::Detached);
        load(instance, &encoding)?;
        Ok(Rc::clone(instance))
    }

    /// Stops caching `instance` without touching storage.
    pub fn release(&self, instance: &Shared<T>) -> OrmResult<()> {
        let encoding = encode(instance)?;
        if let Some(id) = encoding.id().persisted() {
            self.identity.borrow_mut().set(id, None);
        }
        Ok(())
    }

    /// Fetches the first row of `query` through the identity map.
    pub async fn get(
        &self,
        query: impl Into<Query>,
        params: Params,
    ) -> OrmResult<Option<Shared<T>>> {
        let row = self.driver.fetch_one(query.into(), params).await?;
        row.map(|row| self.materialize(row)).transpose()
    }

    /// Fetches every row of `query`, preserving row order.
    pub async fn all(&self, query: impl Into<Query>, params: Params) -> OrmResult<Vec<Shared<T>>> {
        let rows = self.driver.fetch_all(query.into(), params).await?;
        rows.into_iter().map(|row| self.materialize(row)).collect()
    }

    /// Streams rows of `query` into `on_record` and resolves with the row
    /// count.
    ///
    /// The first row that fails to load stops further callbacks and is
    /// returned as the error once the driver finishes.
    pub async fn each<F>(
        &self,
        query: impl Into<Query>,
        params: Params,
        mut on_record: F,
    ) -> OrmResult<usize>
    where
        F: FnMut(Shared<T>),
    {
        let mut failure = None;
        let count = self
            .driver
            .for_each_row(query.into(), params, |row| {
                if failure.is_some() {
                    return;
                }
                match self.materialize(row) {
                    Ok(instance) => on_record(instance),
                    Err(err) => failure = Some(err),
                }
            })
            .await?;

        match failure {
            Some(err) => Err(err),
            None => Ok(count),
        }
    }

    /// Returns the cached instance for `id`, fetching it only on a miss.
    pub async fn get_by_id(&self, id: i64) -> OrmResult<Option<Shared<T>>> {
        let cached = self.identity.borrow().get(id);
        if let Some(instance) = cached {
            debug!(
                "event=identity_cache_hit module=repo table={} id={}",
                self.table, id
            );
            return Ok(Some(instance));
        }

        let statement = self.statements.select_by_id_statement().clone();
        self.get(statement, Params::named([(bind_var_name(ID_COLUMN), id)]))
            .await
    }

    /// Deletes every row, then drops every cached instance.
    ///
    /// Resolves with the number of deleted rows.
    pub async fn truncate(&self) -> OrmResult<usize> {
        let result = self
            .driver
            .execute(Query::Sql(truncate_sql(&self.table)), Params::None)
            .await?;
        let cleared = self.identity.borrow_mut().clear();
        info!(
            "event=table_truncate module=repo status=ok table={} rows={} cleared={}",
            self.table, result.changes, cleared
        );
        Ok(result.changes)
    }

    /// Drops every cached instance without touching storage.
    pub fn release_all(&self) -> usize {
        self.identity.borrow_mut().clear()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    pub fn statements(&self) -> &StatementCache {
        &self.statements
    }

    pub fn options(&self) -> BindOptions {
        self.options
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn is_cached(&self, id: i64) -> bool {
        self.identity.borrow().contains(id)
    }

    pub fn cached_len(&self) -> usize {
        self.identity.borrow().len()
    }

    fn materialize(&self, row: Row) -> OrmResult<Shared<T>> {
        let encoding = RowEncoding::from_row(row)?;
        let Some(id) = encoding.id().persisted() else {
            return Err(OrmError::InvalidData(format!(
                "row fetched for `{}` has no integer `{ID_COLUMN}` column",
                self.table
            )));
        };

        let cached = self.identity.borrow().get(id);
        if let Some(instance) = cached {
            load(&instance, &encoding)?;
            return Ok(instance);
        }

        // A fresh instance is registered only once it loaded cleanly.
        let fresh = shared(T::default());
        load(&fresh, &encoding)?;
        self.identity.borrow_mut().set(id, Some(Rc::clone(&fresh)));
        Ok(fresh)
    }
}

/// Issues every `ADD COLUMN` concurrently and waits for all of them.
async fn add_columns<D: Driver>(
    driver: &D,
    table: &str,
    attributes: &AttributeMap,
) -> OrmResult<()> {
    let additions = add_column_sql(table, attributes);
    let outcomes = join_all(
        additions
            .iter()
            .map(|(_, sql)| driver.execute(Query::Sql(sql.clone()), Params::None)),
    )
    .await;

    let mut first_failure = None;
    for ((column, _), outcome) in additions.into_iter().zip(outcomes) {
        match outcome {
            Ok(_) => debug!(
                "event=schema_add_column module=repo status=ok table={} column={}",
                table, column
            ),
            Err(err) if err.is_duplicate_column() => warn!(
                "event=schema_add_column module=repo status=skipped table={} column={} reason=already_exists",
                table, column
            ),
            Err(err) => {
                error!(
                    "event=schema_add_column module=repo status=error table={} column={} error={}",
                    table, column, err
                );
                if first_failure.is_none() {
                    first_failure = Some(OrmError::Migration {
                        table: table.to_string(),
                        column,
                        source: err,
                    });
                }
            }
        }
    }

    match first_failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn encode<T: Record>(instance: &Shared<T>) -> OrmResult<RowEncoding> {
    let record = instance
        .try_borrow()
        .map_err(|_| OrmError::InstanceBorrowed)?;
    Ok(record.encode_state())
}

fn load<T: Record>(instance: &Shared<T>, encoding: &RowEncoding) -> OrmResult<()> {
    let mut record = instance
        .try_borrow_mut()
        .map_err(|_| OrmError::InstanceBorrowed)?;
    record.load_state(encoding)
}
