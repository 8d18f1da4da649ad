//! Schema binding and identity caching for SQLite-backed record types.
//!
//! A host type implements [`Record`], is bound to a table through
//! [`Orm::bind`] or [`Repository::bind`], and is then saved, fetched and
//! evicted through the returned repository. Fetching the same row twice
//! yields the same [`Shared`] instance until it is released or deleted.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod schema;

pub use db::{
    DbError, DbResult, Driver, DriverConfig, ExecutionResult, Params, Query, Row, SqliteDriver,
    Statement, Value,
};
pub use logging::{default_log_level, init_logging, logging_status, LogConfig, LoggingError};
pub use model::attributes::{Attribute, AttributeMap, SchemaError, ID_COLUMN};
pub use model::record::{shared, Record, RowEncoding, RowId, Shared};
pub use repo::identity_map::IdentityMap;
pub use repo::registry::Orm;
pub use repo::repository::{BindOptions, EvictionPolicy, Repository};
pub use repo::{OrmError, OrmResult};
pub use schema::statements::StatementCache;

/// Returns the crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
