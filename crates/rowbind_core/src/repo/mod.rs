//! Bound-type repositories, identity caching and the binding registry.
//!
//! # Responsibility
//! - Bind a `Record` type to a table and persist its instances.
//! - Keep one live instance per row through a per-binding identity map.
//!
//! # Invariants
//! - Every binding owns its own identity map and statement cache.
//! - Repository APIs return semantic errors (`Schema`, `Migration`,
//!   `InvalidData`) in addition to driver errors.

use crate::db::DbError;
use crate::model::attributes::SchemaError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod identity_map;
pub mod registry;
pub mod repository;

pub type OrmResult<T> = Result<T, OrmError>;

#[derive(Debug)]
pub enum OrmError {
    Schema(SchemaError),
    Db(DbError),
    /// An `ADD COLUMN` failed for a reason other than the column existing.
    Migration {
        table: String,
        column: String,
        source: DbError,
    },
    InvalidData(String),
    /// The host holds a conflicting `RefCell` borrow of the instance.
    InstanceBorrowed,
}

impl Display for OrmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schema(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Migration {
                table,
                column,
                source,
            } => write!(f, "failed to add column `{column}` to `{table}`: {source}"),
            Self::InvalidData(message) => write!(f, "invalid row data: {message}"),
            Self::InstanceBorrowed => write!(f, "record instance is already borrowed"),
        }
    }
}

impl Error for OrmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Schema(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Migration { source, .. } => Some(source),
            Self::InvalidData(_) => None,
            Self::InstanceBorrowed => None,
        }
    }
}

impl From<SchemaError> for OrmError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<DbError> for OrmError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}
