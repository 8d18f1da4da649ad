//! Statement execution seam and the bundled SQLite driver.
//!
//! # Responsibility
//! - Define the asynchronous `Driver` contract consumed by repositories.
//! - Provide a rusqlite-backed implementation with named `$param` binding.
//!
//! # Invariants
//! - Every driver call resolves to either a value or a `DbError`.
//! - A failed `ALTER TABLE ... ADD COLUMN` on an existing column surfaces as
//!   `DbError::DuplicateColumn`, never as a raw SQLite error.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod driver;
mod sqlite;
mod value;

pub use driver::{Driver, ExecutionResult, Query, Statement};
pub use sqlite::{DriverConfig, SqliteDriver};
pub use value::{Params, Row, Value};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// `ADD COLUMN` targeted a column the table already has.
    DuplicateColumn(String),
    /// A named bind variable does not appear in the statement text.
    UnknownParameter(String),
    ConnectionPoisoned,
    /// The blocking worker running a statement panicked or was cancelled.
    Worker(String),
}

impl DbError {
    pub fn is_duplicate_column(&self) -> bool {
        matches!(self, Self::DuplicateColumn(_))
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::DuplicateColumn(column) => write!(f, "duplicate column name: {column}"),
            Self::UnknownParameter(name) => {
                write!(f, "statement has no bind variable named `{name}`")
            }
            Self::ConnectionPoisoned => write!(f, "database connection lock is poisoned"),
            Self::Worker(message) => write!(f, "statement worker failed: {message}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::DuplicateColumn(_) => None,
            Self::UnknownParameter(_) => None,
            Self::ConnectionPoisoned => None,
            Self::Worker(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
