//! Record contract and the row encoding exchanged with repositories.
//!
//! # Responsibility
//! - Define what a host type implements to be bound to a table.
//! - Carry one row's data between records, SQL statements and fetched rows.
//!
//! # Invariants
//! - `RowId::Transient` (never stored) and `RowId::Detached` (deleted but
//!   still held) are distinct states; only `Persisted` carries a key.
//! - `load_state` overwrites the receiver in place.

use super::attributes::ID_COLUMN;
use crate::db::{Row, Value};
use crate::repo::{OrmError, OrmResult};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Live instance handle. Identity-map hits return clones of the same `Rc`.
pub type Shared<T> = Rc<RefCell<T>>;

/// Wraps a fresh, unsaved record in a `Shared` handle.
pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// Primary key state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RowId {
    /// Never written to storage.
    #[default]
    Transient,
    Persisted(i64),
    /// Row was deleted while the instance stayed alive.
    Detached,
}

impl RowId {
    pub fn persisted(self) -> Option<i64> {
        match self {
            Self::Persisted(id) => Some(id),
            Self::Transient | Self::Detached => None,
        }
    }

    pub fn is_persisted(self) -> bool {
        matches!(self, Self::Persisted(_))
    }

    pub fn is_transient(self) -> bool {
        matches!(self, Self::Transient)
    }

    pub fn is_detached(self) -> bool {
        matches!(self, Self::Detached)
    }

    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Integer(id) => Ok(Self::Persisted(*id)),
            Value::Null => Ok(Self::Detached),
            other => Err(OrmError::InvalidData(format!(
                "column `{ID_COLUMN}` holds a {} value, expected integer",
                other.kind()
            ))),
        }
    }
}

/// Bound-type contract: encode current state, load state from a row.
///
/// `Default` supplies the bare instance that fetched rows are loaded into
/// when the identity map has no entry for their id.
pub trait Record: Default {
    fn encode_state(&self) -> RowEncoding;

    /// Overwrites this instance from `encoding`, including its id.
    fn load_state(&mut self, encoding: &RowEncoding) -> OrmResult<()>;
}

/// One row's data in transit: the primary key plus named column values.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RowEncoding {
    id: RowId,
    columns: Vec<(String, Value)>,
}

impl RowEncoding {
    pub fn new(id: RowId) -> Self {
        Self {
            id,
            columns: Vec::new(),
        }
    }

    /// Builds an encoding from a fetched row; the `id` column becomes the key.
    pub fn from_row(row: Row) -> OrmResult<Self> {
        let mut encoding = Self::default();
        for (column, value) in row.into_columns() {
            if column == ID_COLUMN {
                encoding.id = RowId::from_value(&value)?;
            } else {
                encoding.set(column, value);
            }
        }
        Ok(encoding)
    }

    /// Builder form of `set`.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Sets `column`, replacing an existing value in place.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((column, value)),
        }
    }

    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn set_id(&mut self, id: RowId) {
        self.id = id;
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    /// Reads a text column; absent and NULL both read as `None`.
    pub fn text(&self, column: &str) -> OrmResult<Option<&str>> {
        match self.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(value)) => Ok(Some(value.as_str())),
            Some(other) => Err(type_mismatch(column, "text", other)),
        }
    }

    /// Reads an integer column; absent and NULL both read as `None`.
    pub fn integer(&self, column: &str) -> OrmResult<Option<i64>> {
        match self.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Integer(value)) => Ok(Some(*value)),
            Some(other) => Err(type_mismatch(column, "integer", other)),
        }
    }

    /// Reads a real column, widening stored integers.
    pub fn real(&self, column: &str) -> OrmResult<Option<f64>> {
        match self.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_real()
                .map(Some)
                .ok_or_else(|| type_mismatch(column, "real", value)),
        }
    }
}

fn type_mismatch(column: &str, expected: &str, actual: &Value) -> OrmError {
    OrmError::InvalidData(format!(
        "column `{column}` holds a {} value, expected {expected}",
        actual.kind()
    ))
}
