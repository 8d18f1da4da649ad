//! Declarative column map for a bound record type.
//!
//! # Invariants
//! - `id` is reserved for the integer primary key and cannot be declared.
//! - Table and column names are plain SQL identifiers; they are spliced
//!   into statement text verbatim.
//! - Column type descriptors are opaque and passed through to DDL.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Primary key column every bound table carries.
pub const ID_COLUMN: &str = "id";

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Schema declaration errors, raised before any statement runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    ReservedColumn,
    InvalidIdentifier(String),
    DuplicateColumn(String),
    NoAttributes,
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReservedColumn => write!(
                f,
                "attribute map must not declare the reserved column `{ID_COLUMN}`"
            ),
            Self::InvalidIdentifier(name) => write!(f, "`{name}` is not a valid SQL identifier"),
            Self::DuplicateColumn(name) => write!(f, "column `{name}` is declared twice"),
            Self::NoAttributes => write!(f, "attribute map must declare at least one column"),
        }
    }
}

impl Error for SchemaError {}

/// One declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// Type descriptor used verbatim in `ADD COLUMN`, e.g. `varchar(255)`.
    pub sql_type: String,
}

/// Ordered column name to column type mapping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributeMap {
    columns: Vec<Attribute>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one column declaration.
    pub fn column(mut self, name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        self.columns.push(Attribute {
            name: name.into(),
            sql_type: sql_type.into(),
        });
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.columns.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|attribute| attribute.name.as_str())
    }

    /// Returns the declared type of `name`.
    pub fn sql_type(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| attribute.sql_type.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sql_type(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Checks the declaration against `table` before it is bound.
    ///
    /// The reserved-column check runs first so that declaring `id` is
    /// reported as such even when other problems exist.
    pub fn validate(&self, table: &str) -> Result<(), SchemaError> {
        if self.contains(ID_COLUMN) {
            return Err(SchemaError::ReservedColumn);
        }
        validate_identifier(table)?;
        if self.columns.is_empty() {
            return Err(SchemaError::NoAttributes);
        }

        for (index, attribute) in self.columns.iter().enumerate() {
            validate_identifier(&attribute.name)?;
            let declared_earlier = self.columns[..index]
                .iter()
                .any(|earlier| earlier.name == attribute.name);
            if declared_earlier {
                return Err(SchemaError::DuplicateColumn(attribute.name.clone()));
            }
        }

        Ok(())
    }
}

impl<K, V> FromIterator<(K, V)> for AttributeMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |map, (name, sql_type)| map.column(name, sql_type))
    }
}

fn validate_identifier(name: &str) -> Result<(), SchemaError> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{AttributeMap, SchemaError};

    #[test]
    fn reserved_id_column_is_rejected() {
        let attributes = AttributeMap::new()
            .column("text", "varchar(255)")
            .column("id", "integer");
        assert_eq!(
            attributes.validate("dummy"),
            Err(SchemaError::ReservedColumn)
        );
    }

    #[test]
    fn identifiers_must_be_plain_names() {
        let bad_table = AttributeMap::new().column("text", "text");
        assert_eq!(
            bad_table.validate("dummy; DROP TABLE x"),
            Err(SchemaError::InvalidIdentifier("dummy; DROP TABLE x".to_string()))
        );

        let bad_column = AttributeMap::new().column("1text", "text");
        assert!(matches!(
            bad_column.validate("dummy"),
            Err(SchemaError::InvalidIdentifier(name)) if name == "1text"
        ));
    }

    #[test]
    fn empty_and_duplicate_declarations_are_rejected() {
        assert_eq!(
            AttributeMap::new().validate("dummy"),
            Err(SchemaError::NoAttributes)
        );

        let duplicated: AttributeMap = [("text", "text"), ("text", "varchar(10)")]
            .into_iter()
            .collect();
        assert_eq!(
            duplicated.validate("dummy"),
            Err(SchemaError::DuplicateColumn("text".to_string()))
        );
    }

    #[test]
    fn declaration_order_is_preserved() {
        let attributes = AttributeMap::new()
            .column("title", "text")
            .column("body", "text")
            .column("rank", "integer");
        assert_eq!(
            attributes.names().collect::<Vec<_>>(),
            vec!["title", "body", "rank"]
        );
        assert_eq!(attributes.sql_type("rank"), Some("integer"));
        assert!(attributes.validate("notes").is_ok());
    }
}
