//! Statement text and prepared statements for bound tables.
//!
//! # Responsibility
//! - Turn a table name and attribute map into DDL/DML text.
//! - Own the prepared DML statements reused by one binding.
//!
//! # Invariants
//! - Schema evolution is additive only: create a key-only table, then add
//!   each declared column.
//! - Bind variables are named `$<column>`.

pub mod sql;
pub mod statements;
