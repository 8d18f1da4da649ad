//! SQL text generation for bound tables.
//!
//! Pure functions over (table, attributes). Inputs are assumed validated by
//! `AttributeMap::validate`.

use crate::model::attributes::{AttributeMap, ID_COLUMN};

/// Returns the placeholder spelling for `column`.
pub fn bind_var_name(column: &str) -> String {
    format!("${column}")
}

/// Minimal table carrying only the primary key; columns are added separately.
pub fn create_table_sql(table: &str) -> String {
    format!("CREATE TABLE IF NOT EXISTS {table} ({ID_COLUMN} INTEGER PRIMARY KEY)")
}

/// One `ADD COLUMN` statement per declared attribute, in declaration order.
pub fn add_column_sql(table: &str, attributes: &AttributeMap) -> Vec<(String, String)> {
    attributes
        .iter()
        .map(|attribute| {
            (
                attribute.name.clone(),
                format!(
                    "ALTER TABLE {table} ADD COLUMN {} {}",
                    attribute.name, attribute.sql_type
                ),
            )
        })
        .collect()
}

pub fn insert_sql(table: &str, attributes: &AttributeMap) -> String {
    let columns: Vec<&str> = attributes.names().collect();
    let bind_vars: Vec<String> = columns.iter().map(|column| bind_var_name(column)).collect();
    format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        bind_vars.join(", ")
    )
}

pub fn update_sql(table: &str, attributes: &AttributeMap) -> String {
    let assignments: Vec<String> = attributes
        .names()
        .map(|column| format!("{column} = {}", bind_var_name(column)))
        .collect();
    format!(
        "UPDATE {table} SET {} WHERE {ID_COLUMN} = {}",
        assignments.join(", "),
        bind_var_name(ID_COLUMN)
    )
}

pub fn delete_sql(table: &str) -> String {
    format!(
        "DELETE FROM {table} WHERE {ID_COLUMN} = {}",
        bind_var_name(ID_COLUMN)
    )
}

pub fn select_by_id_sql(table: &str) -> String {
    format!(
        "SELECT * FROM {table} WHERE {ID_COLUMN} = {}",
        bind_var_name(ID_COLUMN)
    )
}

/// Removes every row while keeping the table.
pub fn truncate_sql(table: &str) -> String {
    format!("DELETE FROM {table}")
}
