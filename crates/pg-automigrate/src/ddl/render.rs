//! DDL statement rendering.

use super::types::resolve_sql_type;
use crate::core::identifier::{constraint_name, qualify_pg, quote_pg};
use crate::core::schema::{ColumnDef, TableDefinition};
use crate::error::Result;
use crate::registry::{ActionDefaults, PendingConstraint};
use std::collections::HashSet;
use tracing::debug;

/// Rendered CREATE TABLE plus the foreign keys left out of it.
#[derive(Debug, Clone)]
pub struct TableDdl {
    pub table: String,
    pub statement: String,
    pub deferred: Vec<PendingConstraint>,
}

/// Render `CREATE TABLE IF NOT EXISTS` for a classified table.
///
/// A foreign key is inlined only when it is not self-referencing and its
/// target is in `existing`; all others are returned as deferred constraints.
pub fn render_create_table(
    schema: &str,
    table: &TableDefinition,
    existing: &HashSet<String>,
    defaults: &ActionDefaults,
) -> Result<TableDdl> {
    let mut parts = Vec::with_capacity(table.columns.len() + 1);
    let mut deferred = Vec::new();

    for column in &table.columns {
        let mut fragment = render_column(&table.name, column)?;

        if let Some(fk) = &column.spec.foreign_key {
            if !fk.self_referencing && existing.contains(&fk.target_table) {
                debug!(
                    "{}.{}: inline reference to {}",
                    table.name, column.name, fk.target_table
                );
                fragment.push_str(&format!(
                    " CONSTRAINT {} REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
                    quote_pg(&constraint_name(&table.name, &column.name, &fk.target_table))?,
                    qualify_pg(schema, &fk.target_table)?,
                    quote_pg(&fk.target_column)?,
                    fk.on_delete.unwrap_or(defaults.on_delete),
                    fk.on_update.unwrap_or(defaults.on_update),
                ));
            } else {
                debug!(
                    "{}.{}: reference to {} deferred{}",
                    table.name,
                    column.name,
                    fk.target_table,
                    if fk.self_referencing { " (self)" } else { "" }
                );
                deferred.push(PendingConstraint::from_reference(
                    &table.name,
                    &column.name,
                    fk,
                    defaults,
                ));
            }
        }

        parts.push(fragment);
    }

    let pk = table.primary_key();
    if !pk.is_empty() {
        let cols = pk
            .iter()
            .map(|c| quote_pg(c))
            .collect::<Result<Vec<_>>>()?;
        parts.push(format!("PRIMARY KEY ({})", cols.join(", ")));
    }

    let statement = format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualify_pg(schema, &table.name)?,
        parts.join(", ")
    );

    Ok(TableDdl {
        table: table.name.clone(),
        statement,
        deferred,
    })
}

fn render_column(table: &str, column: &ColumnDef) -> Result<String> {
    let spec = &column.spec;
    let mut fragment = format!(
        "{} {}",
        quote_pg(&column.name)?,
        resolve_sql_type(table, &column.name, spec)?
    );
    if !spec.nullable {
        fragment.push_str(" NOT NULL");
    }
    if spec.unique && !spec.primary_key {
        fragment.push_str(" UNIQUE");
    }
    Ok(fragment)
}

/// Render the `ALTER TABLE … ADD CONSTRAINT` for a deferred foreign key.
pub fn render_add_constraint(schema: &str, constraint: &PendingConstraint) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
        qualify_pg(schema, &constraint.source_table)?,
        quote_pg(&constraint.constraint_name)?,
        quote_pg(&constraint.source_column)?,
        qualify_pg(schema, &constraint.target_table)?,
        quote_pg(&constraint.target_column)?,
        constraint.on_delete,
        constraint.on_update,
    ))
}

pub fn render_drop_table(schema: &str, table: &str) -> Result<String> {
    Ok(format!(
        "DROP TABLE IF EXISTS {} CASCADE",
        qualify_pg(schema, table)?
    ))
}

pub fn render_create_schema(schema: &str) -> Result<String> {
    Ok(format!("CREATE SCHEMA IF NOT EXISTS {}", quote_pg(schema)?))
}
