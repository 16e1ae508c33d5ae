//! Core types shared by the classifier, DDL renderer and orchestrator.
//!
//! - [`schema`]: classified table, column and foreign-key metadata
//! - [`identifier`]: identifier validation, quoting and constraint naming

pub mod identifier;
pub mod schema;

pub use identifier::{constraint_name, qualify_pg, quote_pg};
pub use schema::{
    AttributeSpec, ColumnDef, ColumnType, FkOrigin, ForeignKeyRef, ReferentialAction,
    TableDefinition,
};
