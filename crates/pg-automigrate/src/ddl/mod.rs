//! DDL generation: column types, CREATE TABLE and deferred constraints.

mod render;
mod types;

pub use render::{
    render_add_constraint, render_create_schema, render_create_table, render_drop_table,
    TableDdl,
};
pub use types::resolve_sql_type;
