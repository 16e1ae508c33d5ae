//! Database-facing interfaces consumed by the automigration engine.
//!
//! The engine never talks to a driver directly. It acquires a connection from
//! a [`Connector`], runs DDL through [`SchemaExecutor`], and releases the
//! connection by dropping it. [`postgres::PgConnector`] is the production
//! implementation over a deadpool-postgres pool.

pub mod postgres;
mod tls;

pub use postgres::{PgConnection, PgConnector};
pub use tls::{SslMode, TlsBuilder};

use crate::error::{DriverError, Result};
use async_trait::async_trait;

/// Statement execution on one acquired connection.
#[async_trait]
pub trait SchemaExecutor: Send + Sync {
    /// Execute a statement that returns no rows.
    async fn execute(&self, statement: &str) -> std::result::Result<(), DriverError>;

    /// List base tables in a schema.
    async fn list_tables(&self, schema: &str) -> std::result::Result<Vec<String>, DriverError>;
}

/// Source of connections. Dropping a connection releases it.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: SchemaExecutor + 'static;

    async fn acquire(&self) -> Result<Self::Conn>;
}
