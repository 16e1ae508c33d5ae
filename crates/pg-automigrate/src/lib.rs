//! # pg-automigrate
//!
//! PostgreSQL table automigration with foreign-key dependency resolution.
//!
//! Tables are created from declarative model definitions. Foreign keys are
//! written inline when the referenced table already exists and deferred
//! otherwise; deferred constraints are applied as soon as their target
//! appears, and whatever remains is resolved in a bounded number of passes
//! once the caller signals that all tables are defined.
//!
//! - **Classification** of attributes into explicit, implicit and (opt-in)
//!   naming-convention foreign keys
//! - **Dependency ordering** that tolerates cycles and self-references
//! - **Deferred constraints** applied in savepoint-guarded batches
//! - **Concurrent table definition** with a per-session registry
//!
//! ## Example
//!
//! ```rust,no_run
//! use pg_automigrate::{Config, MigrationSession, ModelSet, PgConnector};
//!
//! #[tokio::main]
//! async fn main() -> pg_automigrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let models = ModelSet::load("models.yaml", &config.automigrate.primary_key)?;
//!     let connector = PgConnector::connect(&config.datastore).await?;
//!
//!     let session = MigrationSession::from_config(connector, &config)?;
//!     session.rebuild_from_database().await?;
//!     session.register_models(models).await?;
//!     let report = session.run_plan().await?;
//!     println!("Created {} tables", report.tables_created);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod ddl;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod schema;
pub mod target;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{AutomigrateConfig, Config, DatastoreConfig};
pub use error::{AutomigrateError, DriverError, DriverErrorCode, Result};
pub use orchestrator::{
    preview, DefineOutcome, MigrationSession, PlanPreview, SessionReport, SessionSettings,
};
pub use registry::{ConstraintState, PendingConstraint, TableRegistry};
pub use schema::{ModelDefinition, ModelSet};
pub use target::{Connector, PgConnector, SchemaExecutor};
