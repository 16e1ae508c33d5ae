//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target datastore (PostgreSQL) configuration.
    pub datastore: DatastoreConfig,

    /// Automigration behavior configuration.
    #[serde(default)]
    pub automigrate: AutomigrateConfig,
}

/// Datastore (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatastoreConfig {
    /// Full connection URL. Takes precedence over the individual parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password. Never serialized.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Schema (namespace) that tables are created in (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "disable").
    #[serde(default = "default_disable")]
    pub ssl_mode: String,

    /// Create the schema namespace before defining tables (default: true).
    #[serde(default = "default_true")]
    pub create_schemas: bool,

    /// Maximum pooled connections (default: 8).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl fmt::Debug for DatastoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatastoreConfig")
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("create_schemas", &self.create_schemas)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Automigration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomigrateConfig {
    /// Primary key column name assumed when a model does not declare one.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    /// Infer foreign keys from column spelling (`ownerId`, `owner`).
    /// Off by default: the only guard is that the guessed table already exists.
    #[serde(default)]
    pub naming_convention_fallback: bool,

    /// Number of deferred-constraint resolution passes run on completion.
    #[serde(default = "default_deferred_passes")]
    pub deferred_passes: usize,

    /// Quiescence cooldown in milliseconds. When set, a sweep also runs once
    /// no table has been created for this long.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_cooldown_ms: Option<u64>,

    /// Concurrent table definitions when running a whole plan.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// ON DELETE action used when a foreign key does not specify one.
    #[serde(default = "default_on_delete")]
    pub default_on_delete: String,

    /// ON UPDATE action used when a foreign key does not specify one.
    #[serde(default = "default_on_update")]
    pub default_on_update: String,
}

impl Default for AutomigrateConfig {
    fn default() -> Self {
        Self {
            primary_key: default_primary_key(),
            naming_convention_fallback: false,
            deferred_passes: default_deferred_passes(),
            sweep_cooldown_ms: None,
            workers: default_workers(),
            default_on_delete: default_on_delete(),
            default_on_update: default_on_update(),
        }
    }
}

// Default value functions for serde
fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> usize {
    8
}

fn default_primary_key() -> String {
    "id".to_string()
}

fn default_deferred_passes() -> usize {
    2
}

fn default_workers() -> usize {
    4
}

fn default_on_delete() -> String {
    "RESTRICT".to_string()
}

fn default_on_update() -> String {
    "CASCADE".to_string()
}
