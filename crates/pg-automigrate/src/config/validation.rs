//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::error::{AutomigrateError, Result};

const SSL_MODES: &[&str] = &["disable", "require", "verify-ca", "verify-full"];

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let ds = &config.datastore;

    // Datastore validation
    match &ds.url {
        Some(url) => {
            if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                return Err(AutomigrateError::Config(
                    "datastore.url must start with postgres:// or postgresql://".into(),
                ));
            }
        }
        None => {
            if ds.host.is_empty() {
                return Err(AutomigrateError::Config(
                    "datastore.host is required when datastore.url is not set".into(),
                ));
            }
            if ds.database.is_empty() {
                return Err(AutomigrateError::Config(
                    "datastore.database is required when datastore.url is not set".into(),
                ));
            }
        }
    }
    validate_identifier(&ds.schema)
        .map_err(|e| AutomigrateError::Config(format!("datastore.schema: {}", e)))?;
    if !SSL_MODES.contains(&ds.ssl_mode.to_lowercase().as_str()) {
        return Err(AutomigrateError::Config(format!(
            "datastore.ssl_mode must be one of {}, got '{}'",
            SSL_MODES.join(", "),
            ds.ssl_mode
        )));
    }
    if ds.max_connections == 0 {
        return Err(AutomigrateError::Config(
            "datastore.max_connections must be at least 1".into(),
        ));
    }

    // Automigrate validation
    let am = &config.automigrate;
    if am.primary_key.is_empty() {
        return Err(AutomigrateError::Config(
            "automigrate.primary_key must not be empty".into(),
        ));
    }
    if am.deferred_passes == 0 {
        return Err(AutomigrateError::Config(
            "automigrate.deferred_passes must be at least 1".into(),
        ));
    }
    if am.workers == 0 {
        return Err(AutomigrateError::Config(
            "automigrate.workers must be at least 1".into(),
        ));
    }
    am.on_delete()?;
    am.on_update()?;

    Ok(())
}
