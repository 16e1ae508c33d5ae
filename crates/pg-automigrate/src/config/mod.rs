//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::core::schema::ReferentialAction;
use crate::error::{AutomigrateError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl DatastoreConfig {
    /// Build a connection string for tokio-postgres.
    ///
    /// A configured `url` wins. Certificate verification modes are handled by
    /// the TLS connector, so the driver itself only sees `disable` or `require`.
    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }

        let sslmode = match self.ssl_mode.to_lowercase().as_str() {
            "disable" => "disable",
            _ => "require",
        };

        let mut parts = vec![
            format!("host={}", conn_value(&self.host)),
            format!("port={}", self.port),
            format!("dbname={}", conn_value(&self.database)),
        ];
        if !self.user.is_empty() {
            parts.push(format!("user={}", conn_value(&self.user)));
        }
        if !self.password.is_empty() {
            parts.push(format!("password={}", conn_value(&self.password)));
        }
        parts.push(format!("sslmode={}", sslmode));
        parts.join(" ")
    }
}

impl AutomigrateConfig {
    /// Parsed default ON DELETE action.
    pub fn on_delete(&self) -> Result<ReferentialAction> {
        parse_action("automigrate.default_on_delete", &self.default_on_delete)
    }

    /// Parsed default ON UPDATE action.
    pub fn on_update(&self) -> Result<ReferentialAction> {
        parse_action("automigrate.default_on_update", &self.default_on_update)
    }
}

fn parse_action(field: &str, value: &str) -> Result<ReferentialAction> {
    value
        .parse()
        .map_err(|e| AutomigrateError::Config(format!("{}: {}", field, e)))
}

/// Quote a key/value connection parameter when it contains spaces or quotes.
fn conn_value(value: &str) -> String {
    if value.is_empty() || value.contains([' ', '\'', '\\']) {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    } else {
        value.to_string()
    }
}
