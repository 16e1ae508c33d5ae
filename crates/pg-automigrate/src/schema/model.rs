//! Model definitions and models-file loading.
//!
//! A models file maps each model identity to its definition:
//!
//! ```yaml
//! user:
//!   attributes:
//!     id: { columnType: _numberkey, autoIncrement: true }
//!     email: { columnType: _string, unique: true }
//! pet:
//!   tableName: pet
//!   attributes:
//!     id: { columnType: _numberkey, autoIncrement: true }
//!     owner: { columnType: _numberkey, model: user }
//! ```
//!
//! Attribute values are kept raw (`serde_json::Value`) so the classifier can
//! report malformed definitions instead of failing at parse time.

use crate::error::{AutomigrateError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

/// One model as declared by the calling layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefinition {
    /// Model identity. Filled from the map key when omitted.
    #[serde(default)]
    pub identity: String,

    /// Physical table name (defaults to the identity).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,

    /// Primary key attribute (defaults to the configured primary key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,

    /// Raw attribute map, keyed by column name, in declaration order.
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ModelDefinition {
    pub fn table(&self) -> &str {
        self.table_name.as_deref().unwrap_or(&self.identity)
    }
}

/// All models of one datastore, in declaration order.
#[derive(Debug, Clone)]
pub struct ModelSet {
    models: Vec<ModelDefinition>,
    default_primary_key: String,
}

impl ModelSet {
    /// Load a models file. `.json` files are parsed as JSON, anything else as YAML.
    pub fn load<P: AsRef<Path>>(path: P, default_primary_key: &str) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let raw: Map<String, Value> = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Self::from_map(raw, default_primary_key)
    }

    /// Build from an identity -> definition map.
    pub fn from_map(raw: Map<String, Value>, default_primary_key: &str) -> Result<Self> {
        let mut models = Vec::with_capacity(raw.len());
        for (identity, value) in raw {
            let mut model: ModelDefinition = serde_json::from_value(value).map_err(|e| {
                AutomigrateError::Config(format!("model '{}': {}", identity, e))
            })?;
            if model.identity.is_empty() {
                model.identity = identity;
            }
            models.push(model);
        }
        Self::new(models, default_primary_key)
    }

    /// Build from already-parsed models and validate them.
    pub fn new(models: Vec<ModelDefinition>, default_primary_key: &str) -> Result<Self> {
        let set = Self {
            models,
            default_primary_key: default_primary_key.to_string(),
        };
        set.validate()?;
        Ok(set)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for model in &self.models {
            let table = model.table();
            if table.is_empty() {
                return Err(AutomigrateError::Config(
                    "model without identity or tableName".into(),
                ));
            }
            if !seen.insert(table) {
                return Err(AutomigrateError::Config(format!(
                    "table '{}' is declared by more than one model",
                    table
                )));
            }

            let pk = self.pk_for(model);
            let attr = model.attributes.get(pk).ok_or_else(|| {
                AutomigrateError::invalid_definition(
                    table,
                    pk,
                    "primary key attribute is not defined",
                )
            })?;
            if let Some(column_name) = attr.get("columnName").and_then(Value::as_str) {
                if column_name != pk {
                    return Err(AutomigrateError::invalid_definition(
                        table,
                        pk,
                        "primary key attribute may not declare a custom columnName",
                    ));
                }
            }
        }
        Ok(())
    }

    fn pk_for<'a>(&'a self, model: &'a ModelDefinition) -> &'a str {
        model
            .primary_key
            .as_deref()
            .unwrap_or(&self.default_primary_key)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDefinition> {
        self.models.iter()
    }

    /// Physical table names in declaration order.
    pub fn table_names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.table()).collect()
    }

    pub fn get(&self, table: &str) -> Option<&ModelDefinition> {
        self.models.iter().find(|m| m.table() == table)
    }

    pub fn by_identity(&self, identity: &str) -> Option<&ModelDefinition> {
        self.models.iter().find(|m| m.identity == identity)
    }

    /// Physical table for a model identity. Unknown identities are taken to
    /// name the table directly.
    pub fn resolve_table<'a>(&'a self, identity: &'a str) -> &'a str {
        self.by_identity(identity)
            .map(ModelDefinition::table)
            .unwrap_or(identity)
    }

    /// Primary key column of a table, if the table is a known model.
    pub fn primary_key_of(&self, table: &str) -> Option<&str> {
        self.get(table).map(|m| self.pk_for(m))
    }

    pub fn default_primary_key(&self) -> &str {
        &self.default_primary_key
    }
}
