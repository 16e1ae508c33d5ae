//! Attribute classification.
//!
//! Turns one table's raw attribute map into a [`TableDefinition`], tagging
//! foreign-key columns. Resolution order per column:
//!
//! 1. explicit marker (`meta.foreignKey: true`)
//! 2. implicit association (`model: <identity>`, resolved to the model's table)
//! 3. naming convention (`ownerId`, `owner`), opt-in and only when the guessed
//!    table already exists

use crate::core::identifier::validate_identifier;
use crate::core::schema::{
    AttributeSpec, ColumnDef, ColumnType, FkOrigin, ForeignKeyRef, ReferentialAction,
    TableDefinition,
};
use crate::error::{AutomigrateError, Result};
use crate::schema::model::ModelSet;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

/// Column names never treated as foreign keys by the naming convention.
const HEURISTIC_EXCLUDED: &[&str] = &["createdAt", "updatedAt"];

/// Inputs that influence classification beyond the attribute map.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyContext<'a> {
    /// Primary key of the table being classified.
    pub primary_key: &'a str,
    /// Target column used when a reference does not name one.
    pub default_target_key: &'a str,
    /// Enables the naming-convention fallback.
    pub naming_fallback: bool,
    /// Tables known to exist right now (registry snapshot).
    pub existing: &'a HashSet<String>,
    /// Model set used to look up the primary key of referenced tables.
    pub models: Option<&'a ModelSet>,
}

impl<'a> ClassifyContext<'a> {
    /// Table behind a `model: <identity>` reference.
    fn model_table(&self, identity: &str) -> String {
        match self.models {
            Some(models) => models.resolve_table(identity).to_string(),
            None => identity.to_string(),
        }
    }

    fn target_key(&self, target: &str) -> String {
        self.models
            .and_then(|m| m.primary_key_of(target))
            .unwrap_or(self.default_target_key)
            .to_string()
    }
}

/// Classify one table's attributes.
pub fn classify_table(
    table: &str,
    attributes: &Map<String, Value>,
    ctx: &ClassifyContext<'_>,
) -> Result<TableDefinition> {
    validate_identifier(table)?;

    let mut columns = Vec::with_capacity(attributes.len());
    for (name, raw) in attributes {
        if name.starts_with('_') {
            continue;
        }
        let spec = classify_attribute(table, name, raw, ctx)?;
        columns.push(ColumnDef {
            name: name.clone(),
            spec,
        });
    }

    Ok(TableDefinition {
        name: table.to_string(),
        columns,
    })
}

fn classify_attribute(
    table: &str,
    name: &str,
    raw: &Value,
    ctx: &ClassifyContext<'_>,
) -> Result<AttributeSpec> {
    if name.contains("__") {
        return Err(AutomigrateError::InvalidColumnName {
            table: table.to_string(),
            column: name.to_string(),
        });
    }
    validate_identifier(name)?;

    let attr = raw.as_object().ok_or_else(|| {
        AutomigrateError::invalid_definition(
            table,
            name,
            format!("attribute must be a plain object, got {}", kind_of(raw)),
        )
    })?;

    let logical_type = opt_str(table, name, attr, "type")?;
    let column_type = match attr.get("columnType") {
        Some(Value::String(s)) if !s.trim().is_empty() => ColumnType::parse(s.trim()),
        Some(_) => {
            return Err(AutomigrateError::invalid_definition(
                table,
                name,
                "columnType must be a non-empty string",
            ))
        }
        None => default_column_type(table, name, logical_type.as_deref())?,
    };

    let auto_increment = flag(table, name, attr, "autoIncrement")?;
    let not_null = flag(table, name, attr, "notNull")? || flag(table, name, attr, "required")?;
    let primary_key = flag(table, name, attr, "primaryKey")? || name == ctx.primary_key;

    let mut spec = AttributeSpec {
        logical_type,
        column_type,
        nullable: !(not_null || primary_key),
        unique: flag(table, name, attr, "unique")?,
        primary_key,
        auto_increment,
        foreign_key: None,
    };

    spec.foreign_key = match explicit_or_implicit(table, name, attr, ctx)? {
        Some(fk) => Some(fk),
        None if ctx.naming_fallback && !primary_key => heuristic(table, name, ctx),
        None => None,
    };

    if let Some(fk) = &spec.foreign_key {
        debug!(
            "{}.{} references {}.{} ({:?}{})",
            table,
            name,
            fk.target_table,
            fk.target_column,
            fk.origin,
            if fk.self_referencing { ", self" } else { "" }
        );
    }

    Ok(spec)
}

fn explicit_or_implicit(
    table: &str,
    name: &str,
    attr: &Map<String, Value>,
    ctx: &ClassifyContext<'_>,
) -> Result<Option<ForeignKeyRef>> {
    let meta = match attr.get("meta") {
        None | Some(Value::Null) => None,
        Some(Value::Object(m)) => Some(m),
        Some(other) => {
            return Err(AutomigrateError::invalid_definition(
                table,
                name,
                format!("meta must be a plain object, got {}", kind_of(other)),
            ))
        }
    };
    let model = opt_str(table, name, attr, "model")?.map(|m| ctx.model_table(&m));
    let explicit = match meta {
        Some(m) => flag(table, name, m, "foreignKey")?,
        None => false,
    };

    let (target, origin) = if explicit {
        let references = match meta {
            Some(m) => opt_str(table, name, m, "references")?,
            None => None,
        };
        let target = references
            .or_else(|| model.clone())
            .unwrap_or_else(|| name.to_string());
        (target, FkOrigin::Explicit)
    } else if let Some(model) = model {
        (model, FkOrigin::Implicit)
    } else {
        return Ok(None);
    };
    validate_identifier(&target)?;

    let mut target_column = None;
    let mut on_delete = None;
    let mut on_update = None;
    if let Some(m) = meta {
        target_column = opt_str(table, name, m, "referencesKey")?;
        on_delete = action(table, name, m, "onDelete")?;
        on_update = action(table, name, m, "onUpdate")?;
    }
    let target_column = target_column.unwrap_or_else(|| ctx.target_key(&target));

    Ok(Some(ForeignKeyRef {
        self_referencing: target == table,
        target_table: target,
        target_column,
        on_delete,
        on_update,
        origin,
    }))
}

/// Guess a target table from the column spelling. Only fires when the guess
/// already exists and is not the table itself.
fn heuristic(table: &str, name: &str, ctx: &ClassifyContext<'_>) -> Option<ForeignKeyRef> {
    if HEURISTIC_EXCLUDED.contains(&name) {
        return None;
    }

    let lower = name.to_lowercase();
    let candidate = if lower.len() > 2 && lower.ends_with("id") {
        lower[..lower.len() - 2].trim_end_matches('_').to_string()
    } else {
        name.to_string()
    };

    if candidate.is_empty() || candidate == table || !ctx.existing.contains(&candidate) {
        return None;
    }

    Some(ForeignKeyRef {
        target_column: ctx.target_key(&candidate),
        target_table: candidate,
        on_delete: None,
        on_update: None,
        origin: FkOrigin::Heuristic,
        self_referencing: false,
    })
}

fn default_column_type(table: &str, name: &str, logical: Option<&str>) -> Result<ColumnType> {
    match logical {
        Some("number") => Ok(ColumnType::Number),
        Some("string") => Ok(ColumnType::String),
        Some("boolean") => Ok(ColumnType::Boolean),
        Some("json") => Ok(ColumnType::Json),
        Some("ref") => Ok(ColumnType::Ref),
        _ => Err(AutomigrateError::invalid_definition(
            table,
            name,
            "columnType is required",
        )),
    }
}

fn flag(table: &str, name: &str, attr: &Map<String, Value>, key: &str) -> Result<bool> {
    match attr.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(AutomigrateError::invalid_definition(
            table,
            name,
            format!("{} must be a boolean, got {}", key, kind_of(other)),
        )),
    }
}

fn opt_str(
    table: &str,
    name: &str,
    attr: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>> {
    match attr.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(AutomigrateError::invalid_definition(
            table,
            name,
            format!("{} must be a string, got {}", key, kind_of(other)),
        )),
    }
}

fn action(
    table: &str,
    name: &str,
    meta: &Map<String, Value>,
    key: &str,
) -> Result<Option<ReferentialAction>> {
    opt_str(table, name, meta, key)?
        .map(|s| {
            s.parse()
                .map_err(|e: String| AutomigrateError::invalid_definition(table, name, e))
        })
        .transpose()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
