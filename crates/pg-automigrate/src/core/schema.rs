//! Table, column and foreign-key types produced by classification.
//!
//! These are the annotated form of a model's raw attribute map: every column
//! carries its declared type and modifiers, and foreign-key columns carry a
//! [`ForeignKeyRef`] describing the target and how the reference was found.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declared column type of an attribute.
///
/// The underscore-prefixed names are the defaults emitted by model layers for
/// automigration; anything else is passed through as a custom SQL type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Number,
    NumberKey,
    NumberTimestamp,
    String,
    StringKey,
    StringTimestamp,
    Boolean,
    Json,
    Ref,
    Custom(String),
}

impl ColumnType {
    /// Parse a declared `columnType` value.
    pub fn parse(declared: &str) -> Self {
        match declared.to_lowercase().as_str() {
            "_number" => ColumnType::Number,
            "_numberkey" => ColumnType::NumberKey,
            "_numbertimestamp" => ColumnType::NumberTimestamp,
            "_string" => ColumnType::String,
            "_stringkey" => ColumnType::StringKey,
            "_stringtimestamp" => ColumnType::StringTimestamp,
            "_boolean" => ColumnType::Boolean,
            "_json" => ColumnType::Json,
            "_ref" => ColumnType::Ref,
            _ => ColumnType::Custom(declared.to_string()),
        }
    }
}

/// Referential action for ON DELETE / ON UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferentialAction {
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
    NoAction,
}

impl ReferentialAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
            ReferentialAction::NoAction => "NO ACTION",
        }
    }
}

impl FromStr for ReferentialAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "RESTRICT" => Ok(ReferentialAction::Restrict),
            "CASCADE" => Ok(ReferentialAction::Cascade),
            "SET NULL" | "SETNULL" => Ok(ReferentialAction::SetNull),
            "SET DEFAULT" | "SETDEFAULT" => Ok(ReferentialAction::SetDefault),
            "NO ACTION" | "NOACTION" => Ok(ReferentialAction::NoAction),
            _ => Err(format!("unknown referential action '{}'", s)),
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// How a foreign key was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FkOrigin {
    /// `meta.foreignKey: true` on the attribute.
    Explicit,
    /// Association (`model`) without the explicit marker.
    Implicit,
    /// Naming convention (`ownerId` / `owner`), opt-in.
    Heuristic,
}

/// Foreign key reference attached to a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub target_table: String,
    pub target_column: String,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
    pub origin: FkOrigin,
    pub self_referencing: bool,
}

/// Classified attribute of a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSpec {
    /// Logical model type (`number`, `string`, `json`, ...), informational.
    pub logical_type: Option<String>,
    /// Declared column type.
    pub column_type: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub foreign_key: Option<ForeignKeyRef>,
}

impl AttributeSpec {
    /// Plain attribute of the given declared type.
    pub fn new(column_type: ColumnType) -> Self {
        Self {
            logical_type: None,
            column_type,
            nullable: true,
            unique: false,
            primary_key: false,
            auto_increment: false,
            foreign_key: None,
        }
    }
}

/// Named column of a table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub spec: AttributeSpec,
}

/// Classified table: name plus ordered columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Append a column (builder style).
    pub fn column(mut self, name: impl Into<String>, spec: AttributeSpec) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            spec,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of all primary-key columns, in column order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.spec.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Columns that carry a foreign key reference.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&ColumnDef, &ForeignKeyRef)> {
        self.columns
            .iter()
            .filter_map(|c| c.spec.foreign_key.as_ref().map(|fk| (c, fk)))
    }

    /// Distinct tables this table references, excluding itself.
    pub fn referenced_tables(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for (_, fk) in self.foreign_keys() {
            if !fk.self_referencing && !out.contains(&fk.target_table.as_str()) {
                out.push(fk.target_table.as_str());
            }
        }
        out
    }
}
