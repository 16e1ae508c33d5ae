//! Deferred foreign key constraints.

use crate::core::identifier::constraint_name;
use crate::core::schema::{ForeignKeyRef, ReferentialAction};
use serde::Serialize;

/// Lifecycle of a deferred constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintState {
    Pending,
    Applied,
    PermanentlyUnresolved,
}

/// Referential actions applied when a reference does not name its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionDefaults {
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

impl Default for ActionDefaults {
    fn default() -> Self {
        Self {
            on_delete: ReferentialAction::Restrict,
            on_update: ReferentialAction::Cascade,
        }
    }
}

/// A foreign key waiting for its target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingConstraint {
    /// Registry insertion sequence; sweeps attempt constraints in this order.
    pub seq: u64,
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
    pub constraint_name: String,
    pub state: ConstraintState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl PendingConstraint {
    pub fn from_reference(
        source_table: &str,
        source_column: &str,
        fk: &ForeignKeyRef,
        defaults: &ActionDefaults,
    ) -> Self {
        Self {
            seq: 0,
            source_table: source_table.to_string(),
            source_column: source_column.to_string(),
            target_table: fk.target_table.clone(),
            target_column: fk.target_column.clone(),
            on_delete: fk.on_delete.unwrap_or(defaults.on_delete),
            on_update: fk.on_update.unwrap_or(defaults.on_update),
            constraint_name: constraint_name(source_table, source_column, &fk.target_table),
            state: ConstraintState::Pending,
            attempts: 0,
            last_error: None,
        }
    }

    /// Identity used for de-duplication: one foreign key per source column.
    pub fn column_key(&self) -> (String, String) {
        (self.source_table.clone(), self.source_column.clone())
    }

    pub fn is_self_referencing(&self) -> bool {
        self.source_table == self.target_table
    }
}
