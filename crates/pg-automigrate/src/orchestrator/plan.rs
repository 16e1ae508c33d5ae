//! Offline preview of what a session would execute for a model set.

use super::SessionSettings;
use crate::ddl::{render_add_constraint, render_create_table};
use crate::error::Result;
use crate::registry::PendingConstraint;
use crate::schema::{classify_table, ClassifyContext, CreationOrder, DependencyGraph, ModelSet};
use serde::Serialize;
use std::collections::HashSet;

/// One table's rendered statement in a preview.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedTable {
    pub table: String,
    pub statement: String,
    pub deferred: Vec<String>,
}

/// Statements a sequential run would issue, in order.
#[derive(Debug, Clone, Serialize)]
pub struct PlanPreview {
    pub creation_order: Vec<String>,
    pub broken_edges: Vec<(String, String)>,
    pub tables: Vec<PlannedTable>,
    /// `ALTER TABLE … ADD CONSTRAINT` statements for deferred foreign keys.
    pub constraint_statements: Vec<String>,
    /// Deferred foreign keys whose target is neither a model nor pre-existing.
    pub unresolved: Vec<String>,
}

/// Classify every model (explicit and implicit references only) and order
/// the tables by dependency.
pub fn build_creation_order(models: &ModelSet) -> Result<CreationOrder> {
    let empty = HashSet::new();
    let tables = models
        .iter()
        .map(|model| {
            let ctx = ClassifyContext {
                primary_key: models
                    .primary_key_of(model.table())
                    .unwrap_or(models.default_primary_key()),
                default_target_key: models.default_primary_key(),
                naming_fallback: false,
                existing: &empty,
                models: Some(models),
            };
            classify_table(model.table(), &model.attributes, &ctx)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(DependencyGraph::from_tables(&tables).creation_order())
}

/// Simulate a sequential run against a database that already holds `existing`.
pub fn preview(
    models: &ModelSet,
    settings: &SessionSettings,
    existing: &HashSet<String>,
) -> Result<PlanPreview> {
    let order = build_creation_order(models)?;
    let mut created = existing.clone();
    let mut deferred: Vec<PendingConstraint> = Vec::new();
    let mut tables = Vec::with_capacity(order.tables.len());

    for table in &order.tables {
        let Some(model) = models.get(table) else {
            continue;
        };
        let ctx = ClassifyContext {
            primary_key: models
                .primary_key_of(table)
                .unwrap_or(models.default_primary_key()),
            default_target_key: models.default_primary_key(),
            naming_fallback: settings.naming_convention_fallback,
            existing: &created,
            models: Some(models),
        };
        let definition = classify_table(table, &model.attributes, &ctx)?;
        let ddl = render_create_table(&settings.schema, &definition, &created, &settings.defaults)?;

        tables.push(PlannedTable {
            table: table.clone(),
            statement: ddl.statement,
            deferred: ddl.deferred.iter().map(|c| c.constraint_name.clone()).collect(),
        });
        deferred.extend(ddl.deferred);
        created.insert(table.clone());
    }

    let mut constraint_statements = Vec::new();
    let mut unresolved = Vec::new();
    for constraint in &deferred {
        if created.contains(&constraint.target_table) {
            constraint_statements.push(render_add_constraint(&settings.schema, constraint)?);
        } else {
            unresolved.push(constraint.constraint_name.clone());
        }
    }

    Ok(PlanPreview {
        creation_order: order.tables,
        broken_edges: order.broken_edges,
        tables,
        constraint_statements,
        unresolved,
    })
}
