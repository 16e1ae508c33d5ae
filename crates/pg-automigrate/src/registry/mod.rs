//! Session-scoped record of created tables and deferred constraints.
//!
//! All reads and writes go through one async mutex. A constraint lives in the
//! pending map until it is claimed for an attempt; while in flight it is owned
//! by the applier, which either drops it (applied, unresolved) or hands it
//! back with [`TableRegistry::requeue`]. This keeps registration and sweeps
//! from attempting the same constraint twice.

mod constraint;

pub use constraint::{ActionDefaults, ConstraintState, PendingConstraint};

use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct RegistryState {
    created: HashSet<String>,
    /// target table -> constraints waiting for it
    pending: HashMap<String, Vec<PendingConstraint>>,
    /// (source table, source column) -> target table of applied constraints.
    applied: HashMap<(String, String), String>,
    next_seq: u64,
}

impl RegistryState {
    fn is_known(&self, constraint: &PendingConstraint) -> bool {
        self.applied.contains_key(&constraint.column_key())
            || self.pending.values().any(|list| {
                list.iter().any(|c| {
                    c.source_table == constraint.source_table
                        && c.source_column == constraint.source_column
                })
            })
    }

    fn enqueue(&mut self, constraint: PendingConstraint) {
        self.pending
            .entry(constraint.target_table.clone())
            .or_default()
            .push(constraint);
    }
}

/// Created tables plus constraints waiting on their targets.
#[derive(Debug, Default)]
pub struct TableRegistry {
    state: Mutex<RegistryState>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, table: &str) -> bool {
        self.state.lock().await.created.contains(table)
    }

    /// Copy of the created-table set.
    pub async fn snapshot(&self) -> HashSet<String> {
        self.state.lock().await.created.clone()
    }

    pub async fn created_count(&self) -> usize {
        self.state.lock().await.created.len()
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.values().map(Vec::len).sum()
    }

    /// Seed the created set with tables that already exist in the database.
    pub async fn seed_existing<I>(&self, tables: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut state = self.state.lock().await;
        state.created.extend(tables);
    }

    /// Record a newly created table and its deferred constraints.
    ///
    /// Returns the constraints that can be attempted right away, in insertion
    /// order: everything waiting on `table` (self-references included) plus
    /// any new constraint whose target has been created since the caller's
    /// snapshot. Returned constraints are claimed and no longer pending.
    pub async fn register_created(
        &self,
        table: &str,
        deferred: Vec<PendingConstraint>,
    ) -> Vec<PendingConstraint> {
        let mut state = self.state.lock().await;
        state.created.insert(table.to_string());

        let mut ready = Vec::new();
        for mut constraint in deferred {
            if state.is_known(&constraint) {
                debug!(
                    "Foreign key on {}.{} already tracked, not enqueued again",
                    constraint.source_table, constraint.source_column
                );
                continue;
            }
            constraint.seq = state.next_seq;
            state.next_seq += 1;

            if constraint.target_table != table && state.created.contains(&constraint.target_table)
            {
                ready.push(constraint);
            } else {
                state.enqueue(constraint);
            }
        }

        if let Some(waiting) = state.pending.remove(table) {
            ready.extend(waiting);
        }
        ready.sort_by_key(|c| c.seq);
        ready
    }

    /// Claim every pending constraint whose target exists, in insertion order.
    pub async fn claim_ready(&self) -> Vec<PendingConstraint> {
        let mut state = self.state.lock().await;
        let targets: Vec<String> = state
            .pending
            .keys()
            .filter(|t| state.created.contains(*t))
            .cloned()
            .collect();

        let mut ready = Vec::new();
        for target in targets {
            if let Some(list) = state.pending.remove(&target) {
                ready.extend(list);
            }
        }
        ready.sort_by_key(|c| c.seq);
        ready
    }

    /// Remove and return everything still pending, in insertion order.
    pub async fn drain_pending(&self) -> Vec<PendingConstraint> {
        let mut state = self.state.lock().await;
        let mut all: Vec<PendingConstraint> = state.pending.drain().flat_map(|(_, v)| v).collect();
        all.sort_by_key(|c| c.seq);
        all
    }

    /// Hand constraints back after a failed attempt.
    pub async fn requeue(&self, constraints: Vec<PendingConstraint>) {
        let mut state = self.state.lock().await;
        for constraint in constraints {
            if !state.is_known(&constraint) {
                state.enqueue(constraint);
            }
        }
    }

    /// Record constraints that reached the database.
    pub async fn mark_applied<'a, I>(&self, constraints: I)
    where
        I: IntoIterator<Item = &'a PendingConstraint>,
    {
        let mut state = self.state.lock().await;
        for constraint in constraints {
            state
                .applied
                .insert(constraint.column_key(), constraint.target_table.clone());
        }
    }

    /// Forget a dropped table: it leaves the created set, its own pending
    /// constraints are discarded, and constraints it was part of may be
    /// added again when it is recreated.
    pub async fn remove_table(&self, table: &str) {
        let mut state = self.state.lock().await;
        state.created.remove(table);
        for list in state.pending.values_mut() {
            list.retain(|c| c.source_table != table);
        }
        state.pending.retain(|_, list| !list.is_empty());
        state
            .applied
            .retain(|(source, _), target| source != table && target != table);
    }

    /// Clear all state.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        *state = RegistryState::default();
    }
}
