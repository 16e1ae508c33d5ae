//! Deferred-constraint application.
//!
//! Two entry points: [`apply_ready`] runs right after a table is created, on
//! the creating call's connection; [`sweep`] runs a batch of everything whose
//! target exists inside one transaction. Neither ever fails the caller: every
//! outcome is folded into the returned report and the registry.

use crate::ddl::render_add_constraint;
use crate::error::{AutomigrateError, DriverError, Result};
use crate::registry::{ConstraintState, PendingConstraint, TableRegistry};
use crate::target::SchemaExecutor;
use serde::Serialize;
use tracing::{debug, info, warn};

const SAVEPOINT: &str = "automigrate_fk";

/// Outcome counters for one batch of constraint attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub attempted: usize,
    pub applied: usize,
    /// Already present in the database; counted as applied too.
    pub duplicates: usize,
    /// Target table missing; left pending.
    pub missing_target: usize,
    /// Any other failure.
    pub failed: usize,
}

impl ApplyReport {
    pub fn merge(&mut self, other: &ApplyReport) {
        self.attempted += other.attempted;
        self.applied += other.applied;
        self.duplicates += other.duplicates;
        self.missing_target += other.missing_target;
        self.failed += other.failed;
    }
}

/// Report of one quiescence or completion pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub pass: usize,
    pub final_pass: bool,
    pub committed: bool,
    #[serde(flatten)]
    pub counts: ApplyReport,
    /// Constraints given up on in this pass.
    pub unresolved: Vec<PendingConstraint>,
}

/// Issue one `ALTER TABLE … ADD CONSTRAINT`. Failures come back as
/// `ConstraintAlreadyExists`, `ReferencedTableMissing` or
/// `ConstraintApplication`.
async fn attempt<E>(exec: &E, schema: &str, constraint: &mut PendingConstraint) -> Result<()>
where
    E: SchemaExecutor + ?Sized,
{
    constraint.attempts += 1;
    let sql = render_add_constraint(schema, constraint).map_err(|e| {
        AutomigrateError::ConstraintApplication {
            constraint: constraint.constraint_name.clone(),
            message: e.to_string(),
        }
    })?;
    debug!(
        "Applying {} ({}.{} -> {}.{})",
        constraint.constraint_name,
        constraint.source_table,
        constraint.source_column,
        constraint.target_table,
        constraint.target_column
    );
    exec.execute(&sql)
        .await
        .map_err(|e| classify(constraint, e))
}

fn classify(constraint: &PendingConstraint, e: DriverError) -> AutomigrateError {
    if e.is_duplicate() {
        AutomigrateError::ConstraintAlreadyExists(constraint.constraint_name.clone())
    } else if e.is_undefined_table() {
        AutomigrateError::ReferencedTableMissing {
            constraint: constraint.constraint_name.clone(),
            target: constraint.target_table.clone(),
        }
    } else {
        AutomigrateError::ConstraintApplication {
            constraint: constraint.constraint_name.clone(),
            message: e.to_string(),
        }
    }
}

/// Record one attempt's outcome. Returns true when the constraint is done.
fn record(
    report: &mut ApplyReport,
    constraint: &mut PendingConstraint,
    outcome: &Result<()>,
) -> bool {
    report.attempted += 1;
    match outcome {
        Ok(()) => {
            report.applied += 1;
            constraint.state = ConstraintState::Applied;
            debug!("Applied constraint {}", constraint.constraint_name);
            true
        }
        Err(AutomigrateError::ConstraintAlreadyExists(name)) => {
            report.applied += 1;
            report.duplicates += 1;
            constraint.state = ConstraintState::Applied;
            info!("Constraint {} already exists, treating as applied", name);
            true
        }
        Err(e @ AutomigrateError::ReferencedTableMissing { .. }) => {
            report.missing_target += 1;
            debug!("{}, keeping it pending", e);
            constraint.last_error = Some(e.to_string());
            false
        }
        Err(e) => {
            report.failed += 1;
            warn!("{}", e);
            constraint.last_error = Some(e.to_string());
            false
        }
    }
}

/// Attempt constraints that just became ready, one statement each, on the
/// caller's connection. Constraints that did not apply go back to the registry.
pub async fn apply_ready<E>(
    exec: &E,
    schema: &str,
    registry: &TableRegistry,
    ready: Vec<PendingConstraint>,
) -> ApplyReport
where
    E: SchemaExecutor + ?Sized,
{
    let mut report = ApplyReport::default();
    let mut applied = Vec::new();
    let mut retry = Vec::new();

    for mut constraint in ready {
        let outcome = attempt(exec, schema, &mut constraint).await;
        if record(&mut report, &mut constraint, &outcome) {
            applied.push(constraint);
        } else {
            retry.push(constraint);
        }
    }

    registry.mark_applied(&applied).await;
    registry.requeue(retry).await;
    report
}

/// One batch pass over every pending constraint whose target exists.
///
/// All statements run in a single transaction; each `ALTER TABLE` is wrapped
/// in a savepoint so one failure does not abort the rest. On the final pass
/// whatever is left (failed or still waiting for a missing table) is marked
/// permanently unresolved and removed from the registry.
pub async fn sweep<E>(
    exec: &E,
    schema: &str,
    registry: &TableRegistry,
    pass: usize,
    final_pass: bool,
) -> SweepReport
where
    E: SchemaExecutor + ?Sized,
{
    let mut report = SweepReport {
        pass,
        final_pass,
        ..Default::default()
    };

    let claimed = registry.claim_ready().await;
    let mut leftovers = Vec::new();

    if !claimed.is_empty() {
        debug!("Sweep pass {}: {} constraint(s) ready", pass, claimed.len());
        match exec.execute("BEGIN").await {
            Ok(()) => {
                let (applied, retry) = run_in_transaction(exec, schema, claimed, &mut report).await;
                match exec.execute("COMMIT").await {
                    Ok(()) => {
                        report.committed = true;
                        registry.mark_applied(&applied).await;
                        leftovers = retry;
                    }
                    Err(e) => {
                        warn!("Sweep pass {}: commit failed, rolling back: {}", pass, e);
                        if let Err(e) = exec.execute("ROLLBACK").await {
                            debug!("Rollback after failed commit: {}", e);
                        }
                        report.counts.applied = 0;
                        report.counts.duplicates = 0;
                        leftovers = applied
                            .into_iter()
                            .chain(retry)
                            .map(|mut c| {
                                c.state = ConstraintState::Pending;
                                c
                            })
                            .collect();
                        leftovers.sort_by_key(|c| c.seq);
                    }
                }
            }
            Err(e) => {
                warn!("Sweep pass {}: could not open transaction: {}", pass, e);
                leftovers = claimed;
            }
        }
    }

    if final_pass {
        leftovers.extend(registry.drain_pending().await);
        leftovers.sort_by_key(|c| c.seq);
        for mut constraint in leftovers {
            constraint.state = ConstraintState::PermanentlyUnresolved;
            warn!(
                "Constraint {} left unresolved ({}.{} -> {}){}",
                constraint.constraint_name,
                constraint.source_table,
                constraint.source_column,
                constraint.target_table,
                constraint
                    .last_error
                    .as_deref()
                    .map(|e| format!(": {}", e))
                    .unwrap_or_default()
            );
            report.unresolved.push(constraint);
        }
    } else {
        registry.requeue(leftovers).await;
    }

    info!(
        "Sweep pass {}: {} attempted, {} applied, {} failed, {} waiting on missing tables, {} unresolved",
        pass,
        report.counts.attempted,
        report.counts.applied,
        report.counts.failed,
        report.counts.missing_target,
        report.unresolved.len()
    );
    report
}

async fn run_in_transaction<E>(
    exec: &E,
    schema: &str,
    claimed: Vec<PendingConstraint>,
    report: &mut SweepReport,
) -> (Vec<PendingConstraint>, Vec<PendingConstraint>)
where
    E: SchemaExecutor + ?Sized,
{
    let mut applied = Vec::new();
    let mut retry = Vec::new();

    for mut constraint in claimed {
        let outcome = match exec.execute(&format!("SAVEPOINT {}", SAVEPOINT)).await {
            Ok(()) => {
                let outcome = attempt(exec, schema, &mut constraint).await;
                let cleanup = match outcome {
                    Ok(()) => format!("RELEASE SAVEPOINT {}", SAVEPOINT),
                    Err(_) => format!("ROLLBACK TO SAVEPOINT {}", SAVEPOINT),
                };
                if let Err(e) = exec.execute(&cleanup).await {
                    debug!("{} failed: {}", cleanup, e);
                }
                outcome
            }
            Err(e) => {
                constraint.attempts += 1;
                Err(classify(&constraint, e))
            }
        };

        if record(&mut report.counts, &mut constraint, &outcome) {
            applied.push(constraint);
        } else {
            retry.push(constraint);
        }
    }

    (applied, retry)
}
