//! Migration session - the context that owns all automigration state.
//!
//! A [`MigrationSession`] holds the table registry, the deferred-constraint
//! queue, the optional quiescence timer and the run statistics for one
//! datastore. It is cheap to clone and safe to share between tasks: table
//! definitions may run concurrently, each on its own connection.

mod applier;
mod plan;
mod quiescence;

pub use applier::{apply_ready, sweep, ApplyReport, SweepReport};
pub use plan::{build_creation_order, preview, PlanPreview, PlannedTable};
pub use quiescence::QuiescenceTimer;

use crate::config::Config;
use crate::core::identifier::validate_identifier;
use crate::ddl::{render_create_schema, render_create_table, render_drop_table};
use crate::error::{AutomigrateError, Result};
use crate::registry::{ActionDefaults, PendingConstraint, TableRegistry};
use crate::schema::{classify_table, ClassifyContext, CreationOrder, ModelSet};
use crate::target::{Connector, SchemaExecutor};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Behavior knobs for a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub schema: String,
    pub create_schemas: bool,
    pub primary_key: String,
    pub naming_convention_fallback: bool,
    pub deferred_passes: usize,
    pub sweep_cooldown: Option<Duration>,
    pub workers: usize,
    pub defaults: ActionDefaults,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            create_schemas: true,
            primary_key: "id".to_string(),
            naming_convention_fallback: false,
            deferred_passes: 2,
            sweep_cooldown: None,
            workers: 4,
            defaults: ActionDefaults::default(),
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let am = &config.automigrate;
        Ok(Self {
            schema: config.datastore.schema.clone(),
            create_schemas: config.datastore.create_schemas,
            primary_key: am.primary_key.clone(),
            naming_convention_fallback: am.naming_convention_fallback,
            deferred_passes: am.deferred_passes.max(1),
            sweep_cooldown: am.sweep_cooldown_ms.map(Duration::from_millis),
            workers: am.workers.max(1),
            defaults: ActionDefaults {
                on_delete: am.on_delete()?,
                on_update: am.on_update()?,
            },
        })
    }
}

/// Result of one successful `define_table` call.
#[derive(Debug, Clone, Serialize)]
pub struct DefineOutcome {
    pub table: String,
    pub statement: String,
    pub inline_constraints: usize,
    pub deferred_constraints: usize,
    /// Constraints attempted right after creation (this table's own
    /// self-references and anything that was waiting for it).
    pub applied: ApplyReport,
}

/// A table definition that failed.
#[derive(Debug, Clone, Serialize)]
pub struct TableFailure {
    pub table: String,
    pub error: String,
}

/// Summary of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub tables_expected: usize,
    pub tables_created: usize,
    pub tables_failed: usize,
    pub failed_tables: Vec<TableFailure>,
    pub constraints_inline: usize,
    pub constraints: ApplyReport,
    pub passes: Vec<SweepReport>,
    pub unresolved: Vec<PendingConstraint>,
}

impl SessionReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Default)]
struct PlanState {
    models: Option<ModelSet>,
    order: Vec<String>,
    expected: usize,
}

#[derive(Debug, Default)]
struct SessionStats {
    created: HashSet<String>,
    failed: Vec<TableFailure>,
    inline: usize,
    constraints: ApplyReport,
    passes: Vec<SweepReport>,
    unresolved: Vec<PendingConstraint>,
}

struct SessionInner<C: Connector> {
    id: String,
    connector: C,
    settings: SessionSettings,
    registry: TableRegistry,
    plan: RwLock<PlanState>,
    stats: Mutex<SessionStats>,
    namespaces: Mutex<HashSet<String>>,
    /// Held for the duration of a sweep or completion run.
    sweep_lock: Mutex<()>,
    timer: QuiescenceTimer,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
}

/// Automigration session for one datastore.
pub struct MigrationSession<C: Connector> {
    inner: Arc<SessionInner<C>>,
}

impl<C: Connector> Clone for MigrationSession<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Connector> MigrationSession<C> {
    pub fn new(connector: C, settings: SessionSettings) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        info!("Starting automigration session {}", id);
        Self {
            inner: Arc::new(SessionInner {
                id,
                connector,
                timer: QuiescenceTimer::new(settings.sweep_cooldown),
                settings,
                registry: TableRegistry::new(),
                plan: RwLock::new(PlanState::default()),
                stats: Mutex::new(SessionStats::default()),
                namespaces: Mutex::new(HashSet::new()),
                sweep_lock: Mutex::new(()),
                cancel: CancellationToken::new(),
                started_at: Utc::now(),
            }),
        }
    }

    pub fn from_config(connector: C, config: &Config) -> Result<Self> {
        Ok(Self::new(connector, SessionSettings::from_config(config)?))
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.inner.registry
    }

    /// Token cancelled by [`teardown`](Self::teardown).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.inner.cancel.is_cancelled() {
            return Err(AutomigrateError::Cancelled);
        }
        Ok(())
    }

    /// Registration pass: classify all models, build the dependency graph and
    /// record the creation order and expected table count.
    pub async fn register_models(&self, models: ModelSet) -> Result<CreationOrder> {
        let order = build_creation_order(&models)?;
        info!(
            "Registered {} models; creation order: {}",
            models.len(),
            order.tables.join(", ")
        );
        for (table, target) in &order.broken_edges {
            info!(
                "Circular reference {} -> {}: constraint will be deferred",
                table, target
            );
        }

        let mut plan = self.inner.plan.write().await;
        plan.expected = models.len();
        plan.order = order.tables.clone();
        plan.models = Some(models);
        Ok(order)
    }

    /// Creation order from the last registration pass.
    pub async fn creation_order(&self) -> Vec<String> {
        self.inner.plan.read().await.order.clone()
    }

    /// Seed the registry with the tables that already exist in the schema.
    pub async fn rebuild_from_database(&self) -> Result<usize> {
        let conn = self.inner.connector.acquire().await?;
        let tables = conn.list_tables(&self.inner.settings.schema).await?;
        let count = tables.len();
        self.inner.registry.seed_existing(tables).await;
        info!(
            "Registry rebuilt: {} existing table(s) in schema {}",
            count, self.inner.settings.schema
        );
        Ok(count)
    }

    /// Create one table (if it does not exist) and resolve whatever
    /// constraints its creation unblocks.
    ///
    /// Definition and DDL errors fail the call; constraint failures never do.
    pub async fn define_table(
        &self,
        table: &str,
        attributes: &Map<String, Value>,
    ) -> Result<DefineOutcome> {
        self.check_cancelled()?;

        match self.define_table_inner(table, attributes).await {
            Ok(outcome) => {
                let mut stats = self.inner.stats.lock().await;
                stats.created.insert(outcome.table.clone());
                stats.inline += outcome.inline_constraints;
                stats.constraints.merge(&outcome.applied);
                drop(stats);

                self.arm_timer().await;
                Ok(outcome)
            }
            Err(e) => {
                warn!("Failed to define table {}: {}", table, e);
                self.inner.stats.lock().await.failed.push(TableFailure {
                    table: table.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn define_table_inner(
        &self,
        table: &str,
        attributes: &Map<String, Value>,
    ) -> Result<DefineOutcome> {
        let settings = &self.inner.settings;
        let conn = self.inner.connector.acquire().await?;
        self.ensure_namespace(&conn, &settings.schema).await?;

        let existing = self.inner.registry.snapshot().await;
        let definition = {
            let plan = self.inner.plan.read().await;
            let models = plan.models.as_ref();
            let ctx = ClassifyContext {
                primary_key: models
                    .and_then(|m| m.primary_key_of(table))
                    .unwrap_or(&settings.primary_key),
                default_target_key: &settings.primary_key,
                naming_fallback: settings.naming_convention_fallback,
                existing: &existing,
                models,
            };
            classify_table(table, attributes, &ctx)?
        };

        let ddl = render_create_table(&settings.schema, &definition, &existing, &settings.defaults)?;
        debug!("{}", ddl.statement);
        conn.execute(&ddl.statement).await.map_err(|e| {
            error!("CREATE TABLE {} failed: {}", table, e);
            AutomigrateError::Driver(e)
        })?;

        let deferred = ddl.deferred.len();
        let inline = definition.foreign_keys().count() - deferred;
        info!(
            "Created table {}.{} ({} inline, {} deferred foreign keys)",
            settings.schema, table, inline, deferred
        );

        let ready = self
            .inner
            .registry
            .register_created(table, ddl.deferred)
            .await;
        let applied = apply_ready(&conn, &settings.schema, &self.inner.registry, ready).await;

        Ok(DefineOutcome {
            table: table.to_string(),
            statement: ddl.statement,
            inline_constraints: inline,
            deferred_constraints: deferred,
            applied,
        })
    }

    async fn ensure_namespace(&self, conn: &C::Conn, schema: &str) -> Result<()> {
        if !self.inner.settings.create_schemas || schema == "public" {
            return Ok(());
        }
        let mut namespaces = self.inner.namespaces.lock().await;
        if namespaces.contains(schema) {
            return Ok(());
        }
        conn.execute(&render_create_schema(schema)?).await?;
        namespaces.insert(schema.to_string());
        debug!("Ensured schema {}", schema);
        Ok(())
    }

    /// `CREATE SCHEMA IF NOT EXISTS`.
    pub async fn create_schema_namespace(&self, schema: &str) -> Result<()> {
        let conn = self.inner.connector.acquire().await?;
        conn.execute(&render_create_schema(schema)?).await?;
        self.inner
            .namespaces
            .lock()
            .await
            .insert(schema.to_string());
        info!("Created schema {}", schema);
        Ok(())
    }

    /// `DROP TABLE IF EXISTS … CASCADE` and forget the table.
    pub async fn drop_table(&self, table: &str) -> Result<()> {
        validate_identifier(table)?;
        let conn = self.inner.connector.acquire().await?;
        conn.execute(&render_drop_table(&self.inner.settings.schema, table)?)
            .await?;
        self.inner.registry.remove_table(table).await;
        info!("Dropped table {}.{}", self.inner.settings.schema, table);
        Ok(())
    }

    async fn arm_timer(&self) {
        if !self.inner.timer.is_enabled() {
            return;
        }
        let session = self.clone();
        self.inner
            .timer
            .arm(async move {
                session.quiescence_sweep().await;
            })
            .await;
    }

    /// Non-final sweep fired by the cooldown timer.
    async fn quiescence_sweep(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        let _guard = self.inner.sweep_lock.lock().await;
        let conn = match self.inner.connector.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Quiescence sweep skipped: {}", e);
                return;
            }
        };
        self.refresh_existing(&conn).await;
        let pass = self.inner.stats.lock().await.passes.len() + 1;
        let report = sweep(&conn, &self.inner.settings.schema, &self.inner.registry, pass, false).await;
        drop(conn);
        self.record_pass(report).await;
    }

    /// Pick up tables created outside this session before a sweep.
    async fn refresh_existing(&self, conn: &C::Conn) {
        match conn.list_tables(&self.inner.settings.schema).await {
            Ok(tables) => self.inner.registry.seed_existing(tables).await,
            Err(e) => warn!("Could not list existing tables before sweep: {}", e),
        }
    }

    async fn record_pass(&self, report: SweepReport) {
        let mut stats = self.inner.stats.lock().await;
        stats.constraints.merge(&report.counts);
        stats.unresolved.extend(report.unresolved.iter().cloned());
        stats.passes.push(report);
    }

    /// Completion signal: all tables are defined. Runs the bounded resolution
    /// passes; the last one gives up on whatever is still pending.
    pub async fn complete(&self) -> Result<SessionReport> {
        self.inner.timer.cancel().await;
        let _guard = self.inner.sweep_lock.lock().await;

        let expected = self.inner.plan.read().await.expected;
        let created = self.inner.stats.lock().await.created.len();
        if expected > 0 && created < expected {
            warn!(
                "Completing with {} of {} expected tables defined",
                created, expected
            );
        }

        let conn = self.inner.connector.acquire().await?;
        self.refresh_existing(&conn).await;
        let passes = self.inner.settings.deferred_passes;
        for i in 1..=passes {
            self.check_cancelled()?;
            let pass = self.inner.stats.lock().await.passes.len() + 1;
            let report = sweep(
                &conn,
                &self.inner.settings.schema,
                &self.inner.registry,
                pass,
                i == passes,
            )
            .await;
            self.record_pass(report).await;
        }
        drop(conn);

        let report = self.report().await;
        info!(
            "Session {} {}: {} table(s) created, {} failed, {} constraint(s) applied, {} unresolved",
            report.session_id,
            report.status,
            report.tables_created,
            report.tables_failed,
            report.constraints.applied,
            report.unresolved.len()
        );
        Ok(report)
    }

    /// Define every registered model in creation order with bounded
    /// concurrency, then signal completion.
    pub async fn run_plan(&self) -> Result<SessionReport> {
        let jobs: Vec<(String, Map<String, Value>)> = {
            let plan = self.inner.plan.read().await;
            let models = plan
                .models
                .as_ref()
                .ok_or_else(|| AutomigrateError::Config("no models registered".into()))?;
            plan.order
                .iter()
                .filter_map(|t| models.get(t).map(|m| (t.clone(), m.attributes.clone())))
                .collect()
        };

        let workers = self.inner.settings.workers;
        info!("Defining {} tables with {} workers", jobs.len(), workers);

        let semaphore = Arc::new(Semaphore::new(workers));
        let abort = self.inner.cancel.child_token();
        let fatal: Arc<Mutex<Option<AutomigrateError>>> = Arc::new(Mutex::new(None));
        let mut handles = Vec::new();

        for (table, attributes) in jobs {
            if abort.is_cancelled() {
                info!("Stopping before {}: run aborted", table);
                break;
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| AutomigrateError::Cancelled)?;

            let session = self.clone();
            let abort = abort.clone();
            let fatal = fatal.clone();
            let handle = tokio::spawn(async move {
                let result = session.define_table(&table, &attributes).await;
                drop(permit);
                if let Err(AutomigrateError::ConnectionFailure { message, context }) = &result {
                    fatal.lock().await.get_or_insert_with(|| {
                        AutomigrateError::connection(message, context.clone())
                    });
                    abort.cancel();
                }
                (table, result)
            });
            handles.push(handle);
        }

        for handle in handles {
            match handle.await {
                Ok((table, Ok(outcome))) => debug!(
                    "{}: done ({} inline, {} deferred)",
                    table, outcome.inline_constraints, outcome.deferred_constraints
                ),
                Ok((table, Err(e))) => debug!("{}: failed: {}", table, e),
                Err(e) => error!("Table task panicked: {}", e),
            }
        }

        if let Some(e) = fatal.lock().await.take() {
            return Err(e);
        }
        self.check_cancelled()?;
        self.complete().await
    }

    /// Current statistics as a report.
    pub async fn report(&self) -> SessionReport {
        let stats = self.inner.stats.lock().await;
        let expected = self.inner.plan.read().await.expected;
        let completed_at = Utc::now();
        let status = if self.inner.cancel.is_cancelled() {
            "cancelled"
        } else if stats.failed.is_empty() && stats.unresolved.is_empty() {
            "completed"
        } else {
            "completed_with_errors"
        };

        SessionReport {
            session_id: self.inner.id.clone(),
            status: status.to_string(),
            started_at: self.inner.started_at,
            completed_at,
            duration_seconds: (completed_at - self.inner.started_at).num_milliseconds() as f64
                / 1000.0,
            tables_expected: expected,
            tables_created: stats.created.len(),
            tables_failed: stats.failed.len(),
            failed_tables: stats.failed.clone(),
            constraints_inline: stats.inline,
            constraints: stats.constraints.clone(),
            passes: stats.passes.clone(),
            unresolved: stats.unresolved.clone(),
        }
    }

    /// Cancel the timer and any further work, and clear the registry.
    pub async fn teardown(&self) {
        self.inner.cancel.cancel();
        self.inner.timer.cancel().await;
        self.inner.registry.reset().await;
        info!("Session {} torn down", self.inner.id);
    }
}
