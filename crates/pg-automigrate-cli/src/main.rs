//! pg-automigrate CLI - PostgreSQL table automigration.

use clap::{Parser, Subcommand};
use pg_automigrate::{
    preview, AutomigrateError, Config, MigrationSession, ModelSet, PgConnector, SessionReport,
    SessionSettings,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "pg-automigrate")]
#[command(about = "PostgreSQL table automigration with deferred foreign keys")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the statements a migration would run, without connecting
    Plan {
        /// Path to the models file (YAML or JSON)
        #[arg(short, long)]
        models: PathBuf,
    },

    /// Create all tables and foreign keys for a models file
    Migrate {
        /// Path to the models file (YAML or JSON)
        #[arg(short, long)]
        models: PathBuf,

        /// Override target schema
        #[arg(long)]
        schema: Option<String>,

        /// Override number of concurrent table definitions
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Drop a table (and dependent constraints)
    Drop {
        /// Table to drop
        #[arg(long)]
        table: String,
    },

    /// Test the database connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), AutomigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(AutomigrateError::Config)?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Plan { models } => {
            let models = ModelSet::load(&models, &config.automigrate.primary_key)?;
            let settings = SessionSettings::from_config(&config)?;
            let plan = preview(&models, &settings, &HashSet::new())?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!("-- creation order: {}", plan.creation_order.join(", "));
                for (table, target) in &plan.broken_edges {
                    println!("-- cycle: {} -> {} deferred", table, target);
                }
                for table in &plan.tables {
                    println!("\n{};", table.statement);
                }
                if !plan.constraint_statements.is_empty() {
                    println!("\n-- deferred constraints");
                    for statement in &plan.constraint_statements {
                        println!("{};", statement);
                    }
                }
                if !plan.unresolved.is_empty() {
                    println!("\n-- unresolved (target table not defined):");
                    for name in &plan.unresolved {
                        println!("--   {}", name);
                    }
                }
            }
        }

        Commands::Migrate {
            models,
            schema,
            workers,
        } => {
            // Apply overrides
            if let Some(schema) = schema {
                config.datastore.schema = schema;
            }
            if let Some(w) = workers {
                config.automigrate.workers = w;
            }
            config.validate()?;

            let models = ModelSet::load(&models, &config.automigrate.primary_key)?;
            let connector = PgConnector::connect(&config.datastore).await?;
            let session = MigrationSession::from_config(connector, &config)?;

            // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
            let cancel_token = setup_signal_handler().await?;
            let on_cancel = session.clone();
            tokio::spawn(async move {
                cancel_token.cancelled().await;
                on_cancel.teardown().await;
            });

            session.rebuild_from_database().await?;
            session.register_models(models).await?;
            let report = session.run_plan().await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                print_report(&report);
            }
        }

        Commands::Drop { table } => {
            let connector = PgConnector::connect(&config.datastore).await?;
            let session = MigrationSession::from_config(connector, &config)?;
            session.drop_table(&table).await?;
            println!("Dropped {}.{}", config.datastore.schema, table);
        }

        Commands::HealthCheck => {
            let started = std::time::Instant::now();
            let connector = PgConnector::new(&config.datastore)?;
            let result = connector.health_check().await;
            let latency_ms = started.elapsed().as_millis() as u64;

            if cli.output_json {
                let json = serde_json::json!({
                    "connected": result.is_ok(),
                    "latency_ms": latency_ms,
                    "error": result.as_ref().err().map(|e| e.to_string()),
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  PostgreSQL: {} ({}ms)",
                    if result.is_ok() { "OK" } else { "FAILED" },
                    latency_ms
                );
                if let Err(ref err) = result {
                    println!("    Error: {}", err);
                }
            }

            result?;
        }
    }

    Ok(())
}

fn print_report(report: &SessionReport) {
    println!("\nAutomigration {}", report.status.replace('_', " "));
    println!("  Session ID: {}", report.session_id);
    println!("  Duration: {:.2}s", report.duration_seconds);
    println!(
        "  Tables: {}/{}",
        report.tables_created, report.tables_expected
    );
    println!(
        "  Foreign keys: {} inline, {} applied later",
        report.constraints_inline, report.constraints.applied
    );
    if !report.failed_tables.is_empty() {
        println!("  Failed tables:");
        for failure in &report.failed_tables {
            println!("    {}: {}", failure.table, failure.error);
        }
    }
    if !report.unresolved.is_empty() {
        println!("  Unresolved constraints:");
        for constraint in &report.unresolved {
            println!(
                "    {} ({}.{} -> {})",
                constraint.constraint_name,
                constraint.source_table,
                constraint.source_column,
                constraint.target_table
            );
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity: {}", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format: {}", other)),
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, AutomigrateError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let token = cancel_token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => eprintln!("\nReceived SIGINT. Shutting down..."),
            _ = sigterm.recv() => eprintln!("\nReceived SIGTERM. Shutting down..."),
        }
        token.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, AutomigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Shutting down...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
