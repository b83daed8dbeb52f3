//! db-reconcile CLI - schema diff and data sync between databases.

use clap::{Parser, Subcommand};
use db_reconcile::validator;
use db_reconcile::{Config, Reconciler, ReconcileError, RunStatus};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "db-reconcile")]
#[command(about = "Schema diff and data sync for PostgreSQL, MySQL/MariaDB and SQLite")]
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
    /// Compare source and target schemas
    Diff {
        /// Execute the migration SQL on the target
        #[arg(long)]
        apply: bool,

        /// Print only the migration SQL
        #[arg(long, conflicts_with = "apply")]
        sql_only: bool,
    },

    /// Sync the rows of one table from source to target
    Sync {
        /// Table to sync
        #[arg(long)]
        table: String,

        /// Primary key columns, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        pk: Vec<String>,

        /// Report row differences without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Count row differences for one table
    DataDiff {
        /// Table to compare
        #[arg(long)]
        table: String,

        /// Primary key columns, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        pk: Vec<String>,
    },

    /// Test database connections
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

async fn run() -> Result<(), ReconcileError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    if let Commands::HealthCheck = cli.command {
        return health_check(&config, cli.output_json).await;
    }

    let cancel_token = setup_signal_handler();
    let reconciler = Reconciler::new(config).await?;
    let result = dispatch(&reconciler, cli.command, cli.output_json, &cancel_token).await;
    reconciler.close().await;
    result
}

async fn dispatch(
    reconciler: &Reconciler,
    command: Commands,
    output_json: bool,
    cancel_token: &CancellationToken,
) -> Result<(), ReconcileError> {
    match command {
        Commands::HealthCheck => unreachable!(), // Handled above

        Commands::Diff { apply, sql_only } => {
            let diff = reconciler.diff().await?;
            let statements = db_reconcile::get_migration_sql(&diff);

            if sql_only {
                for sql in &statements {
                    println!("{};", sql);
                }
                return Ok(());
            }

            if !apply {
                if output_json {
                    println!("{}", serde_json::to_string_pretty(&diff)?);
                } else {
                    print!("{}", diff);
                    if !statements.is_empty() {
                        println!("\nMigration SQL:");
                        for sql in &statements {
                            println!("  {};", sql);
                        }
                    }
                }
                return Ok(());
            }

            for sql in &statements {
                if let Some(reason) = validator::classify_statement(sql) {
                    warn!("{}: {}", reason, sql);
                }
            }

            let record = reconciler.apply(&diff).await?;
            if output_json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!(
                    "\nMigration {}!",
                    if record.success { "applied" } else { "failed" }
                );
                println!("  Record ID: {}", record.id);
                println!("  Target: {}", record.connection_id);
                println!(
                    "  Statements: {}/{}",
                    record.statements.len(),
                    statements.len()
                );
                if let Some(ref err) = record.error {
                    println!("  Error: {}", err);
                }
            }

            if let Some(err) = record.error {
                return Err(ReconcileError::Query(err));
            }
        }

        Commands::Sync { table, pk, dry_run } => {
            if dry_run {
                let diff = reconciler.data_diff(&table, &pk).await?;
                if output_json {
                    println!("{}", serde_json::to_string_pretty(&diff)?);
                } else {
                    println!("\nDry run for {}:", diff.table);
                    println!("  Would insert: {}", diff.missing_in_target);
                    println!("  Would update: {}", diff.rows_different);
                    println!("  Extra in target: {}", diff.missing_in_source);
                }
                return Ok(());
            }

            let run = reconciler.sync_table(&table, &pk, cancel_token).await?;

            if output_json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                println!("\nSync {}!", run.status.as_str());
                println!("  Run ID: {}", run.id);
                if let Some(secs) = run.duration_secs() {
                    println!("  Duration: {:.2}s", secs);
                }
                println!(
                    "  Inserts: {}, Updates: {}, Deletes: {}",
                    run.inserts, run.updates, run.deletes
                );
                println!(
                    "  Batches: {}/{}",
                    run.batches_applied, run.batches_attempted
                );
                for err in &run.errors {
                    println!("  Error: {}", err);
                }
            }

            match run.status {
                RunStatus::Cancelled => return Err(ReconcileError::Cancelled),
                RunStatus::Failed => {
                    return Err(ReconcileError::batch(
                        run.batches_attempted,
                        run.errors.last().cloned().unwrap_or_default(),
                    ))
                }
                _ => {}
            }
        }

        Commands::DataDiff { table, pk } => {
            let diff = reconciler.data_diff(&table, &pk).await?;
            if output_json {
                println!("{}", serde_json::to_string_pretty(&diff)?);
            } else {
                println!("Data diff for {}:", diff.table);
                println!("  Source rows: {}", diff.source_rows);
                println!("  Target rows: {}", diff.target_rows);
                println!("  Missing in target: {}", diff.missing_in_target);
                println!("  Missing in source: {}", diff.missing_in_source);
                println!("  Different: {}", diff.rows_different);
            }
        }
    }

    Ok(())
}

async fn health_check(config: &Config, output_json: bool) -> Result<(), ReconcileError> {
    let result = Reconciler::health_check(config).await;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Health Check Results:");
        println!(
            "  Source ({}): {} ({}ms)",
            config.source.r#type,
            if result.source_connected { "OK" } else { "FAILED" },
            result.source_latency_ms
        );
        if let Some(ref version) = result.source_version {
            println!("    Version: {}", version);
        }
        if let Some(ref err) = result.source_error {
            println!("    Error: {}", err);
        }
        println!(
            "  Target ({}): {} ({}ms)",
            config.target.r#type,
            if result.target_connected { "OK" } else { "FAILED" },
            result.target_latency_ms
        );
        if let Some(ref version) = result.target_version {
            println!("    Version: {}", version);
        }
        if let Some(ref err) = result.target_error {
            println!("    Error: {}", err);
        }
        println!(
            "\n  Overall: {}",
            if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
        );
    }

    if !result.healthy {
        return Err(ReconcileError::connection(
            "health-check",
            "one or more databases are unreachable",
        ));
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT or SIGTERM.
///
/// A running sync stops before its next batch.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping after the current batch...", name);
                    token.cancel();
                });
            }
            Err(e) => warn!("Failed to install {} handler: {}", name, e),
        }
    }

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current batch...");
            token.cancel();
        }
    });

    cancel_token
}
