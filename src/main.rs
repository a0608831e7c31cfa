//! Project DB - Main entry point.
//!
//! Loads settings, builds the database manager, and runs one command.

use clap::Parser;
use project_db::cli::{Cli, Command, parse_params};
use project_db::config::{SecretsSource, Settings};
use project_db::{DatabaseManager, DbError, DbResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // stdout carries command output
    let subscriber = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_tracing(&cli);

    let secrets = SecretsSource::from_path(&cli.secrets)?;
    let settings = Settings::load(&secrets)?;

    info!(
        primary = settings.primary.is_some(),
        fallback = %settings.fallback.masked_connection_string(),
        "Starting project-db v{}",
        env!("CARGO_PKG_VERSION")
    );

    let manager = Arc::new(DatabaseManager::new(settings));
    let result = run(&manager, cli.command).await;
    manager.close().await;

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        if let Some(suggestion) = e.suggestion() {
            eprintln!("Suggestion: {}", suggestion);
        }
        return Err(e.into());
    }
    Ok(())
}

async fn run(manager: &DatabaseManager, command: Command) -> DbResult<()> {
    match command {
        Command::Check => {
            let reachable = manager.test_connection().await;
            print_json(&manager.health().await)?;
            if !reachable {
                return Err(DbError::connection(
                    "No database backend is reachable",
                    "Check the [primary] and [fallback] sections of the secrets file",
                ));
            }
        }
        Command::Init => print_json(&manager.ensure_schema().await?)?,
        Command::Query { sql, params } => {
            print_json(&manager.execute(&sql, &parse_params(&params)).await?)?
        }
        Command::Scalar { sql, params } => {
            print_json(&manager.execute_scalar(&sql, &parse_params(&params)).await)?
        }
        Command::Backup { path } => {
            let outcome = manager.export_backup(&path).await;
            print_json(&outcome)?;
            if !outcome.success {
                return Err(DbError::backup(outcome.error.unwrap_or_default()));
            }
        }
        Command::Stats => {
            let database = manager.database_stats().await?;
            print_json(&serde_json::json!({
                "performance": manager.stats(),
                "total_rows": database.total_rows(),
                "database": database,
            }))?
        }
        Command::Optimize => print_json(&manager.optimize().await?)?,
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> DbResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| DbError::internal(format!("Failed to serialize output: {}", e)))?;
    println!("{}", text);
    Ok(())
}
