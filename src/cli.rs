//! Command-line interface for the `project-db` binary.

use crate::models::QueryParam;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_SECRETS_PATH: &str = "secrets.toml";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "project-db",
    about = "Database connectivity, provisioning and maintenance for the project manager",
    version
)]
pub struct Cli {
    /// Secrets file with [primary], [fallback], [pool], [retry], [monitoring]
    /// and [seed] sections.
    #[arg(long, default_value = DEFAULT_SECRETS_PATH, env = "PROJECT_DB_SECRETS")]
    pub secrets: PathBuf,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info", env = "PROJECT_DB_LOG_LEVEL")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long, env = "PROJECT_DB_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run a connection test and print the health report
    Check,
    /// Create the schema and baseline rows if missing
    Init,
    /// Run a statement and print rows or the affected count
    Query {
        sql: String,
        /// Positional parameter; repeat for each `?`
        #[arg(short, long = "param", value_name = "VALUE")]
        params: Vec<String>,
    },
    /// Print the first column of the first row
    Scalar {
        sql: String,
        #[arg(short, long = "param", value_name = "VALUE")]
        params: Vec<String>,
    },
    /// Write a logical backup to a file
    Backup { path: PathBuf },
    /// Print performance statistics and table row counts
    Stats,
    /// Run dialect maintenance statements
    Optimize,
}

/// Convert raw `--param` values into typed parameters.
pub fn parse_params(raw: &[String]) -> Vec<QueryParam> {
    raw.iter().map(|s| QueryParam::from_cli_arg(s)).collect()
}
