//! Performance, health, and maintenance report models.

use crate::models::connection::{BackendId, Dialect, HealthRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// One executed statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSample {
    /// Statement text with whitespace collapsed, truncated.
    pub query_fingerprint: String,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
    /// Parameter types only, e.g. `[int, string]`.
    pub params_summary: String,
    pub success: bool,
}

/// Running totals over every executed statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceAggregate {
    pub total_queries: u64,
    pub failed_queries: u64,
    /// Running mean in seconds.
    pub avg_query_time: f64,
}

impl PerformanceAggregate {
    /// Fold one sample into the totals.
    pub fn observe(&mut self, duration: Duration, success: bool) {
        self.total_queries += 1;
        if !success {
            self.failed_queries += 1;
        }
        let n = self.total_queries as f64;
        self.avg_query_time = (self.avg_query_time * (n - 1.0) + duration.as_secs_f64()) / n;
    }
}

/// Snapshot returned by `DatabaseManager::stats`.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    #[serde(flatten)]
    pub aggregate: PerformanceAggregate,
    pub slow_query_threshold_ms: u64,
    pub recent_queries: Vec<PerformanceSample>,
    pub slow_queries: Vec<PerformanceSample>,
}

/// Per-backend pool state.
#[derive(Debug, Clone, Serialize)]
pub struct PoolIntrospection {
    pub backend_id: BackendId,
    pub dialect: Dialect,
    pub target: String,
    pub constructed: bool,
    pub size: u32,
    pub idle: usize,
    pub max_connections: u32,
    /// Number of times an engine was built for this backend.
    pub constructions: usize,
    pub health: HealthRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The primary is in use.
    Healthy,
    /// Running on the fallback.
    Degraded,
    /// No backend has been reached yet.
    Unknown,
}

/// Snapshot returned by `DatabaseManager::health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub backend_in_use: Option<BackendId>,
    pub pools: Vec<PoolIntrospection>,
    pub performance: PerformanceAggregate,
}

/// Row counts per catalog table.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub backend: BackendId,
    pub dialect: Dialect,
    pub table_counts: BTreeMap<String, i64>,
    /// Tables that could not be counted.
    pub missing_tables: Vec<String>,
}

impl DatabaseStats {
    pub fn total_rows(&self) -> i64 {
        self.table_counts.values().sum()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OptimizeReport {
    pub statements_run: usize,
    pub statements_failed: usize,
    pub errors: Vec<String>,
}

/// Outcome of `DatabaseManager::export_backup`. Failures are reported here
/// rather than raised.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackupOutcome {
    pub success: bool,
    pub tables_exported: usize,
    pub rows_exported: u64,
    /// Tables that could not be read; the backup continued without them.
    pub skipped_tables: Vec<String>,
    pub error: Option<String>,
}

fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}
