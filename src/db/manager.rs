//! Public facade over the connection pool.
//!
//! `DatabaseManager` is the only type collaborators talk to. It acquires
//! engines through the pool, retries transient failures, records one
//! performance sample per call, provisions the schema, and writes backups.
//!
//! Construct it once and share it through an `Arc`.

use crate::config::{SeedSettings, Settings};
use crate::db::backup::BackupSink;
use crate::db::catalog::{DEFAULT_SETTINGS, default_schema};
use crate::db::executor;
use crate::db::metrics::{PerformanceTracker, fingerprint};
use crate::db::pool::{ConnectionPool, EngineHandle};
use crate::db::retry::{RetryPolicy, run_with_retry};
use crate::db::schema::{
    count_rows_query, maintenance_statements, render_index, render_table, select_all_query,
    table_exists_query, table_info_query,
};
use crate::error::{DbError, DbResult};
use crate::models::{
    BackendId, BackendSelector, BackupOutcome, DatabaseStats, ExecuteResult, HealthReport,
    HealthStatus, OptimizeReport, PerformanceStats, QueryParam, QueryRows, SchemaDefinition,
    SchemaReport, TransactionOp,
};
use chrono::Utc;
use futures_util::future::join_all;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct DatabaseManager {
    pool: ConnectionPool,
    metrics: PerformanceTracker,
    retry: RetryPolicy,
    schema: SchemaDefinition,
    seed: SeedSettings,
}

impl std::fmt::Debug for DatabaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseManager")
            .field("pool", &self.pool)
            .field("retry", &self.retry)
            .field("tables", &self.schema.tables.len())
            .finish_non_exhaustive()
    }
}

impl DatabaseManager {
    /// Create a manager over the application schema. Nothing connects until
    /// the first call.
    pub fn new(settings: Settings) -> Self {
        Self::with_schema(settings, default_schema())
    }

    pub fn with_schema(settings: Settings, schema: SchemaDefinition) -> Self {
        let Settings {
            primary,
            fallback,
            health_check_interval,
            probe_timeout,
            slow_query_threshold,
            recent_samples,
            slow_samples,
            seed,
        } = settings;

        let retry_source = primary.as_ref().unwrap_or(&fallback);
        let retry = RetryPolicy::new(retry_source.retry_attempts, retry_source.retry_delay);

        Self {
            pool: ConnectionPool::new(
                primary.into_iter().chain(std::iter::once(fallback)),
                health_check_interval,
                probe_timeout,
            ),
            metrics: PerformanceTracker::new(slow_query_threshold, recent_samples, slow_samples),
            retry,
            schema,
            seed,
        }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn schema(&self) -> &SchemaDefinition {
        &self.schema
    }

    /// Get a live engine. See `ConnectionPool::get_engine`.
    pub async fn get_engine(&self, selector: BackendSelector) -> DbResult<EngineHandle> {
        self.pool.get_engine(selector).await
    }

    // =========================================================================
    // Statement execution
    // =========================================================================

    /// Run a statement on the best available backend.
    ///
    /// Row-returning statements yield rows; anything else is committed and
    /// yields the affected count. Transient failures are retried; the engine
    /// is re-acquired on every attempt so a retry can land on the fallback.
    pub async fn execute(&self, sql: &str, params: &[QueryParam]) -> DbResult<ExecuteResult> {
        validate_sql(sql)?;
        self.timed(
            sql,
            params,
            run_with_retry(self.retry, "execute", |_| async move {
                let engine = self.pool.get_engine(BackendSelector::Auto).await?;
                executor::run(&engine, sql, params).await
            }),
        )
        .await
    }

    /// First column of the first row, or `None` on an empty result, a NULL,
    /// or any error. Errors are logged, never returned.
    pub async fn execute_scalar(&self, sql: &str, params: &[QueryParam]) -> Option<JsonValue> {
        match self.execute(sql, params).await {
            Ok(result) => result
                .into_rows()
                .and_then(|rows| rows.first_value().cloned())
                .filter(|v| !v.is_null()),
            Err(e) => {
                error!(error = %e, query = %fingerprint(sql), "Scalar query failed");
                None
            }
        }
    }

    /// Run an INSERT and return the generated identity, if any.
    pub async fn execute_insert(&self, sql: &str, params: &[QueryParam]) -> DbResult<Option<i64>> {
        validate_sql(sql)?;
        let outcome = self
            .timed(
                sql,
                params,
                run_with_retry(self.retry, "insert", |_| async move {
                    let engine = self.pool.get_engine(BackendSelector::Auto).await?;
                    executor::execute(&engine, sql, params).await
                }),
            )
            .await?;
        Ok(outcome.last_insert_id)
    }

    /// Run every op in one transaction on one backend. A transient failure
    /// re-runs the whole transaction.
    pub async fn execute_transaction(&self, ops: &[TransactionOp]) -> DbResult<u64> {
        if ops.is_empty() {
            return Err(DbError::invalid_input("Transaction has no statements"));
        }
        for op in ops {
            validate_sql(&op.sql)?;
        }
        let label = ops
            .iter()
            .map(|op| op.sql.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let params: Vec<QueryParam> = ops.iter().flat_map(|op| op.params.clone()).collect();

        let affected = self
            .timed(
                &label,
                &params,
                run_with_retry(self.retry, "transaction", |_| async move {
                    let engine = self.pool.get_engine(BackendSelector::Auto).await?;
                    executor::transaction(&engine, ops).await
                }),
            )
            .await?;
        info!(statements = ops.len(), rows_affected = affected, "Transaction committed");
        Ok(affected)
    }

    /// Run one statement for every parameter row in a single transaction.
    /// All rows commit or none do. Returns the total affected count.
    pub async fn execute_many(&self, sql: &str, rows: &[Vec<QueryParam>]) -> DbResult<u64> {
        validate_sql(sql)?;
        if rows.is_empty() {
            return Ok(0);
        }
        let sample_params = rows.first().map_or(&[][..], Vec::as_slice);
        let affected = self
            .timed(
                sql,
                sample_params,
                run_with_retry(self.retry, "batch", |_| async move {
                    let engine = self.pool.get_engine(BackendSelector::Auto).await?;
                    executor::batch(&engine, sql, rows).await
                }),
            )
            .await?;
        info!(rows = rows.len(), rows_affected = affected, "Batch committed");
        Ok(affected)
    }

    /// Run a statement on a specific engine, with retry and a sample.
    async fn run_on(
        &self,
        engine: &EngineHandle,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<ExecuteResult> {
        self.timed(
            sql,
            params,
            run_with_retry(self.retry, "execute", |_| executor::run(engine, sql, params)),
        )
        .await
    }

    async fn count_on(&self, engine: &EngineHandle, sql: &str, params: &[QueryParam]) -> DbResult<i64> {
        let rows = self
            .run_on(engine, sql, params)
            .await?
            .into_rows()
            .unwrap_or_default();
        Ok(rows.first_value().and_then(json_to_i64).unwrap_or(0))
    }

    /// Await `work` and record exactly one sample for it.
    async fn timed<T, Fut>(&self, sql: &str, params: &[QueryParam], work: Fut) -> DbResult<T>
    where
        Fut: Future<Output = DbResult<T>>,
    {
        let started = Instant::now();
        let result = work.await;
        let elapsed = started.elapsed();
        self.metrics.record(sql, params, elapsed, result.is_ok());
        debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            success = result.is_ok(),
            "Statement finished"
        );
        result
    }

    // =========================================================================
    // Schema provisioning
    // =========================================================================

    /// Create the schema and baseline rows unless the marker table exists.
    ///
    /// Every table is rendered before anything runs, so an unmapped type
    /// fails the call without touching the database. After that each DDL
    /// statement is best-effort; failures land in the report. When the
    /// marker exists, only tables still missing are created and nothing is
    /// seeded, so tables that failed on an earlier run are retried.
    pub async fn ensure_schema(&self) -> DbResult<SchemaReport> {
        let engine = self.pool.get_engine(BackendSelector::Auto).await?;
        let dialect = engine.dialect();
        let mut report = SchemaReport::default();

        let mut rendered = Vec::with_capacity(self.schema.tables.len());
        for table in &self.schema.tables {
            let ddl = render_table(table, dialect)?;
            let indexes = table
                .indexes
                .iter()
                .map(|index| render_index(&table.name, index, dialect))
                .collect::<DbResult<Vec<_>>>()?;
            rendered.push((table.name.as_str(), ddl, indexes));
        }

        let provisioned = self.table_exists(&engine, &self.schema.marker_table).await?;
        if provisioned {
            report.already_provisioned = true;
            let mut missing = Vec::new();
            for entry in rendered {
                if !self.table_exists(&engine, entry.0).await? {
                    missing.push(entry);
                }
            }
            if missing.is_empty() {
                info!(
                    backend = %engine.backend(),
                    marker = %self.schema.marker_table,
                    "Schema already provisioned"
                );
                return Ok(report);
            }
            warn!(
                backend = %engine.backend(),
                missing = missing.len(),
                "Schema provisioned but tables are missing, creating them"
            );
            rendered = missing;
        } else {
            info!(
                backend = %engine.backend(),
                dialect = %dialect,
                tables = rendered.len(),
                "Provisioning schema"
            );
        }

        for (name, ddl, indexes) in rendered {
            match self.run_on(&engine, &ddl, &[]).await {
                Ok(_) => report.created_tables.push(name.to_string()),
                Err(e) => {
                    error!(table = name, error = %e, "Failed to create table");
                    report.failed_tables.push(name.to_string());
                    report.warnings.push(format!("{}: {}", name, e));
                    continue;
                }
            }
            for index_sql in indexes {
                if let Err(e) = self.run_on(&engine, &index_sql, &[]).await {
                    warn!(table = name, error = %e, "Failed to create index");
                    report.warnings.push(format!("{} index: {}", name, e));
                }
            }
        }

        if provisioned {
            info!(created = report.created_tables.len(), "Missing tables created");
            return Ok(report);
        }

        match self.seed_admin(&engine).await {
            Ok(n) => report.seeded_rows += n,
            Err(e) => {
                warn!(error = %e, "Could not seed administrator account");
                report.warnings.push(format!("administrator seed: {}", e));
            }
        }
        let (seeded, warnings) = self.seed_settings(&engine).await;
        report.seeded_rows += seeded;
        report.warnings.extend(warnings);

        info!(
            created = report.created_tables.len(),
            failed = report.failed_tables.len(),
            seeded = report.seeded_rows,
            warnings = report.warnings.len(),
            "Schema provisioning finished"
        );
        Ok(report)
    }

    async fn table_exists(&self, engine: &EngineHandle, table: &str) -> DbResult<bool> {
        let count = self
            .count_on(engine, table_exists_query(engine.dialect()), &[table.into()])
            .await?;
        Ok(count > 0)
    }

    /// Insert the administrator unless the username is taken.
    async fn seed_admin(&self, engine: &EngineHandle) -> DbResult<u64> {
        let username = self.seed.admin_username.as_str();
        let existing = self
            .count_on(
                engine,
                "SELECT COUNT(*) FROM Users WHERE Username = ?",
                &[username.into()],
            )
            .await?;
        if existing > 0 {
            debug!(username, "Administrator already exists");
            return Ok(0);
        }

        let hash = hash_password(self.seed.admin_password.clone(), self.seed.bcrypt_rounds).await?;
        let params: [QueryParam; 8] = [
            username.into(),
            hash.into(),
            self.seed.admin_email.as_str().into(),
            "System".into(),
            "Administrator".into(),
            "Admin".into(),
            "IT".into(),
            true.into(),
        ];
        self.run_on(
            engine,
            "INSERT INTO Users (Username, PasswordHash, Email, FirstName, LastName, Role, Department, Active) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            &params,
        )
        .await?;
        info!(username, "Seeded administrator account");
        Ok(1)
    }

    /// Insert each missing default setting. Returns the inserted count and
    /// one warning per failed row.
    async fn seed_settings(&self, engine: &EngineHandle) -> (u64, Vec<String>) {
        let mut inserted = 0;
        let mut warnings = Vec::new();
        for setting in DEFAULT_SETTINGS {
            let result = async {
                let existing = self
                    .count_on(
                        engine,
                        "SELECT COUNT(*) FROM Settings WHERE SettingKey = ?",
                        &[setting.key.into()],
                    )
                    .await?;
                if existing > 0 {
                    return Ok(0);
                }
                self.run_on(
                    engine,
                    "INSERT INTO Settings (SettingKey, SettingValue, DataType, Category) \
                     VALUES (?, ?, ?, ?)",
                    &[
                        setting.key.into(),
                        setting.value.into(),
                        setting.data_type.into(),
                        setting.category.into(),
                    ],
                )
                .await?;
                Ok::<_, DbError>(1)
            }
            .await;
            match result {
                Ok(n) => inserted += n,
                Err(e) => {
                    warn!(key = setting.key, error = %e, "Could not seed setting");
                    warnings.push(format!("setting {}: {}", setting.key, e));
                }
            }
        }
        (inserted, warnings)
    }

    // =========================================================================
    // Backup and maintenance
    // =========================================================================

    /// Write every catalog table as INSERT statements to `target`.
    ///
    /// Never fails: unreadable tables are skipped, and any other failure is
    /// reported in the outcome.
    pub async fn export_backup(&self, target: impl AsRef<Path>) -> BackupOutcome {
        let target = target.as_ref();
        let mut outcome = BackupOutcome::default();
        match self.write_backup(target, &mut outcome).await {
            Ok(()) => {
                outcome.success = true;
                info!(
                    path = %target.display(),
                    tables = outcome.tables_exported,
                    rows = outcome.rows_exported,
                    skipped = outcome.skipped_tables.len(),
                    "Backup written"
                );
            }
            Err(e) => {
                error!(path = %target.display(), error = %e, "Backup failed");
                outcome.error = Some(e.to_string());
            }
        }
        outcome
    }

    async fn write_backup(&self, target: &Path, outcome: &mut BackupOutcome) -> DbResult<()> {
        let engine = self.pool.get_engine(BackendSelector::Auto).await?;
        let mut sink = BackupSink::create(target).await?;
        sink.write_header(Utc::now(), engine.backend()).await?;

        for table in self.schema.table_names() {
            let sql = select_all_query(table, engine.dialect());
            match self.run_on(&engine, &sql, &[]).await {
                Ok(result) => {
                    let rows = result.into_rows().unwrap_or_default();
                    outcome.rows_exported += sink.write_table(table, &rows).await?;
                    outcome.tables_exported += 1;
                }
                Err(e) => {
                    warn!(table, error = %e, "Skipping table in backup");
                    outcome.skipped_tables.push(table.to_string());
                }
            }
        }
        sink.finish().await
    }

    /// Column metadata for one table. Empty when the table does not exist.
    pub async fn table_info(&self, table: &str) -> DbResult<QueryRows> {
        if table.trim().is_empty() {
            return Err(DbError::invalid_input("Table name cannot be empty"));
        }
        let engine = self.pool.get_engine(BackendSelector::Auto).await?;
        let result = self
            .run_on(&engine, table_info_query(engine.dialect()), &[table.into()])
            .await?;
        Ok(result.into_rows().unwrap_or_default())
    }

    /// Row counts for every catalog table, counted concurrently.
    pub async fn database_stats(&self) -> DbResult<DatabaseStats> {
        let engine = self.pool.get_engine(BackendSelector::Auto).await?;
        let dialect = engine.dialect();

        let counts = join_all(self.schema.table_names().map(|table| {
            let engine = &engine;
            async move {
                let sql = count_rows_query(table, dialect);
                (table, self.count_on(engine, &sql, &[]).await)
            }
        }))
        .await;

        let mut table_counts = BTreeMap::new();
        let mut missing_tables = Vec::new();
        for (table, count) in counts {
            match count {
                Ok(n) => {
                    table_counts.insert(table.to_string(), n);
                }
                Err(e) => {
                    warn!(table, error = %e, "Could not count rows");
                    table_counts.insert(table.to_string(), 0);
                    missing_tables.push(table.to_string());
                }
            }
        }

        Ok(DatabaseStats {
            backend: engine.backend(),
            dialect,
            table_counts,
            missing_tables,
        })
    }

    /// Run dialect maintenance statements, continuing past failures.
    pub async fn optimize(&self) -> DbResult<OptimizeReport> {
        let engine = self.pool.get_engine(BackendSelector::Auto).await?;
        let statements = maintenance_statements(self.schema.table_names(), engine.dialect());
        let mut report = OptimizeReport::default();

        for sql in &statements {
            report.statements_run += 1;
            if let Err(e) = self.run_on(&engine, sql, &[]).await {
                warn!(statement = %sql, error = %e, "Maintenance statement failed");
                report.statements_failed += 1;
                report.errors.push(format!("{}: {}", sql, e));
            }
        }
        info!(
            backend = %engine.backend(),
            run = report.statements_run,
            failed = report.statements_failed,
            "Optimization finished"
        );
        Ok(report)
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// `SELECT 1` through the normal execution path.
    pub async fn test_connection(&self) -> bool {
        match self.execute("SELECT 1", &[]).await {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "Connection test failed");
                false
            }
        }
    }

    pub fn stats(&self) -> PerformanceStats {
        self.metrics.snapshot()
    }

    /// Status snapshot. Never constructs an engine.
    pub async fn health(&self) -> HealthReport {
        let backend_in_use = self.pool.active_backend();
        let status = match backend_in_use {
            Some(BackendId::Primary) => HealthStatus::Healthy,
            // Degraded only when a primary exists to fall back from
            Some(BackendId::Fallback) if self.pool.is_configured(BackendId::Primary) => {
                HealthStatus::Degraded
            }
            Some(BackendId::Fallback) => HealthStatus::Healthy,
            None => HealthStatus::Unknown,
        };
        HealthReport {
            status,
            backend_in_use,
            pools: self.pool.introspect().await,
            performance: self.metrics.aggregate(),
        }
    }

    /// Close and forget every engine. Performance data is kept.
    pub async fn reset(&self) {
        self.pool.reset().await;
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn validate_sql(sql: &str) -> DbResult<()> {
    if sql.trim().is_empty() {
        return Err(DbError::invalid_input("SQL statement cannot be empty"));
    }
    Ok(())
}

fn json_to_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

async fn hash_password(password: String, rounds: u32) -> DbResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, rounds))
        .await
        .map_err(|e| DbError::internal(format!("Password hashing task failed: {}", e)))?
        .map_err(|e| DbError::internal(format!("Password hashing failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnSpec, LogicalType, TableSpec};
    use serde_json::json;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> DatabaseManager {
        let mut settings = Settings::embedded_only(dir.path().join("app.db").to_string_lossy());
        settings.seed.bcrypt_rounds = 4;
        DatabaseManager::new(settings)
    }

    #[tokio::test]
    async fn test_execute_rows_and_affected() {
        let dir = TempDir::new().unwrap();
        let db = manager(&dir);
        let created = db
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .unwrap();
        assert_eq!(created.rows_affected(), Some(0));

        let inserted = db
            .execute("INSERT INTO t (name) VALUES (?), (?)", &["a".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(inserted.rows_affected(), Some(2));

        let rows = db
            .execute("SELECT id, name FROM t ORDER BY id", &[])
            .await
            .unwrap()
            .into_rows()
            .unwrap();
        assert_eq!(rows.columns, vec!["id", "name"]);
        assert_eq!(rows.rows[1]["name"], json!("b"));
    }

    #[tokio::test]
    async fn test_execute_scalar_swallows_errors() {
        let dir = TempDir::new().unwrap();
        let db = manager(&dir);
        assert_eq!(db.execute_scalar("SELECT 41 + 1", &[]).await, Some(json!(42)));
        assert_eq!(db.execute_scalar("SELECT NULL", &[]).await, None);
        assert_eq!(db.execute_scalar("SELECT * FROM missing", &[]).await, None);
        assert_eq!(db.stats().aggregate.failed_queries, 1);
    }

    #[tokio::test]
    async fn test_statement_error_not_retried() {
        let dir = TempDir::new().unwrap();
        let db = manager(&dir);
        let err = db.execute("SELEC 1", &[]).await.unwrap_err();
        assert!(matches!(err, DbError::Statement { .. }));
        assert_eq!(db.stats().aggregate.total_queries, 1);
    }

    #[tokio::test]
    async fn test_empty_sql_rejected() {
        let dir = TempDir::new().unwrap();
        let db = manager(&dir);
        let err = db.execute("   ", &[]).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
        assert!(db.execute_transaction(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_execute_insert_returns_identity() {
        let dir = TempDir::new().unwrap();
        let db = manager(&dir);
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, v TEXT)", &[])
            .await
            .unwrap();
        let first = db.execute_insert("INSERT INTO t (v) VALUES (?)", &["x".into()]).await;
        let second = db.execute_insert("INSERT INTO t (v) VALUES (?)", &["y".into()]).await;
        assert_eq!(first.unwrap(), Some(1));
        assert_eq!(second.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_failure() {
        let dir = TempDir::new().unwrap();
        let db = manager(&dir);
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT NOT NULL)", &[])
            .await
            .unwrap();

        let ok = db
            .execute_transaction(&[
                TransactionOp::new("INSERT INTO t (v) VALUES (?)", vec!["a".into()]),
                TransactionOp::new("INSERT INTO t (v) VALUES (?)", vec!["b".into()]),
            ])
            .await
            .unwrap();
        assert_eq!(ok, 2);

        let failed = db
            .execute_transaction(&[
                TransactionOp::new("INSERT INTO t (v) VALUES (?)", vec!["c".into()]),
                TransactionOp::new("INSERT INTO t (v) VALUES (?)", vec![QueryParam::Null]),
            ])
            .await;
        assert!(failed.is_err());
        assert_eq!(db.execute_scalar("SELECT COUNT(*) FROM t", &[]).await, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_unmapped_type_fails_before_any_ddl() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::embedded_only(dir.path().join("app.db").to_string_lossy());
        settings.seed.bcrypt_rounds = 4;
        let schema = SchemaDefinition {
            tables: vec![
                TableSpec::new("Good").column(ColumnSpec::new("ID", LogicalType::IdentityInt)),
                TableSpec::new("Bad").column(ColumnSpec::new("Data", "xml".parse().unwrap())),
            ],
            marker_table: "Good".to_string(),
        };
        let db = DatabaseManager::with_schema(settings, schema);
        let err = db.ensure_schema().await.unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));
        assert!(db.table_info("Good").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_table_info_lists_columns() {
        let dir = TempDir::new().unwrap();
        let db = manager(&dir);
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL)", &[])
            .await
            .unwrap();
        let info = db.table_info("t").await.unwrap();
        assert_eq!(info.len(), 2);
        assert_eq!(info.rows[1]["name"], json!("name"));
        assert!(db.table_info("").await.is_err());
    }

    #[tokio::test]
    async fn test_optimize_embedded() {
        let dir = TempDir::new().unwrap();
        let db = manager(&dir);
        let report = db.optimize().await.unwrap();
        assert_eq!(report.statements_run, 2);
        assert_eq!(report.statements_failed, 0);
    }

    #[tokio::test]
    async fn test_health_before_and_after_first_use() {
        let dir = TempDir::new().unwrap();
        let db = manager(&dir);
        let before = db.health().await;
        assert_eq!(before.status, HealthStatus::Unknown);
        assert!(!before.pools[0].constructed);

        assert!(db.test_connection().await);
        let after = db.health().await;
        assert_eq!(after.backend_in_use, Some(BackendId::Fallback));
        // No primary configured, so the fallback is the healthy steady state
        assert_eq!(after.status, HealthStatus::Healthy);
        assert!(after.pools[0].constructed);
    }

    #[tokio::test]
    async fn test_execute_many_commits_all_or_nothing() {
        let dir = TempDir::new().unwrap();
        let db = manager(&dir);
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT NOT NULL UNIQUE)", &[])
            .await
            .unwrap();
        let before = db.stats().aggregate.total_queries;

        let inserted = db
            .execute_many(
                "INSERT INTO t (v) VALUES (?)",
                &[vec!["a".into()], vec!["b".into()], vec!["c".into()]],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 3);
        assert_eq!(db.stats().aggregate.total_queries, before + 1);

        let failed = db
            .execute_many(
                "INSERT INTO t (v) VALUES (?)",
                &[vec!["d".into()], vec!["a".into()]],
            )
            .await;
        assert!(matches!(failed, Err(DbError::Statement { .. })));
        assert_eq!(db.execute_scalar("SELECT COUNT(*) FROM t", &[]).await, Some(json!(3)));
        assert_eq!(
            db.execute_many("INSERT INTO t (v) VALUES (?)", &[]).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_returning_statement_yields_rows() {
        let dir = TempDir::new().unwrap();
        let db = manager(&dir);
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, v TEXT)", &[])
            .await
            .unwrap();

        let result = db
            .execute("INSERT INTO t (v) VALUES (?) RETURNING id, v", &["a".into()])
            .await
            .unwrap();
        let rows = result.into_rows().unwrap();
        assert_eq!(rows.columns, vec!["id", "v"]);
        assert_eq!(rows.rows[0]["v"], json!("a"));

        assert_eq!(
            db.execute_scalar("INSERT INTO t (v) VALUES ('b') RETURNING id", &[])
                .await,
            Some(json!(2))
        );
        assert_eq!(db.execute_scalar("SELECT COUNT(*) FROM t", &[]).await, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_duplicate_column_names_keep_every_value() {
        let dir = TempDir::new().unwrap();
        let db = manager(&dir);
        let rows = db
            .execute("SELECT 1 AS id, 2 AS id, 3 AS id_1", &[])
            .await
            .unwrap()
            .into_rows()
            .unwrap();
        assert_eq!(rows.columns, vec!["id", "id_1", "id_1_1"]);
        assert_eq!(rows.first_value(), Some(&json!(1)));
        let values: Vec<_> = rows.ordered_values(&rows.rows[0]).cloned().collect();
        assert_eq!(values, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_json_to_i64() {
        assert_eq!(json_to_i64(&json!(3)), Some(3));
        assert_eq!(json_to_i64(&json!(3.0)), Some(3));
        assert_eq!(json_to_i64(&json!("7")), Some(7));
        assert_eq!(json_to_i64(&JsonValue::Null), None);
    }
}
