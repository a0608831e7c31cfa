//! Statement execution against a single engine.
//!
//! This module runs one statement (or one transaction) on an `EngineHandle`
//! with the handle's query timeout. It does not retry or fail over; that is
//! the manager's job.
//!
//! # Architecture
//!
//! Dialect-specific implementations live in submodules:
//! - `mysql`: server dialect
//! - `sqlite`: embedded dialect
//!
//! Each submodule provides identical functionality adapted to its driver.

use crate::db::pool::{DbPool, EngineHandle};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{ExecuteResult, QueryParam, QueryRows, TransactionOp, WriteOutcome, returns_rows};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Run a statement, returning rows or the affected count by statement kind.
pub async fn run(
    engine: &EngineHandle,
    sql: &str,
    params: &[QueryParam],
) -> DbResult<ExecuteResult> {
    if returns_rows(sql) {
        fetch(engine, sql, params).await.map(ExecuteResult::Rows)
    } else {
        let outcome = execute(engine, sql, params).await?;
        Ok(ExecuteResult::Affected {
            rows_affected: outcome.rows_affected,
        })
    }
}

/// Run a row-returning statement.
pub async fn fetch(engine: &EngineHandle, sql: &str, params: &[QueryParam]) -> DbResult<QueryRows> {
    let query_timeout = engine.query_timeout();
    debug!(
        backend = %engine.backend(),
        params = params.len(),
        timeout_secs = query_timeout.as_secs(),
        "Executing query"
    );
    match engine.pool() {
        DbPool::MySql(p) => {
            let rows = mysql::fetch_rows(p, sql, params, query_timeout).await?;
            Ok(process_rows(rows))
        }
        DbPool::SQLite(p) => {
            let rows = sqlite::fetch_rows(p, sql, params, query_timeout).await?;
            Ok(process_rows(rows))
        }
    }
}

/// Run a statement without a result set. Auto-committed.
pub async fn execute(
    engine: &EngineHandle,
    sql: &str,
    params: &[QueryParam],
) -> DbResult<WriteOutcome> {
    let query_timeout = engine.query_timeout();
    debug!(
        backend = %engine.backend(),
        params = params.len(),
        timeout_secs = query_timeout.as_secs(),
        "Executing write operation"
    );
    match engine.pool() {
        DbPool::MySql(p) => mysql::execute_write(p, sql, params, query_timeout).await,
        DbPool::SQLite(p) => sqlite::execute_write(p, sql, params, query_timeout).await,
    }
}

/// Run every op in one transaction. All commit or none do.
///
/// Returns the total affected row count.
pub async fn transaction(engine: &EngineHandle, ops: &[TransactionOp]) -> DbResult<u64> {
    let query_timeout = engine.query_timeout();
    debug!(
        backend = %engine.backend(),
        statements = ops.len(),
        "Executing transaction"
    );
    match engine.pool() {
        DbPool::MySql(p) => mysql::run_transaction(p, ops, query_timeout).await,
        DbPool::SQLite(p) => sqlite::run_transaction(p, ops, query_timeout).await,
    }
}

/// Run one statement once per parameter row, in a single transaction.
///
/// Returns the total affected row count.
pub async fn batch(engine: &EngineHandle, sql: &str, rows: &[Vec<QueryParam>]) -> DbResult<u64> {
    let query_timeout = engine.query_timeout();
    debug!(
        backend = %engine.backend(),
        rows = rows.len(),
        "Executing batch"
    );
    match engine.pool() {
        DbPool::MySql(p) => mysql::run_batch(p, sql, rows, query_timeout).await,
        DbPool::SQLite(p) => sqlite::run_batch(p, sql, rows, query_timeout).await,
    }
}

/// Convert driver rows into JSON rows, keeping column order.
fn process_rows<R: RowToJson>(rows: Vec<R>) -> QueryRows {
    let Some(first) = rows.first() else {
        return QueryRows::default();
    };
    let columns = first.column_names();
    let rows = rows
        .iter()
        .map(|row| columns.iter().cloned().zip(row.column_values()).collect())
        .collect();
    QueryRows { columns, rows }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

fn timeout_error(operation: &str, timeout: Duration) -> DbError {
    DbError::timeout(operation, timeout.as_millis() as u64)
}

// =============================================================================
// Dialect-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its driver.
// The code structure is intentionally parallel to make differences obvious.

mod mysql {
    use super::*;
    use crate::db::params::mysql_query;
    use sqlx::MySqlPool;
    use sqlx::mysql::MySqlRow;

    pub async fn fetch_rows(
        pool: &MySqlPool,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<Vec<MySqlRow>> {
        // When params is empty, use raw SQL to avoid prepared statement issues
        let result = if params.is_empty() {
            use sqlx::Executor;
            timeout(query_timeout, pool.fetch_all(sql)).await
        } else {
            timeout(query_timeout, mysql_query(sql, params).fetch_all(pool)).await
        };

        match result {
            Ok(rows) => rows.map_err(DbError::from),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute_write(
        pool: &MySqlPool,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<WriteOutcome> {
        // Some DDL doesn't support prepared statements, so parameterless SQL goes raw
        let result = if params.is_empty() {
            use sqlx::Executor;
            timeout(query_timeout, pool.execute(sql)).await
        } else {
            timeout(query_timeout, mysql_query(sql, params).execute(pool)).await
        };

        match result {
            Ok(Ok(r)) => Ok(WriteOutcome {
                rows_affected: r.rows_affected(),
                last_insert_id: i64::try_from(r.last_insert_id()).ok().filter(|id| *id > 0),
            }),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("write operation", query_timeout)),
        }
    }

    pub async fn run_transaction(
        pool: &MySqlPool,
        ops: &[TransactionOp],
        query_timeout: Duration,
    ) -> DbResult<u64> {
        let work = async {
            let mut tx = pool.begin().await?;
            let mut affected = 0;
            for op in ops {
                let result = mysql_query(&op.sql, &op.params).execute(&mut *tx).await?;
                affected += result.rows_affected();
            }
            tx.commit().await?;
            Ok::<_, sqlx::Error>(affected)
        };
        // Dropping an uncommitted transaction rolls it back
        match timeout(query_timeout, work).await {
            Ok(result) => result.map_err(DbError::from),
            Err(_) => Err(timeout_error("transaction", query_timeout)),
        }
    }

    pub async fn run_batch(
        pool: &MySqlPool,
        sql: &str,
        rows: &[Vec<QueryParam>],
        query_timeout: Duration,
    ) -> DbResult<u64> {
        let work = async {
            let mut tx = pool.begin().await?;
            let mut affected = 0;
            for params in rows {
                affected += mysql_query(sql, params).execute(&mut *tx).await?.rows_affected();
            }
            tx.commit().await?;
            Ok::<_, sqlx::Error>(affected)
        };
        match timeout(query_timeout, work).await {
            Ok(result) => result.map_err(DbError::from),
            Err(_) => Err(timeout_error("batch", query_timeout)),
        }
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::sqlite_query;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqliteRow;

    pub async fn fetch_rows(
        pool: &SqlitePool,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<Vec<SqliteRow>> {
        let result = if params.is_empty() {
            use sqlx::Executor;
            timeout(query_timeout, pool.fetch_all(sql)).await
        } else {
            timeout(query_timeout, sqlite_query(sql, params).fetch_all(pool)).await
        };

        match result {
            Ok(rows) => rows.map_err(DbError::from),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute_write(
        pool: &SqlitePool,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<WriteOutcome> {
        let result = if params.is_empty() {
            use sqlx::Executor;
            timeout(query_timeout, pool.execute(sql)).await
        } else {
            timeout(query_timeout, sqlite_query(sql, params).execute(pool)).await
        };

        match result {
            Ok(Ok(r)) => Ok(WriteOutcome {
                rows_affected: r.rows_affected(),
                last_insert_id: Some(r.last_insert_rowid()).filter(|id| *id > 0),
            }),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("write operation", query_timeout)),
        }
    }

    pub async fn run_transaction(
        pool: &SqlitePool,
        ops: &[TransactionOp],
        query_timeout: Duration,
    ) -> DbResult<u64> {
        let work = async {
            let mut tx = pool.begin().await?;
            let mut affected = 0;
            for op in ops {
                let result = sqlite_query(&op.sql, &op.params)
                    .execute(&mut *tx)
                    .await?;
                affected += result.rows_affected();
            }
            tx.commit().await?;
            Ok::<_, sqlx::Error>(affected)
        };
        // Dropping an uncommitted transaction rolls it back
        match timeout(query_timeout, work).await {
            Ok(result) => result.map_err(DbError::from),
            Err(_) => Err(timeout_error("transaction", query_timeout)),
        }
    }

    pub async fn run_batch(
        pool: &SqlitePool,
        sql: &str,
        rows: &[Vec<QueryParam>],
        query_timeout: Duration,
    ) -> DbResult<u64> {
        let work = async {
            let mut tx = pool.begin().await?;
            let mut affected = 0;
            for params in rows {
                affected += sqlite_query(sql, params).execute(&mut *tx).await?.rows_affected();
            }
            tx.commit().await?;
            Ok::<_, sqlx::Error>(affected)
        };
        match timeout(query_timeout, work).await {
            Ok(result) => result.map_err(DbError::from),
            Err(_) => Err(timeout_error("batch", query_timeout)),
        }
    }
}
