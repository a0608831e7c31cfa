//! Data models for the database layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod schema;
pub mod stats;

// Re-export commonly used types
pub use connection::{BackendId, BackendSelector, ConnectionConfig, Dialect, HealthRecord};
pub use query::{
    ExecuteResult, QueryParam, QueryRows, Row, TransactionOp, WriteOutcome, returns_rows,
};
pub use schema::{
    ColumnDefault, ColumnSpec, Constraint, IndexSpec, LogicalType, SchemaDefinition, SchemaReport,
    TableSpec,
};
pub use stats::{
    BackupOutcome, DatabaseStats, HealthReport, HealthStatus, OptimizeReport,
    PerformanceAggregate, PerformanceSample, PerformanceStats, PoolIntrospection,
};
