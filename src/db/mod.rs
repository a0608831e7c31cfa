//! Database layer.
//!
//! This module provides database access functionality:
//! - Connection pool with lazy engines, health checks and failover
//! - Statement execution with retry and performance tracking
//! - Dialect-neutral schema catalog and DDL rendering
//! - Logical backup
//! - Type mappings
//! - Dialect dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod backup;
pub mod catalog;
pub mod executor;
pub mod manager;
pub mod metrics;
pub mod params;
pub mod pool;
pub mod retry;
pub mod schema;
pub mod types;

pub use catalog::default_schema;
pub use manager::DatabaseManager;
pub use metrics::PerformanceTracker;
pub use pool::{ConnectionPool, DbPool, EngineHandle};
pub use retry::{RetryPolicy, run_with_retry};
