//! Project DB Library
//!
//! Database connectivity and resilience for the project management service:
//! a primary server database with an embedded SQLite fallback, automatic
//! failover, retry with backoff, schema provisioning, and performance
//! tracking.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::Settings;
pub use db::DatabaseManager;
pub use error::{DbError, DbResult};
