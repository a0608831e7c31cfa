//! Error types for the database layer.
//!
//! All failures are expressed as one `thiserror` enum. Each variant carries
//! enough context to decide whether it can be retried and, where possible, a
//! suggestion that callers can surface to an operator.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Statement failed: {message}")]
    Statement {
        message: String,
        /// e.g., "42S02" for an unknown table on MySQL
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Backup failed: {message}")]
    Backup { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// How the retry loop treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Lost or refused connection. Retried with linear backoff.
    Disconnect,
    /// Attempt ran out of time. Retried with a flat delay.
    Timeout,
    /// Never retried.
    Permanent,
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    /// Create a statement error with optional SQL state.
    pub fn statement(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Statement {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create a backup error.
    pub fn backup(message: impl Into<String>) -> Self {
        Self::Backup {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Statement { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Classify this error for the retry loop.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Connection { .. } => RetryClass::Disconnect,
            Self::Timeout { .. } => RetryClass::Timeout,
            _ => RetryClass::Permanent,
        }
    }

    /// Check if this error is a transient connectivity fault.
    pub fn is_transient(&self) -> bool {
        self.retry_class() != RetryClass::Permanent
    }
}

/// SQLite result codes for a busy or locked database file.
const SQLITE_BUSY_CODES: &[&str] = &["5", "6", "261", "262", "517"];

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::configuration(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                if code
                    .as_deref()
                    .is_some_and(|c| SQLITE_BUSY_CODES.contains(&c))
                {
                    return DbError::connection(
                        db_err.message(),
                        "The database file is locked by another writer; retry shortly",
                    );
                }
                DbError::statement(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::statement(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 0),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reset the connection pool")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => DbError::schema(
                format!("Type not found: {}", type_name),
                type_name.to_string(),
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::schema(format!("Column not found: {}", col), col.to_string())
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::connection(
                "Database worker crashed",
                "Reset the connection pool",
            ),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::statement("Syntax error", Some("42000".to_string()), "Check SQL");
        assert_eq!(err.suggestion(), Some("Check SQL"));
        assert_eq!(DbError::internal("x").suggestion(), None);
    }

    #[test]
    fn test_retry_classes() {
        assert_eq!(
            DbError::connection("gone away", "").retry_class(),
            RetryClass::Disconnect
        );
        assert_eq!(DbError::timeout("query", 30).retry_class(), RetryClass::Timeout);
        assert_eq!(
            DbError::statement("bad", None, "").retry_class(),
            RetryClass::Permanent
        );
        assert_eq!(
            DbError::configuration("missing host").retry_class(),
            RetryClass::Permanent
        );
    }

    #[test]
    fn test_is_transient() {
        assert!(DbError::timeout("query", 30).is_transient());
        assert!(DbError::connection("err", "sugg").is_transient());
        assert!(!DbError::schema("unknown type", "Users.Foo").is_transient());
        assert!(!DbError::backup("disk full").is_transient());
    }

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(DbError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(DbError::from(sqlx::Error::PoolClosed).is_transient());
    }

    #[test]
    fn test_io_error_is_transient_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = DbError::from(sqlx::Error::Io(io));
        assert!(matches!(err, DbError::Connection { .. }));
    }

    #[test]
    fn test_row_not_found_is_permanent() {
        let err = DbError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, DbError::Statement { .. }));
        assert!(!err.is_transient());
    }
}
