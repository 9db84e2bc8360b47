//! Error types for the accord-db crate.
//!
//! Wraps `SQLx` errors and classifies them into the storage contract's
//! [`StoreError`] kinds.

use accord_core::StoreError;
use thiserror::Error;

/// SQLSTATE codes treated as transient.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const QUERY_CANCELED: &str = "57014";

/// Database operation errors.
///
/// # Example
///
/// ```rust
/// use accord_db::DbError;
///
/// fn handle_error(err: DbError) {
///     match err {
///         DbError::ConnectionFailed(e) => eprintln!("Cannot connect: {}", e),
///         DbError::MigrationFailed(e) => eprintln!("Migration error: {}", e),
///         DbError::QueryFailed(e) => eprintln!("Query error: {}", e),
///         DbError::InvalidRow(msg) => eprintln!("Bad row: {}", msg),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish or acquire a database connection.
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A database migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),

    /// A database query failed to execute.
    #[error("Query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    /// A stored row holds a value the domain types cannot represent.
    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

impl DbError {
    /// Check if this error indicates a connection problem.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DbError::ConnectionFailed(_))
    }

    /// Check if the failed operation can be retried as a whole.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::ConnectionFailed(_) => true,
            DbError::QueryFailed(e) => is_transient_sqlx(e),
            DbError::MigrationFailed(_) | DbError::InvalidRow(_) => false,
        }
    }

    /// Check if this error is a uniqueness violation.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::QueryFailed(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }

    /// Name of the violated constraint, if the database reported one.
    #[must_use]
    pub fn constraint(&self) -> Option<&str> {
        match self {
            DbError::QueryFailed(sqlx::Error::Database(db)) => db.constraint(),
            _ => None,
        }
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | QUERY_CANCELED)
        ),
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => true,
        _ => false,
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::QueryFailed(err)
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        if err.is_transient() {
            return StoreError::unavailable(err.to_string());
        }
        if err.is_unique_violation() {
            return StoreError::Conflict {
                id: err.constraint().unwrap_or("unique").to_string(),
            };
        }
        StoreError::backend(err.to_string())
    }
}
