//! # Database Error Types
//!
//! Error types for storage operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StockError (this module) ← Rejection vs storage failure               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError (pharmacheck-sync) ← What the engine's callers see          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use pharmacheck_core::ApplyError;

/// Storage operation errors.
///
/// These errors wrap sqlx errors and provide additional context.
/// Every variant here means the storage layer misbehaved or was
/// misused; business rejections live in [`StockError::Rejected`].
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting a duplicate (name, batch_number) lot
    /// - Inserting a sale whose idempotency_key already exists -
    ///   the reconciler resolves this case to AlreadySynced
    #[error("duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed or the store is unreachable.
    ///
    /// Fatal to the current call; safe to retry the whole call later
    /// since no partial state was committed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True when the violated constraint is the sale idempotency key.
    /// The reconciler uses this to collapse a lost duplicate race into
    /// an AlreadySynced outcome.
    pub fn is_idempotency_conflict(&self) -> bool {
        matches!(
            self,
            DbError::UniqueViolation { field, .. } if field.contains("idempotency_key")
        )
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite error messages for constraints:
                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint: "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Stock Error
// =============================================================================

/// Outcome of a stock mutation: either the ledger refused it (a
/// business rejection the caller must surface) or storage failed.
///
/// Keeping the two apart matters because their handling differs:
/// rejections need client correction, storage failures are retriable.
#[derive(Debug, Error)]
pub enum StockError {
    /// The ledger refused the adjustment (missing batch, short stock).
    #[error(transparent)]
    Rejected(#[from] ApplyError),

    /// Storage failed before the adjustment could be decided.
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for StockError {
    fn from(err: sqlx::Error) -> Self {
        StockError::Db(DbError::from(err))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_conflict_detection() {
        let err = DbError::UniqueViolation {
            field: "sales.idempotency_key".to_string(),
            value: "unknown".to_string(),
        };
        assert!(err.is_idempotency_conflict());

        let err = DbError::UniqueViolation {
            field: "batches.name, batches.batch_number".to_string(),
            value: "unknown".to_string(),
        };
        assert!(!err.is_idempotency_conflict());
    }

    #[test]
    fn test_stock_error_display() {
        let err = StockError::Rejected(ApplyError::BatchNotFound {
            batch_id: "b-1".into(),
        });
        assert_eq!(err.to_string(), "batch not found: b-1");
    }
}
