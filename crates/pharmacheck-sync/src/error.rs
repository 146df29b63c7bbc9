//! # Sync Error Types
//!
//! Error types for the applier, reconciler and outbox processor.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌──────────────────────┐      ┌──────────────────────────────────┐    │
//! │  │  Rejected/Validation │      │  Storage/Serialization           │    │
//! │  │  (non-retriable)     │      │  (call-level failures)           │    │
//! │  │                      │      │                                  │    │
//! │  │  BatchNotFound       │      │  Pool exhausted                  │    │
//! │  │  InsufficientStock   │      │  Connection failed               │    │
//! │  │  Malformed record    │      │  Bad outbox payload              │    │
//! │  │                      │      │                                  │    │
//! │  │  → client correction │      │  → safe to retry the whole call: │    │
//! │  │    required          │      │    nothing partial was committed │    │
//! │  └──────────────────────┘      └──────────────────────────────────┘    │
//! │                                                                         │
//! │  The reconciler converts per-record Rejected/Validation errors into    │
//! │  Rejected outcomes (siblings continue); Storage aborts the call.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use pharmacheck_core::{ApplyError, ValidationError};
use pharmacheck_db::{DbError, StockError};

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Error type covering the sale applier and reconciliation paths.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The stock ledger refused the sale. Non-retriable without
    /// client correction (re-derive the sale, or restock).
    #[error("sale rejected: {0}")]
    Rejected(#[from] ApplyError),

    /// The record is malformed (empty lines, non-positive quantity,
    /// blank key). Non-retriable as-is.
    #[error("invalid sale: {0}")]
    Validation(#[from] ValidationError),

    /// The storage layer failed. Fatal to the current call, safe to
    /// retry the whole call later: the atomicity contract guarantees
    /// nothing partial was committed.
    #[error(transparent)]
    Storage(#[from] DbError),

    /// An outbox payload could not be (de)serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<StockError> for SyncError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::Rejected(e) => SyncError::Rejected(e),
            StockError::Db(e) => SyncError::Storage(e),
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Storage(DbError::from(err))
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the operation can be retried unchanged.
    ///
    /// ## Retryable
    /// - Storage failures (pool exhausted, connection lost)
    ///
    /// ## Non-Retryable
    /// - Rejections: retrying cannot conjure stock
    /// - Validation failures: the record itself is wrong
    /// - Serialization failures: the payload itself is wrong
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Storage(_))
    }
}
