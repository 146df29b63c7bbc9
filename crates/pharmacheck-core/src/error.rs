//! # Error Types
//!
//! Domain-specific error types for pharmacheck-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  pharmacheck-core errors (this file)                                   │
//! │  ├── ApplyError       - A sale was refused by the stock ledger         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  pharmacheck-db errors (separate crate)                                │
//! │  ├── DbError          - Storage operation failures                     │
//! │  └── StockError       - ApplyError or DbError from the stock store     │
//! │                                                                         │
//! │  pharmacheck-sync errors (separate crate)                              │
//! │  └── SyncError        - Rejected (non-retriable) vs Storage (retriable)│
//! │                                                                         │
//! │  Flow: ValidationError/ApplyError → StockError → SyncError → caller    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (batch id, amounts)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a caller-facing message

use thiserror::Error;

// =============================================================================
// Apply Error
// =============================================================================

/// Reasons the stock ledger refuses a sale.
///
/// Both variants are non-retriable without client correction: retrying
/// the identical sale cannot conjure stock or resurrect a batch. The
/// client must re-derive a valid sale (or an operator must restock).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// The referenced batch does not exist.
    ///
    /// ## When This Occurs
    /// - Batch id is wrong (caller error)
    /// - Batch was deleted between the client capturing the sale
    ///   offline and the sale being reconciled
    #[error("batch not found: {batch_id}")]
    BatchNotFound { batch_id: String },

    /// On-hand stock does not cover the requested quantity.
    ///
    /// Carries the short-fall so the caller can decide to adjust the
    /// quantity or cancel.
    ///
    /// ## User Workflow
    /// ```text
    /// Sale requests 3 units
    ///      │
    ///      ▼
    /// Guarded decrement fails: available=2
    ///      │
    ///      ▼
    /// InsufficientStock { batch_id, requested: 3, available: 2 }
    ///      │
    ///      ▼
    /// UI shows: "Only 2 units left"
    /// ```
    #[error("insufficient stock for batch {batch_id}: requested {requested}, available {available}")]
    InsufficientStock {
        batch_id: String,
        requested: i64,
        available: i64,
    },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when a submission or batch doesn't meet shape
/// requirements, before any storage is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// A sale has no line items.
    #[error("sale has no line items")]
    EmptySale,

    /// A sale has more line items than allowed.
    #[error("sale cannot have more than {max} line items")]
    TooManyLines { max: usize },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for validation results.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_error_messages() {
        let err = ApplyError::InsufficientStock {
            batch_id: "b-42".to_string(),
            requested: 3,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "insufficient stock for batch b-42: requested 3, available 2"
        );

        let err = ApplyError::BatchNotFound {
            batch_id: "b-gone".to_string(),
        };
        assert_eq!(err.to_string(), "batch not found: b-gone");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "idempotency_key".to_string(),
        };
        assert_eq!(err.to_string(), "idempotency_key is required");

        assert_eq!(
            ValidationError::EmptySale.to_string(),
            "sale has no line items"
        );
    }
}
