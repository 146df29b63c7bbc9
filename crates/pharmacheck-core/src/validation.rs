//! # Validation Module
//!
//! Shape validation for submissions and batches.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE - shape and business-rule checks                  │
//! │  ├── Runs before any storage is touched                                 │
//! │  └── A malformed record is rejected, never partially applied            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Stock ledger (guarded updates)                                │
//! │  ├── Batch existence                                                    │
//! │  └── Sufficient quantity                                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── NOT NULL / CHECK constraints                                       │
//! │  └── UNIQUE constraints (idempotency key, name+batch number)            │
//! │                                                                         │
//! │  Defense in depth: each layer catches different errors                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{ValidationError, ValidationResult};
use crate::types::{SaleLineInput, SaleSubmission};
use crate::{MAX_LINE_QUANTITY, MAX_SALE_LINES};

/// Maximum accepted idempotency key length. Keys are UUIDs in practice
/// but any stable client token up to this length is accepted.
const MAX_KEY_LENGTH: usize = 64;

// =============================================================================
// Submission Validation
// =============================================================================

/// Validates an idempotency key.
pub fn validate_idempotency_key(key: &str) -> ValidationResult<()> {
    let key = key.trim();

    if key.is_empty() {
        return Err(ValidationError::Required {
            field: "idempotency_key".to_string(),
        });
    }

    if key.len() > MAX_KEY_LENGTH {
        return Err(ValidationError::TooLong {
            field: "idempotency_key".to_string(),
            max: MAX_KEY_LENGTH,
        });
    }

    Ok(())
}

/// Validates a single requested line item.
pub fn validate_line(line: &SaleLineInput) -> ValidationResult<()> {
    if line.batch_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "batch_id".to_string(),
        });
    }

    if line.quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if line.quantity > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    if line.unit_price_cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "unit_price_cents".to_string(),
        });
    }

    Ok(())
}

/// Validates the shape of a full submission.
///
/// This does NOT touch stock: batch existence and quantity coverage
/// are checked by the applier inside its transaction.
pub fn validate_submission(submission: &SaleSubmission) -> ValidationResult<()> {
    validate_idempotency_key(&submission.idempotency_key)?;

    if submission.lines.is_empty() {
        return Err(ValidationError::EmptySale);
    }

    if submission.lines.len() > MAX_SALE_LINES {
        return Err(ValidationError::TooManyLines {
            max: MAX_SALE_LINES,
        });
    }

    for line in &submission.lines {
        validate_line(line)?;
    }

    if submission.total_cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "total_cents".to_string(),
        });
    }

    Ok(())
}

/// Sums the requested line totals of a submission, in cents.
///
/// The result is compared against the client total for observability
/// only; the client total is recorded as charged.
pub fn derived_total_cents(lines: &[SaleLineInput]) -> i64 {
    lines
        .iter()
        .map(|l| l.unit_price_cents.saturating_mul(l.quantity))
        .sum()
}

// =============================================================================
// Batch Validation
// =============================================================================

/// Validates batch metadata before insert/update.
pub fn validate_batch_fields(
    name: &str,
    batch_number: &str,
    quantity: i64,
    unit_price_cents: i64,
    safety_stock: i64,
) -> ValidationResult<()> {
    if name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    if batch_number.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "batch_number".to_string(),
        });
    }

    if quantity < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "quantity".to_string(),
        });
    }

    if unit_price_cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "unit_price_cents".to_string(),
        });
    }

    if safety_stock < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "safety_stock".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentMethod;
    use chrono::Utc;

    fn line(batch_id: &str, quantity: i64) -> SaleLineInput {
        SaleLineInput {
            batch_id: batch_id.to_string(),
            quantity,
            unit_price_cents: 400,
        }
    }

    fn submission(lines: Vec<SaleLineInput>) -> SaleSubmission {
        SaleSubmission {
            idempotency_key: "k1".to_string(),
            lines,
            total_cents: 400,
            payment_method: PaymentMethod::Cash,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_submission() {
        assert!(validate_submission(&submission(vec![line("b1", 1)])).is_ok());
    }

    #[test]
    fn test_empty_sale_rejected() {
        assert_eq!(
            validate_submission(&submission(vec![])),
            Err(ValidationError::EmptySale)
        );
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let err = validate_submission(&submission(vec![line("b1", 0)])).unwrap_err();
        assert!(matches!(err, ValidationError::MustBePositive { .. }));
    }

    #[test]
    fn test_blank_key_rejected() {
        let mut s = submission(vec![line("b1", 1)]);
        s.idempotency_key = "   ".to_string();
        assert!(matches!(
            validate_submission(&s),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_oversized_quantity_rejected() {
        let err = validate_submission(&submission(vec![line("b1", 1000)])).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));
    }

    #[test]
    fn test_derived_total() {
        let lines = vec![line("b1", 3), line("b2", 2)];
        assert_eq!(derived_total_cents(&lines), 2000);
    }

    #[test]
    fn test_batch_fields() {
        assert!(validate_batch_fields("Paracetamol 500mg", "PCM-11", 50, 400, 10).is_ok());
        assert!(validate_batch_fields("", "PCM-11", 50, 400, 10).is_err());
        assert!(validate_batch_fields("Paracetamol", "PCM-11", -1, 400, 10).is_err());
    }
}
