//! # Sale Applier
//!
//! Applies one sale's line items against authoritative stock as a
//! single atomic unit.
//!
//! ## The Atomicity Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    apply() - one SQLite transaction                     │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │    │                                                                    │
//! │    ├── for each line (visited in sorted batch-id order):               │
//! │    │     guarded decrement:                                            │
//! │    │       UPDATE batches SET quantity = quantity - :qty               │
//! │    │       WHERE id = :batch AND quantity >= :qty                      │
//! │    │     0 rows? → BatchNotFound / InsufficientStock → ROLLBACK        │
//! │    │     capture name + batch number snapshot                          │
//! │    │                                                                    │
//! │    ├── INSERT INTO sales (..., idempotency_key UNIQUE, 'synced')       │
//! │    │     duplicate key? → UniqueViolation → ROLLBACK                   │
//! │    │                                                                    │
//! │    └── INSERT INTO sale_lines (one row per line, client order)         │
//! │    │                                                                    │
//! │  COMMIT ← all decrements and the record become visible together        │
//! │                                                                         │
//! │  Either everything happens or nothing does. A failed sale leaves       │
//! │  the stock store exactly as it was before the call.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lock Ordering
//! Lines are decremented in sorted batch-id order so two concurrent
//! sales over overlapping batch sets always acquire in the same
//! order. Line rows are still inserted in the client's order.

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pharmacheck_core::validation::{derived_total_cents, validate_submission};
use pharmacheck_core::{SaleLine, SaleRecord, SaleSubmission, SyncState};
use pharmacheck_db::repository::batch::adjust_on;
use pharmacheck_db::{Database, DbError};

use crate::error::SyncResult;

/// Applies sales atomically against the stock store.
///
/// Cheap to clone; holds only the database handle.
#[derive(Debug, Clone)]
pub struct SaleApplier {
    db: Database,
}

impl SaleApplier {
    /// Creates a new applier over the given database handle.
    pub fn new(db: Database) -> Self {
        SaleApplier { db }
    }

    /// Applies a submission: validates it, decrements every referenced
    /// batch and persists the sale record, all in one transaction.
    ///
    /// ## Returns
    /// * `Ok(SaleRecord)` - committed, `sync_state = Synced`
    /// * `Err(SyncError::Rejected(_))` - missing batch or short stock;
    ///   stock is untouched
    /// * `Err(SyncError::Validation(_))` - malformed submission;
    ///   nothing was attempted
    /// * `Err(SyncError::Storage(_))` - storage failure, including a
    ///   duplicate idempotency key (the reconciler resolves that case)
    pub async fn apply(&self, submission: &SaleSubmission) -> SyncResult<SaleRecord> {
        validate_submission(submission)?;

        // The client total is recorded as charged; a drift against the
        // line items is surfaced for the audit trail, not rejected.
        let derived = derived_total_cents(&submission.lines);
        if derived != submission.total_cents {
            warn!(
                idempotency_key = %submission.idempotency_key,
                client_total = submission.total_cents,
                derived_total = derived,
                "Client total does not match line items"
            );
        }

        let now = Utc::now();
        let sale_id = Uuid::new_v4().to_string();

        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        // Decrement in sorted batch-id order; keep the snapshot each
        // decrement returns for the line rows below.
        let mut ordered: Vec<&pharmacheck_core::SaleLineInput> = submission.lines.iter().collect();
        ordered.sort_by(|a, b| a.batch_id.cmp(&b.batch_id));

        let mut snapshots: Vec<(String, String, String)> = Vec::with_capacity(ordered.len());
        for line in &ordered {
            // Dropping `tx` on the error path rolls everything back.
            let remaining = adjust_on(&mut tx, &line.batch_id, -line.quantity).await?;

            debug!(
                batch_id = %line.batch_id,
                quantity = line.quantity,
                remaining = remaining,
                "Decremented batch"
            );

            let (name, batch_number): (String, String) =
                sqlx::query_as("SELECT name, batch_number FROM batches WHERE id = ?1")
                    .bind(&line.batch_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(DbError::from)?;
            snapshots.push((line.batch_id.clone(), name, batch_number));
        }

        // The UNIQUE constraint on idempotency_key fires here for a
        // concurrent duplicate, rolling back the decrements above.
        sqlx::query(
            "INSERT INTO sales (\
                 id, idempotency_key, total_cents, payment_method, \
                 sync_state, occurred_at, created_at\
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&sale_id)
        .bind(&submission.idempotency_key)
        .bind(submission.total_cents)
        .bind(submission.payment_method)
        .bind(SyncState::Synced)
        .bind(submission.occurred_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        // Line rows in the client's order.
        let mut lines = Vec::with_capacity(submission.lines.len());
        for line in &submission.lines {
            let (_, name, batch_number) = snapshots
                .iter()
                .find(|(id, _, _)| id == &line.batch_id)
                .cloned()
                .unwrap_or_else(|| (line.batch_id.clone(), String::new(), String::new()));

            let record_line = SaleLine {
                id: Uuid::new_v4().to_string(),
                sale_id: sale_id.clone(),
                batch_id: line.batch_id.clone(),
                name_snapshot: name,
                batch_number_snapshot: batch_number,
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
                created_at: now,
            };

            sqlx::query(
                "INSERT INTO sale_lines (\
                     id, sale_id, batch_id, name_snapshot, batch_number_snapshot, \
                     quantity, unit_price_cents, created_at\
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(&record_line.id)
            .bind(&record_line.sale_id)
            .bind(&record_line.batch_id)
            .bind(&record_line.name_snapshot)
            .bind(&record_line.batch_number_snapshot)
            .bind(record_line.quantity)
            .bind(record_line.unit_price_cents)
            .bind(record_line.created_at)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;

            lines.push(record_line);
        }

        tx.commit().await.map_err(DbError::from)?;

        info!(
            sale_id = %sale_id,
            idempotency_key = %submission.idempotency_key,
            lines = lines.len(),
            total_cents = submission.total_cents,
            "Sale committed"
        );

        Ok(SaleRecord {
            id: sale_id,
            idempotency_key: submission.idempotency_key.clone(),
            lines,
            total_cents: submission.total_cents,
            payment_method: submission.payment_method,
            sync_state: SyncState::Synced,
            occurred_at: submission.occurred_at,
            created_at: now,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use chrono::NaiveDate;
    use pharmacheck_core::{ApplyError, Batch, PaymentMethod, SaleLineInput};
    use pharmacheck_db::DbConfig;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn seed_batch(db: &Database, id: &str, name: &str, quantity: i64) {
        let now = Utc::now();
        db.batches()
            .insert(&Batch {
                id: id.to_string(),
                name: name.to_string(),
                batch_number: format!("{}-01", id.to_uppercase()),
                expiry_date: NaiveDate::from_ymd_opt(2027, 6, 30).unwrap(),
                quantity,
                unit_price_cents: 400,
                category: None,
                safety_stock: 10,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    fn submission(key: &str, lines: Vec<(&str, i64)>) -> SaleSubmission {
        let total = lines.iter().map(|(_, q)| q * 400).sum();
        SaleSubmission {
            idempotency_key: key.to_string(),
            lines: lines
                .into_iter()
                .map(|(batch_id, quantity)| SaleLineInput {
                    batch_id: batch_id.to_string(),
                    quantity,
                    unit_price_cents: 400,
                })
                .collect(),
            total_cents: total,
            payment_method: PaymentMethod::Cash,
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_apply_decrements_and_persists() {
        let db = test_db().await;
        seed_batch(&db, "b1", "Paracetamol 500mg", 50).await;

        let applier = SaleApplier::new(db.clone());
        let record = applier.apply(&submission("k1", vec![("b1", 3)])).await.unwrap();

        assert_eq!(record.sync_state, SyncState::Synced);
        assert_eq!(record.lines.len(), 1);
        assert_eq!(record.lines[0].name_snapshot, "Paracetamol 500mg");

        let batch = db.batches().get_by_id("b1").await.unwrap().unwrap();
        assert_eq!(batch.quantity, 47);

        let loaded = db.sales().get_by_idempotency_key("k1").await.unwrap().unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_rolls_back_everything() {
        let db = test_db().await;
        seed_batch(&db, "b1", "Paracetamol 500mg", 50).await;
        seed_batch(&db, "b2", "ORS Sachet", 1).await;

        let applier = SaleApplier::new(db.clone());
        let err = applier
            .apply(&submission("k1", vec![("b1", 3), ("b2", 5)]))
            .await
            .unwrap_err();

        match err {
            SyncError::Rejected(ApplyError::InsufficientStock {
                batch_id,
                requested,
                available,
            }) => {
                assert_eq!(batch_id, "b2");
                assert_eq!(requested, 5);
                assert_eq!(available, 1);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        // Full rollback: b1 untouched despite being valid on its own
        assert_eq!(db.batches().get_by_id("b1").await.unwrap().unwrap().quantity, 50);
        assert_eq!(db.batches().get_by_id("b2").await.unwrap().unwrap().quantity, 1);
        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_batch_rejected() {
        let db = test_db().await;
        seed_batch(&db, "b1", "Paracetamol 500mg", 50).await;

        let applier = SaleApplier::new(db.clone());
        let err = applier
            .apply(&submission("k1", vec![("b1", 1), ("ghost", 1)]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::Rejected(ApplyError::BatchNotFound { .. })
        ));
        assert_eq!(db.batches().get_by_id("b1").await.unwrap().unwrap().quantity, 50);
    }

    #[tokio::test]
    async fn test_shortfall_reporting_scenario() {
        // Batch with quantity 5: first sale of 3 succeeds, second sale
        // of 3 reports requested 3 / available 2 and changes nothing.
        let db = test_db().await;
        seed_batch(&db, "b1", "Amoxicillin 500mg", 5).await;

        let applier = SaleApplier::new(db.clone());

        applier.apply(&submission("k1", vec![("b1", 3)])).await.unwrap();
        assert_eq!(db.batches().get_by_id("b1").await.unwrap().unwrap().quantity, 2);

        let err = applier.apply(&submission("k2", vec![("b1", 3)])).await.unwrap_err();
        match err {
            SyncError::Rejected(ApplyError::InsufficientStock {
                requested,
                available,
                ..
            }) => {
                assert_eq!(requested, 3);
                assert_eq!(available, 2);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(db.batches().get_by_id("b1").await.unwrap().unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_duplicate_key_rolls_back_decrement() {
        let db = test_db().await;
        seed_batch(&db, "b1", "Paracetamol 500mg", 10).await;

        let applier = SaleApplier::new(db.clone());
        applier.apply(&submission("k1", vec![("b1", 2)])).await.unwrap();

        let err = applier.apply(&submission("k1", vec![("b1", 2)])).await.unwrap_err();
        match err {
            SyncError::Storage(db_err) => assert!(db_err.is_idempotency_conflict()),
            other => panic!("expected idempotency conflict, got {other:?}"),
        }

        // Decremented exactly once
        assert_eq!(db.batches().get_by_id("b1").await.unwrap().unwrap().quantity, 8);
        assert_eq!(db.sales().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_client_total_recorded_as_is() {
        let db = test_db().await;
        seed_batch(&db, "b1", "Paracetamol 500mg", 10).await;

        let mut sub = submission("k1", vec![("b1", 2)]);
        sub.total_cents = 999; // drifts from 2 * 400

        let applier = SaleApplier::new(db.clone());
        let record = applier.apply(&sub).await.unwrap();

        assert_eq!(record.total_cents, 999);
        assert_eq!(record.derived_total().cents(), 800);
    }

    #[tokio::test]
    async fn test_same_batch_twice_in_one_sale() {
        let db = test_db().await;
        seed_batch(&db, "b1", "Paracetamol 500mg", 5).await;

        let applier = SaleApplier::new(db.clone());
        applier
            .apply(&submission("k1", vec![("b1", 2), ("b1", 2)]))
            .await
            .unwrap();

        assert_eq!(db.batches().get_by_id("b1").await.unwrap().unwrap().quantity, 1);

        // And a sale that overruns across its own lines fails whole
        let err = applier
            .apply(&submission("k2", vec![("b1", 1), ("b1", 1)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Rejected(ApplyError::InsufficientStock { .. })
        ));
        assert_eq!(db.batches().get_by_id("b1").await.unwrap().unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn test_empty_submission_rejected_before_storage() {
        let db = test_db().await;
        let applier = SaleApplier::new(db.clone());

        let err = applier.apply(&submission("k1", vec![])).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }
}
