//! # Sync Reconciler
//!
//! Replays a batch of client-originated sale records against
//! authoritative stock, applying each logical sale exactly once.
//!
//! ## Exactly-Once, Explained
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              reconcile(records) - per record, in order                  │
//! │                                                                         │
//! │  1. Fast path: does a synced sale with this idempotency key exist?     │
//! │        yes → AlreadySynced (no stock is touched)                       │
//! │         │                                                               │
//! │  2. no → SaleApplier::apply (one atomic transaction)                   │
//! │         │                                                               │
//! │         ├── Ok            → Applied                                    │
//! │         ├── Rejected      → Rejected(reason); SIBLINGS CONTINUE        │
//! │         ├── UNIQUE(idempotency_key) violation                          │
//! │         │     → a concurrent duplicate won the race; its transaction   │
//! │         │       committed, ours rolled back → AlreadySynced            │
//! │         └── Storage error → abort the whole call                       │
//! │                                                                         │
//! │  The UNIQUE constraint, not the fast path, is the authority: two       │
//! │  concurrent submissions of the same key cannot both commit.            │
//! │                                                                         │
//! │  NOT one cross-record transaction: each record commits (or fails)      │
//! │  on its own, so one rejection never blocks or rolls back siblings,     │
//! │  and an aborted call can be re-invoked safely - committed records      │
//! │  answer AlreadySynced on the next pass.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::{debug, info, warn};

use pharmacheck_core::{ReconcileOutcome, ReconcileStatus, SaleSubmission};
use pharmacheck_db::Database;

use crate::applier::SaleApplier;
use crate::error::{SyncError, SyncResult};

/// Drives the sale applier exactly once per idempotency key.
#[derive(Debug, Clone)]
pub struct SyncReconciler {
    db: Database,
    applier: SaleApplier,
}

impl SyncReconciler {
    /// Creates a new reconciler over the given database handle.
    pub fn new(db: Database) -> Self {
        let applier = SaleApplier::new(db.clone());
        SyncReconciler { db, applier }
    }

    /// Reconciles a batch of records, returning one outcome per input
    /// record, in input order.
    ///
    /// Order only matters for stock contention: records are
    /// independent unless they compete for the same batch.
    ///
    /// ## Errors
    /// Only storage failures abort the call. Outcomes already
    /// committed stay committed; re-invoking with the same input is
    /// safe and resumes where the failure struck.
    pub async fn reconcile(&self, records: &[SaleSubmission]) -> SyncResult<Vec<ReconcileOutcome>> {
        info!(count = records.len(), "Reconciling sale batch");

        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let status = self.reconcile_one(record).await?;
            outcomes.push(ReconcileOutcome {
                idempotency_key: record.idempotency_key.clone(),
                status,
            });
        }

        let applied = outcomes.iter().filter(|o| o.status.is_applied()).count();
        let rejected = outcomes.iter().filter(|o| o.status.is_rejected()).count();
        info!(
            applied = applied,
            rejected = rejected,
            duplicates = outcomes.len() - applied - rejected,
            "Reconciliation complete"
        );

        Ok(outcomes)
    }

    /// Reconciles a single record.
    async fn reconcile_one(&self, record: &SaleSubmission) -> SyncResult<ReconcileStatus> {
        // Fast path. The UNIQUE constraint below still closes the
        // race this check leaves open.
        if let Some(existing) = self
            .db
            .sales()
            .get_by_idempotency_key(&record.idempotency_key)
            .await?
        {
            debug!(
                idempotency_key = %record.idempotency_key,
                sale_id = %existing.id,
                "Skipping already-synced record"
            );
            return Ok(ReconcileStatus::AlreadySynced {
                sale_id: existing.id,
            });
        }

        match self.applier.apply(record).await {
            Ok(sale) => Ok(ReconcileStatus::Applied { sale_id: sale.id }),

            Err(SyncError::Rejected(reason)) => {
                warn!(
                    idempotency_key = %record.idempotency_key,
                    reason = %reason,
                    "Sale rejected during reconciliation"
                );
                Ok(ReconcileStatus::Rejected {
                    reason: reason.to_string(),
                })
            }

            Err(SyncError::Validation(reason)) => {
                warn!(
                    idempotency_key = %record.idempotency_key,
                    reason = %reason,
                    "Malformed record rejected during reconciliation"
                );
                Ok(ReconcileStatus::Rejected {
                    reason: reason.to_string(),
                })
            }

            // Lost the insert race to a concurrent duplicate. Its
            // transaction committed; ours rolled back without touching
            // stock.
            Err(SyncError::Storage(db_err)) if db_err.is_idempotency_conflict() => {
                debug!(
                    idempotency_key = %record.idempotency_key,
                    "Concurrent duplicate detected via unique constraint"
                );
                let sale_id = self
                    .db
                    .sales()
                    .get_by_idempotency_key(&record.idempotency_key)
                    .await?
                    .map(|s| s.id)
                    .unwrap_or_default();
                Ok(ReconcileStatus::AlreadySynced { sale_id })
            }

            Err(other) => Err(other),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use pharmacheck_core::{Batch, PaymentMethod, SaleLineInput};
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

    fn record(key: &str, lines: Vec<(&str, i64)>) -> SaleSubmission {
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
            payment_method: PaymentMethod::MobileMoney,
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_key_applies_once() {
        // A client retry submits k1 (2 units of b1) in two sync calls:
        // the decrement attributable to k1 is exactly 2 units, not 4.
        let db = test_db().await;
        seed_batch(&db, "b1", "Paracetamol 500mg", 10).await;

        let reconciler = SyncReconciler::new(db.clone());

        let first = reconciler.reconcile(&[record("k1", vec![("b1", 2)])]).await.unwrap();
        assert!(first[0].status.is_applied());

        let second = reconciler.reconcile(&[record("k1", vec![("b1", 2)])]).await.unwrap();
        match &second[0].status {
            ReconcileStatus::AlreadySynced { sale_id } => assert!(!sale_id.is_empty()),
            other => panic!("expected AlreadySynced, got {other:?}"),
        }

        assert_eq!(db.batches().get_by_id("b1").await.unwrap().unwrap().quantity, 8);
        assert_eq!(db.sales().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_within_one_batch() {
        let db = test_db().await;
        seed_batch(&db, "b1", "Paracetamol 500mg", 10).await;

        let reconciler = SyncReconciler::new(db.clone());
        let outcomes = reconciler
            .reconcile(&[
                record("k1", vec![("b1", 2)]),
                record("k1", vec![("b1", 2)]),
            ])
            .await
            .unwrap();

        assert!(outcomes[0].status.is_applied());
        assert!(matches!(
            outcomes[1].status,
            ReconcileStatus::AlreadySynced { .. }
        ));
        assert_eq!(db.batches().get_by_id("b1").await.unwrap().unwrap().quantity, 8);
    }

    #[tokio::test]
    async fn test_rejection_never_blocks_siblings() {
        // [valid, insufficient, valid] → [Applied, Rejected, Applied];
        // the third record's batch is decremented despite the second's
        // failure.
        let db = test_db().await;
        seed_batch(&db, "b1", "Paracetamol 500mg", 10).await;
        seed_batch(&db, "b2", "ORS Sachet", 1).await;
        seed_batch(&db, "b3", "Vitamin C 500mg", 10).await;

        let reconciler = SyncReconciler::new(db.clone());
        let outcomes = reconciler
            .reconcile(&[
                record("k1", vec![("b1", 2)]),
                record("k2", vec![("b2", 5)]),
                record("k3", vec![("b3", 4)]),
            ])
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].status.is_applied());
        match &outcomes[1].status {
            ReconcileStatus::Rejected { reason } => {
                assert!(reason.contains("insufficient stock"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert!(outcomes[2].status.is_applied());

        assert_eq!(db.batches().get_by_id("b1").await.unwrap().unwrap().quantity, 8);
        assert_eq!(db.batches().get_by_id("b2").await.unwrap().unwrap().quantity, 1);
        assert_eq!(db.batches().get_by_id("b3").await.unwrap().unwrap().quantity, 6);
    }

    #[tokio::test]
    async fn test_outcomes_keep_input_order_and_keys() {
        let db = test_db().await;
        seed_batch(&db, "b1", "Paracetamol 500mg", 10).await;

        let reconciler = SyncReconciler::new(db.clone());
        let outcomes = reconciler
            .reconcile(&[
                record("k-a", vec![("b1", 1)]),
                record("k-b", vec![("ghost", 1)]),
                record("k-c", vec![("b1", 1)]),
            ])
            .await
            .unwrap();

        let keys: Vec<&str> = outcomes.iter().map(|o| o.idempotency_key.as_str()).collect();
        assert_eq!(keys, vec!["k-a", "k-b", "k-c"]);
        assert!(matches!(
            outcomes[1].status,
            ReconcileStatus::Rejected { .. }
        ));
    }

    #[tokio::test]
    async fn test_malformed_record_becomes_rejection() {
        let db = test_db().await;
        seed_batch(&db, "b1", "Paracetamol 500mg", 10).await;

        let reconciler = SyncReconciler::new(db.clone());
        let outcomes = reconciler
            .reconcile(&[record("k1", vec![("b1", 0)]), record("k2", vec![("b1", 1)])])
            .await
            .unwrap();

        assert!(outcomes[0].status.is_rejected());
        assert!(outcomes[1].status.is_applied());
        assert_eq!(db.batches().get_by_id("b1").await.unwrap().unwrap().quantity, 9);
    }

    #[tokio::test]
    async fn test_contended_single_unit_sells_once() {
        // Two sales race for the last unit: exactly one succeeds, the
        // other is told the stock is short. Never a double-sell.
        let db = test_db().await;
        seed_batch(&db, "b1", "Adrenaline 1mg Ampoule", 1).await;

        let reconciler = SyncReconciler::new(db.clone());

        let rec1 = [record("k1", vec![("b1", 1)])];
        let rec2 = [record("k2", vec![("b1", 1)])];
        let r1 = reconciler.reconcile(&rec1);
        let r2 = reconciler.reconcile(&rec2);
        let (o1, o2) = tokio::join!(r1, r2);
        let (o1, o2) = (o1.unwrap(), o2.unwrap());

        let applied = [&o1[0], &o2[0]]
            .iter()
            .filter(|o| o.status.is_applied())
            .count();
        let rejected = [&o1[0], &o2[0]]
            .iter()
            .filter(|o| o.status.is_rejected())
            .count();

        assert_eq!(applied, 1);
        assert_eq!(rejected, 1);
        assert_eq!(db.batches().get_by_id("b1").await.unwrap().unwrap().quantity, 0);
    }

    #[tokio::test]
    async fn test_concurrent_same_key_applies_once() {
        let db = test_db().await;
        seed_batch(&db, "b1", "Paracetamol 500mg", 10).await;

        let reconciler = SyncReconciler::new(db.clone());

        let rec1 = [record("k1", vec![("b1", 2)])];
        let rec2 = [record("k1", vec![("b1", 2)])];
        let r1 = reconciler.reconcile(&rec1);
        let r2 = reconciler.reconcile(&rec2);
        let (o1, o2) = tokio::join!(r1, r2);
        let (o1, o2) = (o1.unwrap(), o2.unwrap());

        let applied = [&o1[0], &o2[0]]
            .iter()
            .filter(|o| o.status.is_applied())
            .count();
        assert_eq!(applied, 1);
        assert_eq!(db.batches().get_by_id("b1").await.unwrap().unwrap().quantity, 8);
    }
}
