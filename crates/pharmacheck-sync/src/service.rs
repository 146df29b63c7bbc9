//! # Sales Service
//!
//! The inbound interface of the engine: the online sale path, the
//! reconciliation entry point, the inventory projection and the
//! read-only snapshot for the external restock recommender.
//!
//! Everything here is a thin composition over the applier, the
//! reconciler and the repositories; no business rules live in this
//! file.

use chrono::{Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use pharmacheck_core::{
    Batch, ReconcileOutcome, SaleDraft, SaleRecord, SaleSubmission, StockSnapshot,
    DEFAULT_SNAPSHOT_WINDOW_DAYS,
};
use pharmacheck_db::Database;

use crate::applier::SaleApplier;
use crate::error::SyncResult;
use crate::reconciler::SyncReconciler;

/// Facade over the engine for callers (transport layer, tests).
///
/// Constructed with an explicit [`Database`] handle; there is no
/// ambient global state.
#[derive(Debug, Clone)]
pub struct SalesService {
    db: Database,
    applier: SaleApplier,
    reconciler: SyncReconciler,
}

impl SalesService {
    /// Creates a service over the given database handle.
    pub fn new(db: Database) -> Self {
        let applier = SaleApplier::new(db.clone());
        let reconciler = SyncReconciler::new(db.clone());
        SalesService {
            db,
            applier,
            reconciler,
        }
    }

    /// Online, synchronous sale path.
    ///
    /// Generates the idempotency key and timestamp, then applies
    /// atomically. The caller gets either a committed record or a
    /// rejection to show at the till.
    pub async fn submit_sale(&self, draft: SaleDraft) -> SyncResult<SaleRecord> {
        let submission = SaleSubmission {
            idempotency_key: Uuid::new_v4().to_string(),
            lines: draft.lines,
            total_cents: draft.total_cents,
            payment_method: draft.payment_method,
            occurred_at: Utc::now(),
        };

        debug!(idempotency_key = %submission.idempotency_key, "Submitting online sale");

        self.applier.apply(&submission).await
    }

    /// Reconciliation entry point: replays client-queued records,
    /// exactly once per idempotency key. See [`SyncReconciler`].
    pub async fn sync_batch(
        &self,
        records: &[SaleSubmission],
    ) -> SyncResult<Vec<ReconcileOutcome>> {
        self.reconciler.reconcile(records).await
    }

    /// Lists all batches, ordered by name.
    pub async fn list_batches(&self) -> SyncResult<Vec<Batch>> {
        Ok(self.db.batches().list().await?)
    }

    /// Read-only snapshot for the restock recommender: full stock plus
    /// sales from the trailing window. The recommender's output is
    /// opaque to this crate.
    pub async fn stock_and_sales_snapshot(&self, window_days: u32) -> SyncResult<StockSnapshot> {
        let cutoff = Utc::now() - Duration::days(i64::from(window_days));

        let batches = self.db.batches().list().await?;
        let sales = self.db.sales().list_since(cutoff).await?;

        Ok(StockSnapshot {
            batches,
            sales,
            window_days,
        })
    }

    /// Snapshot over the default trailing window.
    pub async fn default_snapshot(&self) -> SyncResult<StockSnapshot> {
        self.stock_and_sales_snapshot(DEFAULT_SNAPSHOT_WINDOW_DAYS)
            .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pharmacheck_core::{PaymentMethod, SaleLineInput, SyncState};
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

    fn draft(batch_id: &str, quantity: i64) -> SaleDraft {
        SaleDraft {
            lines: vec![SaleLineInput {
                batch_id: batch_id.to_string(),
                quantity,
                unit_price_cents: 400,
            }],
            total_cents: quantity * 400,
            payment_method: PaymentMethod::Card,
        }
    }

    #[tokio::test]
    async fn test_submit_sale_generates_key_and_commits() {
        let db = test_db().await;
        seed_batch(&db, "b1", "Paracetamol 500mg", 10).await;

        let service = SalesService::new(db.clone());
        let record = service.submit_sale(draft("b1", 3)).await.unwrap();

        assert!(!record.idempotency_key.is_empty());
        assert_eq!(record.sync_state, SyncState::Synced);
        assert_eq!(db.batches().get_by_id("b1").await.unwrap().unwrap().quantity, 7);

        // Two drafts never share a key
        let second = service.submit_sale(draft("b1", 1)).await.unwrap();
        assert_ne!(record.idempotency_key, second.idempotency_key);
    }

    #[tokio::test]
    async fn test_list_batches_ordered() {
        let db = test_db().await;
        seed_batch(&db, "b1", "Zinc Sulphate 20mg", 5).await;
        seed_batch(&db, "b2", "Amoxicillin 500mg", 5).await;

        let service = SalesService::new(db.clone());
        let names: Vec<String> = service
            .list_batches()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();

        assert_eq!(names, vec!["Amoxicillin 500mg", "Zinc Sulphate 20mg"]);
    }

    #[tokio::test]
    async fn test_snapshot_window_filters_old_sales() {
        let db = test_db().await;
        seed_batch(&db, "b1", "Paracetamol 500mg", 50).await;

        let service = SalesService::new(db.clone());

        // An old sale, replayed through the reconciler with a
        // client-side timestamp outside the window
        let old = SaleSubmission {
            idempotency_key: "k-old".to_string(),
            lines: vec![SaleLineInput {
                batch_id: "b1".to_string(),
                quantity: 1,
                unit_price_cents: 400,
            }],
            total_cents: 400,
            payment_method: PaymentMethod::Cash,
            occurred_at: Utc::now() - Duration::days(30),
        };
        service.sync_batch(&[old]).await.unwrap();

        // A fresh one through the online path
        service.submit_sale(draft("b1", 2)).await.unwrap();

        let snapshot = service.stock_and_sales_snapshot(7).await.unwrap();
        assert_eq!(snapshot.window_days, 7);
        assert_eq!(snapshot.batches.len(), 1);
        assert_eq!(snapshot.sales.len(), 1);
        assert_eq!(snapshot.sales[0].lines.len(), 1);
        assert_eq!(snapshot.sales[0].lines[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_snapshot_keeps_lines_for_deleted_batches() {
        let db = test_db().await;
        seed_batch(&db, "b1", "Paracetamol 500mg", 50).await;

        let service = SalesService::new(db.clone());
        service.submit_sale(draft("b1", 2)).await.unwrap();

        // Batch removed after the sale; history keeps the snapshot
        db.batches().delete("b1").await.unwrap();

        let snapshot = service.default_snapshot().await.unwrap();
        assert!(snapshot.batches.is_empty());
        assert_eq!(snapshot.sales.len(), 1);
        assert_eq!(snapshot.sales[0].lines[0].name_snapshot, "Paracetamol 500mg");
    }
}
