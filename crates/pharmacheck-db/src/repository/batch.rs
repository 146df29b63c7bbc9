//! # Batch Repository (the Stock Store)
//!
//! Authoritative batch → quantity mapping and batch CRUD.
//!
//! ## The Guarded Update
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Quantity Update Strategy                             │
//! │                                                                         │
//! │  ❌ WRONG: read-then-write (lost updates under concurrency)            │
//! │     SELECT quantity ... ; UPDATE batches SET quantity = 7 ...          │
//! │                                                                         │
//! │  ✅ CORRECT: one guarded delta statement                               │
//! │     UPDATE batches                                                     │
//! │     SET quantity = quantity + :delta                                   │
//! │     WHERE id = :id AND quantity + :delta >= 0                          │
//! │                                                                         │
//! │  Why?                                                                   │
//! │  • SQLite serializes writers; the predicate is re-evaluated against    │
//! │    committed state when the statement finally runs                     │
//! │  • rows_affected = 0 means "missing batch or short stock" - a         │
//! │    follow-up SELECT on the same connection tells which                 │
//! │  • quantity can never be observed negative, even transiently           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `adjust_on` is the ONLY statement in the codebase that writes
//! `batches.quantity`. Sales reach it through the applier's
//! transaction; restocks through [`BatchRepository::adjust_quantity`].

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult, StockError};
use pharmacheck_core::{ApplyError, Batch};

const BATCH_COLUMNS: &str = "id, name, batch_number, expiry_date, quantity, \
                             unit_price_cents, category, safety_stock, created_at, updated_at";

// =============================================================================
// The quantity mutator
// =============================================================================

/// Adjusts a batch quantity by `delta` (negative for sales, positive
/// for restocks) on the given connection.
///
/// Callable inside a caller's transaction: the sale applier passes its
/// transaction connection so the decrement commits or rolls back with
/// the rest of the sale.
///
/// ## Returns
/// * `Ok(new_quantity)` - adjustment applied
/// * `Err(StockError::Rejected(BatchNotFound))` - no such batch
/// * `Err(StockError::Rejected(InsufficientStock))` - delta would take
///   quantity below zero; carries requested and available amounts
/// * `Err(StockError::Db(_))` - storage failure
pub async fn adjust_on(
    conn: &mut SqliteConnection,
    batch_id: &str,
    delta: i64,
) -> Result<i64, StockError> {
    let now = Utc::now();

    let result = sqlx::query(
        "UPDATE batches \
         SET quantity = quantity + ?2, updated_at = ?3 \
         WHERE id = ?1 AND quantity + ?2 >= 0",
    )
    .bind(batch_id)
    .bind(delta)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if result.rows_affected() == 0 {
        // Guard failed: missing batch or short stock. Distinguish.
        let available: Option<i64> =
            sqlx::query_scalar("SELECT quantity FROM batches WHERE id = ?1")
                .bind(batch_id)
                .fetch_optional(&mut *conn)
                .await
                .map_err(DbError::from)?;

        return Err(match available {
            None => ApplyError::BatchNotFound {
                batch_id: batch_id.to_string(),
            }
            .into(),
            Some(available) => ApplyError::InsufficientStock {
                batch_id: batch_id.to_string(),
                requested: -delta,
                available,
            }
            .into(),
        });
    }

    let quantity: i64 = sqlx::query_scalar("SELECT quantity FROM batches WHERE id = ?1")
        .bind(batch_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(DbError::from)?;

    debug!(batch_id = %batch_id, delta = %delta, quantity = %quantity, "Adjusted stock");

    Ok(quantity)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for batch database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = BatchRepository::new(pool);
///
/// // Restock 20 units
/// let new_quantity = repo.adjust_quantity("batch-id", 20).await?;
///
/// // Inventory screen
/// let batches = repo.list().await?;
/// ```
#[derive(Debug, Clone)]
pub struct BatchRepository {
    pool: SqlitePool,
}

impl BatchRepository {
    /// Creates a new BatchRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BatchRepository { pool }
    }

    /// Lists all batches, ordered by name.
    pub async fn list(&self) -> DbResult<Vec<Batch>> {
        let batches = sqlx::query_as::<_, Batch>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches ORDER BY name, batch_number"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(batches)
    }

    /// Gets a batch by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Batch))` - batch found
    /// * `Ok(None)` - batch not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Batch>> {
        let batch = sqlx::query_as::<_, Batch>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(batch)
    }

    /// Inserts a new batch.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - a lot with the same
    ///   (name, batch_number) already exists
    pub async fn insert(&self, batch: &Batch) -> DbResult<()> {
        debug!(name = %batch.name, batch_number = %batch.batch_number, "Inserting batch");

        sqlx::query(
            "INSERT INTO batches (\
                 id, name, batch_number, expiry_date, quantity, \
                 unit_price_cents, category, safety_stock, created_at, updated_at\
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&batch.id)
        .bind(&batch.name)
        .bind(&batch.batch_number)
        .bind(batch.expiry_date)
        .bind(batch.quantity)
        .bind(batch.unit_price_cents)
        .bind(&batch.category)
        .bind(batch.safety_stock)
        .bind(batch.created_at)
        .bind(batch.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates batch metadata.
    ///
    /// Deliberately excludes `quantity`: stock only moves through
    /// [`adjust_on`] / [`BatchRepository::adjust_quantity`].
    pub async fn update(&self, batch: &Batch) -> DbResult<()> {
        debug!(id = %batch.id, "Updating batch metadata");

        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE batches SET \
                 name = ?2, \
                 batch_number = ?3, \
                 expiry_date = ?4, \
                 unit_price_cents = ?5, \
                 category = ?6, \
                 safety_stock = ?7, \
                 updated_at = ?8 \
             WHERE id = ?1",
        )
        .bind(&batch.id)
        .bind(&batch.name)
        .bind(&batch.batch_number)
        .bind(batch.expiry_date)
        .bind(batch.unit_price_cents)
        .bind(&batch.category)
        .bind(batch.safety_stock)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Batch", &batch.id));
        }

        Ok(())
    }

    /// Adjusts stock in its own transaction (the restock path).
    ///
    /// ## Arguments
    /// * `id` - batch ID
    /// * `delta` - change in stock (negative for sales, positive for restocking)
    ///
    /// ## Returns
    /// The new quantity after the adjustment.
    pub async fn adjust_quantity(&self, id: &str, delta: i64) -> Result<i64, StockError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let quantity = adjust_on(&mut tx, id, delta).await?;
        tx.commit().await.map_err(DbError::from)?;

        Ok(quantity)
    }

    /// Deletes a batch.
    ///
    /// Historical sale lines keep their name/batch-number snapshots,
    /// so the sale history stays readable after this.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting batch");

        let result = sqlx::query("DELETE FROM batches WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Batch", id));
        }

        Ok(())
    }

    /// Lists batches at or below their reorder threshold, lowest
    /// relative stock first. Input to restock decisions.
    pub async fn list_below_safety_stock(&self) -> DbResult<Vec<Batch>> {
        let batches = sqlx::query_as::<_, Batch>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches \
             WHERE quantity <= safety_stock \
             ORDER BY quantity - safety_stock, name"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(batches)
    }

    /// Counts batches (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM batches")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Helper to generate a new batch ID.
pub fn generate_batch_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::NaiveDate;

    fn sample_batch(name: &str, number: &str, quantity: i64) -> Batch {
        let now = Utc::now();
        Batch {
            id: generate_batch_id(),
            name: name.to_string(),
            batch_number: number.to_string(),
            expiry_date: NaiveDate::from_ymd_opt(2027, 6, 30).unwrap(),
            quantity,
            unit_price_cents: 400,
            category: Some("Analgesics".to_string()),
            safety_stock: 10,
            created_at: now,
            updated_at: now,
        }
    }

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = test_db().await;
        let repo = db.batches();

        let batch = sample_batch("Paracetamol 500mg", "PCM-11", 50);
        repo.insert(&batch).await.unwrap();

        let loaded = repo.get_by_id(&batch.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Paracetamol 500mg");
        assert_eq!(loaded.quantity, 50);
        assert_eq!(loaded.expiry_date, batch.expiry_date);
    }

    #[tokio::test]
    async fn test_duplicate_lot_rejected() {
        let db = test_db().await;
        let repo = db.batches();

        repo.insert(&sample_batch("Ibuprofen 200mg", "IBU-07", 30))
            .await
            .unwrap();

        let err = repo
            .insert(&sample_batch("Ibuprofen 200mg", "IBU-07", 5))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_list_ordered_by_name() {
        let db = test_db().await;
        let repo = db.batches();

        repo.insert(&sample_batch("Zinc Sulphate", "ZN-01", 10))
            .await
            .unwrap();
        repo.insert(&sample_batch("Amoxicillin 500mg", "AMX-04", 10))
            .await
            .unwrap();

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["Amoxicillin 500mg", "Zinc Sulphate"]);
    }

    #[tokio::test]
    async fn test_adjust_quantity_down_and_up() {
        let db = test_db().await;
        let repo = db.batches();

        let batch = sample_batch("ORS Sachet", "ORS-02", 5);
        repo.insert(&batch).await.unwrap();

        let q = repo.adjust_quantity(&batch.id, -3).await.unwrap();
        assert_eq!(q, 2);

        let q = repo.adjust_quantity(&batch.id, 20).await.unwrap();
        assert_eq!(q, 22);
    }

    #[tokio::test]
    async fn test_adjust_quantity_insufficient() {
        let db = test_db().await;
        let repo = db.batches();

        let batch = sample_batch("ORS Sachet", "ORS-02", 2);
        repo.insert(&batch).await.unwrap();

        let err = repo.adjust_quantity(&batch.id, -3).await.unwrap_err();
        match err {
            StockError::Rejected(ApplyError::InsufficientStock {
                requested,
                available,
                ..
            }) => {
                assert_eq!(requested, 3);
                assert_eq!(available, 2);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        // Untouched after the failed adjustment
        let loaded = repo.get_by_id(&batch.id).await.unwrap().unwrap();
        assert_eq!(loaded.quantity, 2);
    }

    #[tokio::test]
    async fn test_adjust_quantity_missing_batch() {
        let db = test_db().await;
        let err = db.batches().adjust_quantity("no-such-batch", -1).await.unwrap_err();
        assert!(matches!(
            err,
            StockError::Rejected(ApplyError::BatchNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_does_not_touch_quantity() {
        let db = test_db().await;
        let repo = db.batches();

        let mut batch = sample_batch("Paracetamol 500mg", "PCM-11", 50);
        repo.insert(&batch).await.unwrap();

        batch.quantity = 999; // must be ignored
        batch.unit_price_cents = 450;
        repo.update(&batch).await.unwrap();

        let loaded = repo.get_by_id(&batch.id).await.unwrap().unwrap();
        assert_eq!(loaded.quantity, 50);
        assert_eq!(loaded.unit_price_cents, 450);
    }

    #[tokio::test]
    async fn test_list_below_safety_stock() {
        let db = test_db().await;
        let repo = db.batches();

        let mut low = sample_batch("Amoxicillin 500mg", "AMX-04", 3);
        low.safety_stock = 10;
        let mut fine = sample_batch("Paracetamol 500mg", "PCM-11", 80);
        fine.safety_stock = 10;

        repo.insert(&low).await.unwrap();
        repo.insert(&fine).await.unwrap();

        let flagged = repo.list_below_safety_stock().await.unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].id, low.id);
    }
}
