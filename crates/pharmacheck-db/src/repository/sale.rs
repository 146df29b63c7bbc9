//! # Sale Repository
//!
//! Read side of the committed sale store.
//!
//! Writes happen inside the sale applier's transaction (sale row +
//! lines + stock decrements commit as one unit), so this repository
//! only reads: idempotency lookups, line hydration and the trailing
//! window used by the snapshot interface.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::DbResult;
use pharmacheck_core::{SaleLine, SaleRecord};

const SALE_COLUMNS: &str =
    "id, idempotency_key, total_cents, payment_method, sync_state, occurred_at, created_at";

const LINE_COLUMNS: &str = "id, sale_id, batch_id, name_snapshot, batch_number_snapshot, \
                            quantity, unit_price_cents, created_at";

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID, with lines hydrated.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<SaleRecord>> {
        let sale = sqlx::query_as::<_, SaleRecord>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match sale {
            Some(mut sale) => {
                sale.lines = self.get_lines(&sale.id).await?;
                Ok(Some(sale))
            }
            None => Ok(None),
        }
    }

    /// Gets a sale by its client idempotency key, with lines hydrated.
    ///
    /// The reconciler's fast path: a hit means the key was already
    /// applied and the record is immutable.
    pub async fn get_by_idempotency_key(&self, key: &str) -> DbResult<Option<SaleRecord>> {
        let sale = sqlx::query_as::<_, SaleRecord>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE idempotency_key = ?1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match sale {
            Some(mut sale) => {
                sale.lines = self.get_lines(&sale.id).await?;
                Ok(Some(sale))
            }
            None => Ok(None),
        }
    }

    /// Gets all lines for a sale, in recorded order.
    ///
    /// Lines of one sale share a timestamp; rowid order is insertion
    /// order, which is the client's order.
    pub async fn get_lines(&self, sale_id: &str) -> DbResult<Vec<SaleLine>> {
        let lines = sqlx::query_as::<_, SaleLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM sale_lines WHERE sale_id = ?1 ORDER BY rowid"
        ))
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Lists sales with `occurred_at` at or after the cutoff, oldest
    /// first, with lines hydrated. Feeds the stock-and-sales snapshot.
    pub async fn list_since(&self, cutoff: DateTime<Utc>) -> DbResult<Vec<SaleRecord>> {
        let mut sales = sqlx::query_as::<_, SaleRecord>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE occurred_at >= ?1 ORDER BY occurred_at"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        for sale in &mut sales {
            sale.lines = self.get_lines(&sale.id).await?;
        }

        Ok(sales)
    }

    /// Counts committed sales (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Generates a new sale ID.
pub fn generate_sale_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a new sale line ID.
pub fn generate_line_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
