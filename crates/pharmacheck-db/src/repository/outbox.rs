//! # Sale Outbox Repository
//!
//! Durable queue of locally-captured sales awaiting reconciliation.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  POINT OF SALE (possibly offline)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT INTO sale_outbox (idempotency_key, payload, 'pending')         │
//! │       │                                                                 │
//! │       │   ... connectivity returns ...                                  │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              REPLAY (OutboxProcessor in pharmacheck-sync)       │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT * FROM sale_outbox WHERE sync_state = 'pending'     │   │
//! │  │     ORDER BY created_at                                        │   │
//! │  │                                                                 │   │
//! │  │  2. Reconcile each against authoritative stock                 │   │
//! │  │     - Applied / AlreadySynced → mark_synced                    │   │
//! │  │     - Rejected → mark_rejected (held for an operator,          │   │
//! │  │       NOT replayed automatically)                              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • A sale is never lost (it's in the queue before any network I/O)     │
//! │  • Delivery is at-least-once; the reconciler's idempotency-key         │
//! │    dedup turns that into exactly-once application                      │
//! │  • A rejected sale stays visible with its reason                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use pharmacheck_core::{OutboxEntry, OutboxState};

const OUTBOX_COLUMNS: &str = "idempotency_key, payload, sync_state, attempts, last_error, \
                              created_at, attempted_at, synced_at";

/// Repository for sale outbox operations.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    /// Creates a new OutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Queues a sale for reconciliation.
    ///
    /// ## Arguments
    /// * `idempotency_key` - the client-generated key; primary key here
    /// * `payload` - JSON serialization of the full submission
    pub async fn enqueue(&self, idempotency_key: &str, payload: &str) -> DbResult<OutboxEntry> {
        let now = Utc::now();

        debug!(idempotency_key = %idempotency_key, "Queuing sale for sync");

        let entry = OutboxEntry {
            idempotency_key: idempotency_key.to_string(),
            payload: payload.to_string(),
            sync_state: OutboxState::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            attempted_at: None,
            synced_at: None,
        };

        sqlx::query(
            "INSERT INTO sale_outbox (\
                 idempotency_key, payload, sync_state, attempts, last_error, \
                 created_at, attempted_at, synced_at\
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&entry.idempotency_key)
        .bind(&entry.payload)
        .bind(entry.sync_state)
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .bind(entry.attempted_at)
        .bind(entry.synced_at)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Gets pending entries in capture order (oldest first).
    pub async fn pending(&self, limit: u32) -> DbResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM sale_outbox \
             WHERE sync_state = 'pending' \
             ORDER BY created_at \
             LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Gets one entry by key.
    pub async fn get(&self, idempotency_key: &str) -> DbResult<Option<OutboxEntry>> {
        let entry = sqlx::query_as::<_, OutboxEntry>(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM sale_outbox WHERE idempotency_key = ?1"
        ))
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Marks an entry as confirmed synced (applied or duplicate).
    pub async fn mark_synced(&self, idempotency_key: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            "UPDATE sale_outbox SET \
                 sync_state = 'synced', \
                 attempts = attempts + 1, \
                 last_error = NULL, \
                 attempted_at = ?2, \
                 synced_at = ?2 \
             WHERE idempotency_key = ?1",
        )
        .bind(idempotency_key)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Marks an entry as rejected by the ledger.
    ///
    /// Rejected entries are withheld from automatic replay: retrying
    /// cannot resolve a genuine stock shortfall. An operator corrects
    /// stock and calls [`OutboxRepository::requeue`].
    pub async fn mark_rejected(&self, idempotency_key: &str, reason: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            "UPDATE sale_outbox SET \
                 sync_state = 'rejected', \
                 attempts = attempts + 1, \
                 last_error = ?2, \
                 attempted_at = ?3 \
             WHERE idempotency_key = ?1",
        )
        .bind(idempotency_key)
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns a rejected entry to the pending queue (operator action
    /// after correcting stock).
    pub async fn requeue(&self, idempotency_key: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE sale_outbox SET sync_state = 'pending' \
             WHERE idempotency_key = ?1 AND sync_state = 'rejected'",
        )
        .bind(idempotency_key)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Outbox entry (rejected)", idempotency_key));
        }

        Ok(())
    }

    /// Counts pending entries.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sale_outbox WHERE sync_state = 'pending'")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Deletes synced entries older than the given number of days.
    ///
    /// ## Returns
    /// Number of deleted entries.
    pub async fn cleanup_synced(&self, days_old: u32) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM sale_outbox \
             WHERE sync_state = 'synced' \
             AND synced_at < datetime('now', '-' || ?1 || ' days')",
        )
        .bind(days_old)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
