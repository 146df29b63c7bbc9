//! # Outbox Consumer
//!
//! Replays the durable sale outbox through the reconciler.
//!
//! ## Queue-Consumer Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Replay Flow                                   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 OutboxStore (trait)                             │   │
//! │  │                                                                 │   │
//! │  │  Any durable, ordered, at-least-once queue keyed by the        │   │
//! │  │  client idempotency key. SqliteOutbox is the bundled           │   │
//! │  │  implementation; the trait is the contract a device-local      │   │
//! │  │  store has to meet.                                            │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    OutboxProcessor                              │   │
//! │  │                                                                 │   │
//! │  │  1. Drain: pending entries, capture order, up to batch_size    │   │
//! │  │  2. Decode: JSON payload → SaleSubmission                      │   │
//! │  │     (undecodable → rejected with reason, never dropped)        │   │
//! │  │  3. Reconcile: exactly-once per key                            │   │
//! │  │  4. Mark: Applied/AlreadySynced → synced                       │   │
//! │  │           Rejected → rejected + reason (operator requeues)     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  The queue delivers at-least-once; the reconciler's dedup makes        │
//! │  application effectively-once. The queue itself needs no               │
//! │  exactly-once machinery.                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use pharmacheck_core::{OutboxEntry, ReconcileStatus, SaleSubmission};
use pharmacheck_db::Database;

use crate::error::SyncResult;
use crate::reconciler::SyncReconciler;

// =============================================================================
// Constants
// =============================================================================

/// Default number of entries drained per replay pass.
const DEFAULT_BATCH_SIZE: u32 = 100;

/// Default poll interval for the background loop.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

// =============================================================================
// Outbox Store Contract
// =============================================================================

/// A durable, ordered, at-least-once queue of captured sales, keyed by
/// the client idempotency key.
///
/// Implementations must survive restarts (that is the point of the
/// outbox) and return pending entries in capture order. Duplicated
/// delivery is fine; the reconciler absorbs it.
#[allow(async_fn_in_trait)]
pub trait OutboxStore {
    /// Durably appends a submission. Keyed by its idempotency key.
    async fn enqueue(&self, submission: &SaleSubmission) -> SyncResult<()>;

    /// Returns pending entries in capture order, up to `limit`.
    async fn pending(&self, limit: u32) -> SyncResult<Vec<OutboxEntry>>;

    /// Marks an entry confirmed (applied or duplicate).
    async fn mark_synced(&self, idempotency_key: &str) -> SyncResult<()>;

    /// Marks an entry refused; it must not reappear in `pending` until
    /// explicitly requeued.
    async fn mark_rejected(&self, idempotency_key: &str, reason: &str) -> SyncResult<()>;
}

// =============================================================================
// SQLite-backed store
// =============================================================================

/// The bundled [`OutboxStore`] over the `sale_outbox` table.
#[derive(Debug, Clone)]
pub struct SqliteOutbox {
    db: Database,
}

impl SqliteOutbox {
    /// Creates a store over the given database handle.
    pub fn new(db: Database) -> Self {
        SqliteOutbox { db }
    }

    /// Returns a rejected entry to the pending queue (operator action
    /// after correcting stock).
    pub async fn requeue(&self, idempotency_key: &str) -> SyncResult<()> {
        self.db.outbox().requeue(idempotency_key).await?;
        Ok(())
    }

    /// Counts entries awaiting replay.
    pub async fn count_pending(&self) -> SyncResult<i64> {
        Ok(self.db.outbox().count_pending().await?)
    }
}

impl OutboxStore for SqliteOutbox {
    async fn enqueue(&self, submission: &SaleSubmission) -> SyncResult<()> {
        let payload = serde_json::to_string(submission)?;
        self.db
            .outbox()
            .enqueue(&submission.idempotency_key, &payload)
            .await?;
        Ok(())
    }

    async fn pending(&self, limit: u32) -> SyncResult<Vec<OutboxEntry>> {
        Ok(self.db.outbox().pending(limit).await?)
    }

    async fn mark_synced(&self, idempotency_key: &str) -> SyncResult<()> {
        self.db.outbox().mark_synced(idempotency_key).await?;
        Ok(())
    }

    async fn mark_rejected(&self, idempotency_key: &str, reason: &str) -> SyncResult<()> {
        self.db
            .outbox()
            .mark_rejected(idempotency_key, reason)
            .await?;
        Ok(())
    }
}

// =============================================================================
// Replay Summary
// =============================================================================

/// What one replay pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Entries drained from the queue this pass.
    pub drained: usize,
    /// Sales applied for the first time.
    pub applied: usize,
    /// Entries that were already committed (client retries).
    pub already_synced: usize,
    /// Entries refused and held for an operator.
    pub rejected: usize,
}

// =============================================================================
// Outbox Processor
// =============================================================================

/// Drains an [`OutboxStore`] through the reconciler.
///
/// `replay()` is the single-pass entry point (call it on reconnect);
/// `run()` is a background polling loop around it.
pub struct OutboxProcessor<S> {
    store: S,
    reconciler: SyncReconciler,
    batch_size: u32,
    poll_interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running processor.
#[derive(Clone)]
pub struct OutboxProcessorHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl OutboxProcessorHandle {
    /// Triggers graceful shutdown of the `run` loop.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl<S: OutboxStore> OutboxProcessor<S> {
    /// Creates a processor and its shutdown handle.
    pub fn new(store: S, reconciler: SyncReconciler) -> (Self, OutboxProcessorHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let processor = OutboxProcessor {
            store,
            reconciler,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_rx,
        };

        (processor, OutboxProcessorHandle { shutdown_tx })
    }

    /// Sets the per-pass drain limit.
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the poll interval for the background loop.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs one replay pass: drain, decode, reconcile, mark.
    ///
    /// Safe to call again after a storage failure: entries already
    /// marked stay marked, and records the reconciler committed before
    /// the failure answer `AlreadySynced` on the next pass.
    pub async fn replay(&self) -> SyncResult<ReplaySummary> {
        let entries = self.store.pending(self.batch_size).await?;
        if entries.is_empty() {
            debug!("No pending outbox entries");
            return Ok(ReplaySummary::default());
        }

        info!(count = entries.len(), "Replaying outbox");

        let mut summary = ReplaySummary {
            drained: entries.len(),
            ..ReplaySummary::default()
        };

        let mut submissions: Vec<SaleSubmission> = Vec::with_capacity(entries.len());
        for entry in &entries {
            match serde_json::from_str::<SaleSubmission>(&entry.payload) {
                Ok(submission) => submissions.push(submission),
                Err(e) => {
                    warn!(
                        idempotency_key = %entry.idempotency_key,
                        error = %e,
                        "Undecodable outbox payload"
                    );
                    self.store
                        .mark_rejected(
                            &entry.idempotency_key,
                            &format!("undecodable payload: {e}"),
                        )
                        .await?;
                    summary.rejected += 1;
                }
            }
        }

        let outcomes = self.reconciler.reconcile(&submissions).await?;

        for outcome in &outcomes {
            match &outcome.status {
                ReconcileStatus::Applied { .. } => {
                    self.store.mark_synced(&outcome.idempotency_key).await?;
                    summary.applied += 1;
                }
                ReconcileStatus::AlreadySynced { .. } => {
                    self.store.mark_synced(&outcome.idempotency_key).await?;
                    summary.already_synced += 1;
                }
                ReconcileStatus::Rejected { reason } => {
                    self.store
                        .mark_rejected(&outcome.idempotency_key, reason)
                        .await?;
                    summary.rejected += 1;
                }
            }
        }

        info!(
            drained = summary.drained,
            applied = summary.applied,
            already_synced = summary.already_synced,
            rejected = summary.rejected,
            "Outbox replay complete"
        );

        Ok(summary)
    }

    /// Runs the polling loop until shutdown.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Outbox processor starting");

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.replay().await {
                        Ok(summary) if summary.drained > 0 => {
                            debug!(?summary, "Replay pass finished");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            // Storage hiccup: entries stay queued, the
                            // next tick retries the whole pass.
                            error!(?e, "Outbox replay failed");
                        }
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Outbox processor shutting down");
                    break;
                }
            }
        }

        info!("Outbox processor stopped");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
