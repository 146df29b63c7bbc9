//! # pharmacheck-sync: Sale Applier + Offline-Sync Reconciliation
//!
//! This crate is the engine of the PharmaCheck ledger: it applies
//! sales as atomic stock-decrementing transactions and reconciles
//! streams of locally-queued, possibly-replayed sale records so that
//! each logical sale hits authoritative stock **exactly once**,
//! regardless of retries, reordering or duplicate submission.
//!
//! ## Control Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Offline-First Sale Flow                             │
//! │                                                                         │
//! │  Point of sale                                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Durable outbox (always, for resilience)                               │
//! │       │                                                                 │
//! │       │ ... connectivity returns ...                                    │
//! │       ▼                                                                 │
//! │  OutboxProcessor::replay                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncReconciler::reconcile ── exactly once per idempotency key         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SaleApplier::apply ── one atomic transaction per sale                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Stock store (batches table)                                           │
//! │                                                                         │
//! │  The online path (SalesService::submit_sale) enters at the applier     │
//! │  with a freshly generated key.                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`applier`] - atomic multi-line sale application
//! - [`reconciler`] - exactly-once replay of queued records
//! - [`outbox`] - the queue contract and its consumer
//! - [`service`] - the inbound facade
//! - [`error`] - rejection vs storage-failure taxonomy

// =============================================================================
// Module Declarations
// =============================================================================

pub mod applier;
pub mod error;
pub mod outbox;
pub mod reconciler;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use applier::SaleApplier;
pub use error::{SyncError, SyncResult};
pub use outbox::{OutboxProcessor, OutboxProcessorHandle, OutboxStore, ReplaySummary, SqliteOutbox};
pub use reconciler::SyncReconciler;
pub use service::SalesService;
