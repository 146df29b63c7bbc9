//! # Domain Types
//!
//! Core domain types used throughout PharmaCheck.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Batch       │   │   SaleRecord    │   │    SaleLine     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  name           │   │  idempotency_key│   │  sale_id (FK)   │       │
//! │  │  batch_number   │   │  sync_state     │   │  batch_id       │       │
//! │  │  quantity       │   │  total_cents    │   │  name_snapshot  │       │
//! │  │  safety_stock   │   │  occurred_at    │   │  quantity       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ SaleSubmission  │   │ PaymentMethod   │   │   SyncState     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  client-made    │   │  Cash           │   │  Synced         │       │
//! │  │  record, input  │   │  MobileMoney    │   │  Pending        │       │
//! │  │  to reconcile   │   │  Card / Other   │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! A committed sale has:
//! - `id`: UUID v4 - server-assigned, used for database relations
//! - `idempotency_key`: client-assigned token that makes duplicate
//!   submission collapse to a no-op

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Batch
// =============================================================================

/// A tracked quantity of one medicine lot.
///
/// `quantity` is authoritative stock and only ever moves through the
/// storage layer's adjust primitive (sales decrement it, restocks
/// increment it). Everything else is descriptive metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Batch {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Medicine name as printed on the box.
    pub name: String,

    /// Manufacturer batch number. `(name, batch_number)` is unique.
    pub batch_number: String,

    /// Expiry date of the lot.
    pub expiry_date: NaiveDate,

    /// Units currently on hand. Never negative.
    pub quantity: i64,

    /// Selling price per unit, in cents.
    pub unit_price_cents: i64,

    /// Optional category (e.g. "Antibiotics").
    pub category: Option<String>,

    /// Reorder threshold: stock at or below this level needs attention.
    pub safety_stock: i64,

    /// When the batch was created.
    pub created_at: DateTime<Utc>,

    /// When the batch was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    /// Returns the unit price as a Money type.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Checks whether on-hand stock covers a requested quantity.
    pub fn can_cover(&self, quantity: i64) -> bool {
        self.quantity >= quantity
    }

    /// Checks whether the batch is at or below its reorder threshold.
    pub fn needs_restock(&self) -> bool {
        self.quantity <= self.safety_stock
    }

    /// Checks whether the lot is expired as of the given date.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date < today
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a sale was paid for. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Mobile money transfer.
    MobileMoney,
    /// Card payment on external terminal.
    Card,
    /// Anything else (credit, voucher, ...).
    Other,
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Cash
    }
}

// =============================================================================
// Sync State
// =============================================================================

/// Whether a sale record has been durably committed server-side.
///
/// A record is created client-side as `Pending` and becomes `Synced`
/// only after the applier's transaction commits. Once `Synced` it is
/// immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Durably committed against authoritative stock.
    Synced,
    /// Captured locally, not yet confirmed.
    Pending,
}

// =============================================================================
// Sale Record
// =============================================================================

/// A committed sale and its line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleRecord {
    /// Server-assigned identifier (UUID v4).
    pub id: String,

    /// Client-generated token. Unique across all sales; the basis of
    /// the exactly-once guarantee.
    pub idempotency_key: String,

    /// Line items, in the order the client recorded them.
    /// Hydrated separately from the `sale_lines` table.
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub lines: Vec<SaleLine>,

    /// Client-supplied total, in cents. Informational: recorded as-is,
    /// not re-derived from line items.
    pub total_cents: i64,

    /// How the sale was paid.
    pub payment_method: PaymentMethod,

    /// Commit state of the record.
    pub sync_state: SyncState,

    /// When the sale happened at the till (client clock).
    pub occurred_at: DateTime<Utc>,

    /// When the record was committed server-side.
    pub created_at: DateTime<Utc>,
}

impl SaleRecord {
    /// Returns the client-supplied total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Sums the line totals. May differ from `total_cents` - the
    /// client total is what was charged, this is what the lines add
    /// up to.
    pub fn derived_total(&self) -> Money {
        Money::from_cents(
            self.lines
                .iter()
                .map(|l| l.unit_price_cents * l.quantity)
                .sum(),
        )
    }
}

// =============================================================================
// Sale Line
// =============================================================================

/// A line item in a committed sale.
/// Uses snapshot pattern to freeze batch data at time of sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleLine {
    pub id: String,
    pub sale_id: String,
    /// Batch the stock came from. The batch row may be deleted later;
    /// the snapshots below keep the history readable.
    pub batch_id: String,
    /// Medicine name at time of sale (frozen).
    pub name_snapshot: String,
    /// Batch number at time of sale (frozen).
    pub batch_number_snapshot: String,
    /// Units sold.
    pub quantity: i64,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl SaleLine {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Returns the line total (unit price × quantity) as Money.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents * self.quantity)
    }
}

// =============================================================================
// Submissions (inputs to the engine)
// =============================================================================

/// One requested line of a sale, before it is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleLineInput {
    /// Batch to decrement.
    pub batch_id: String,
    /// Units requested. Must be positive.
    pub quantity: i64,
    /// Unit price the client charged, in cents.
    pub unit_price_cents: i64,
}

/// A client-originated sale record, as replayed from the outbox.
///
/// This is the reconciler's unit of work: everything the client knew
/// at the till, including the idempotency key it generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleSubmission {
    /// Client-generated token, globally unique per client.
    pub idempotency_key: String,
    /// Requested line items, in order.
    pub lines: Vec<SaleLineInput>,
    /// Client-computed total, in cents.
    pub total_cents: i64,
    /// How the sale was paid.
    pub payment_method: PaymentMethod,
    /// When the sale happened at the till.
    pub occurred_at: DateTime<Utc>,
}

/// An online-path sale request (`submit_sale`). The service generates
/// the idempotency key and timestamp before applying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleDraft {
    pub lines: Vec<SaleLineInput>,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
}

// =============================================================================
// Reconciliation Outcomes
// =============================================================================

/// Per-record result of a reconciliation call, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// Key of the record this outcome belongs to.
    pub idempotency_key: String,
    /// What happened to it.
    pub status: ReconcileStatus,
}

/// What the reconciler did with a single record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconcileStatus {
    /// A synced record with this key already existed; nothing was
    /// applied. Re-submission is a no-op, never a double-decrement.
    AlreadySynced { sale_id: String },
    /// The sale was applied and committed in this call.
    Applied { sale_id: String },
    /// The sale was refused (missing batch, insufficient stock,
    /// malformed record). Stock is untouched; the record stays pending
    /// client-side for operator intervention.
    Rejected { reason: String },
}

impl ReconcileStatus {
    /// True for `Applied`.
    pub fn is_applied(&self) -> bool {
        matches!(self, ReconcileStatus::Applied { .. })
    }

    /// True for `Rejected`.
    pub fn is_rejected(&self) -> bool {
        matches!(self, ReconcileStatus::Rejected { .. })
    }
}

// =============================================================================
// Outbox
// =============================================================================

/// Queue state of an outbox entry.
///
/// Distinct from [`SyncState`]: the queue needs a third state for
/// entries the ledger refused, which are held for an operator and
/// never replayed automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OutboxState {
    /// Awaiting replay.
    Pending,
    /// Confirmed applied (or confirmed duplicate).
    Synced,
    /// Refused by the ledger; requires operator correction + requeue.
    Rejected,
}

/// An entry in the durable sale outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OutboxEntry {
    /// Client-generated idempotency key; primary key of the queue.
    pub idempotency_key: String,
    /// The full submission as JSON.
    pub payload: String,
    /// Queue state.
    pub sync_state: OutboxState,
    /// Number of replay attempts.
    pub attempts: i64,
    /// Last error message if a replay failed or the sale was rejected.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// When a replay last touched this entry.
    pub attempted_at: Option<DateTime<Utc>>,
    /// When the entry was confirmed synced.
    pub synced_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Snapshot for the restock recommender
// =============================================================================

/// Read-only snapshot handed to the external restock-recommendation
/// generator: full stock plus sales inside a trailing window. The
/// ledger does not interpret the recommender's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub batches: Vec<Batch>,
    pub sales: Vec<SaleRecord>,
    /// Trailing window the sales were taken from, in days.
    pub window_days: u32,
}

// =============================================================================
// Unit Tests
// =============================================================================
