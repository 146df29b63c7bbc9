//! # Repository Module
//!
//! Database repository implementations for the PharmaCheck ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Engine / caller                                                       │
//! │       │                                                                 │
//! │       │  db.batches().adjust_quantity("b-1", -3)                       │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  BatchRepository                                                       │
//! │  ├── list(&self)                                                       │
//! │  ├── get_by_id(&self, id)                                              │
//! │  ├── insert(&self, batch)                                              │
//! │  └── adjust_quantity(&self, id, delta)                                 │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  One deliberate exception: the sale applier runs its multi-table       │
//! │  transaction directly on the pool, reusing `batch::adjust_on` so       │
//! │  quantity still has a single mutator.                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`batch::BatchRepository`] - The stock store: batch CRUD + the quantity mutator
//! - [`sale::SaleRepository`] - Committed sale reads and line hydration
//! - [`outbox::OutboxRepository`] - Durable sale outbox queue

pub mod batch;
pub mod outbox;
pub mod sale;
