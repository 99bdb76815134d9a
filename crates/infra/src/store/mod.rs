//! Ledger persistence boundary.
//!
//! Ledger rows and aggregate stats are written through one unit of work
//! ([`LedgerTx`]) so that a transfer's rows and its aggregate increment commit
//! or vanish together. Account locks are owned by the unit of work as well.

pub mod in_memory;
pub mod postgres;
pub mod schema;
pub mod r#trait;

pub use in_memory::{FaultPoint, InMemoryLedgerStore};
pub use postgres::PostgresLedgerStore;
pub use r#trait::{LedgerStore, LedgerTx, StoreError};
