//! `remit-ledger` — the append-only transfer ledger as pure domain types.
//!
//! Nothing in here performs IO. Stores persist these types; the transfer
//! engine decides when to create them.

pub mod account;
pub mod balance;
pub mod entry;
pub mod posting;
pub mod stats;

pub use account::{normalize_username, Account};
pub use balance::{balance_of, sum_matching, EntryFilter, Side};
pub use entry::{EntryType, LedgerEntry};
pub use posting::TransferPosting;
pub use stats::{outbound_total, AggregateStat};
