use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use remit_core::{AccountId, Amount};
use remit_ledger::{AggregateStat, EntryFilter, LedgerEntry};

/// Ledger store operation error.
///
/// These are **infrastructure errors** (storage, locking) as opposed to domain
/// errors (validation, business rules).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The account lock could not be acquired before the deadline.
    #[error("timed out waiting for lock on account {account}")]
    LockTimeout { account: AccountId },

    /// The account has no row to lock or reference.
    #[error("unknown account: {0}")]
    UnknownAccount(AccountId),

    /// The backend aborted the unit of work because of contention
    /// (deadlock detected, serialization failure, duplicate entry id).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An aggregated value no longer fits the storage type.
    #[error("overflow: {0}")]
    Overflow(String),

    /// Any other persistence failure (unreachable database, poisoned lock, corrupt row, ...).
    #[error("backend error: {0}")]
    Backend(String),
}

/// Append-only ledger store with transactional aggregate stats.
///
/// ## Unit of work
///
/// `begin()` opens a [`LedgerTx`]. Everything written through it (ledger rows,
/// aggregate increments) becomes visible on `commit()` and is discarded on
/// `rollback()` or when the unit of work is dropped. Account locks taken through
/// it are held until the same point.
///
/// ## Implementation requirements
///
/// Implementations must:
/// - never update or delete a committed ledger row
/// - make a commit all-or-nothing across rows and stats
/// - make `lock_account` exclusive per account across every unit of work that
///   shares the backing storage, and bounded by the given timeout
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a unit of work.
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError>;

    /// Committed rows where `account` is sender or receiver, oldest first.
    async fn entries_for(&self, account: AccountId) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Committed aggregate row for `account`, if it has ever sent value.
    async fn aggregate_stat(&self, account: AccountId) -> Result<Option<AggregateStat>, StoreError>;
}

/// One open unit of work against a [`LedgerStore`].
#[async_trait]
pub trait LedgerTx: Send {
    /// Take the exclusive lock on `account`, waiting at most `timeout`.
    ///
    /// Locking an account this unit of work already holds is a no-op.
    async fn lock_account(&mut self, account: AccountId, timeout: Duration) -> Result<(), StoreError>;

    /// Sum of `amount` over rows matching each filter, in filter order,
    /// including rows appended by this unit of work.
    ///
    /// All sums come from one snapshot of the committed ledger, so a
    /// concurrent commit can never land between two of them.
    async fn sum_amounts(&mut self, filters: &[EntryFilter]) -> Result<Vec<i64>, StoreError>;

    /// Append one immutable ledger row.
    async fn append(&mut self, entry: &LedgerEntry) -> Result<(), StoreError>;

    /// Create the account's aggregate row with `delta`, or add `delta` to it.
    /// Returns the new `total_outbound`.
    async fn upsert_increment(&mut self, account: AccountId, delta: Amount) -> Result<i64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        (**self).begin().await
    }

    async fn entries_for(&self, account: AccountId) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).entries_for(account).await
    }

    async fn aggregate_stat(&self, account: AccountId) -> Result<Option<AggregateStat>, StoreError> {
        (**self).aggregate_stat(account).await
    }
}
