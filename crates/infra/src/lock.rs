//! Deterministic-order account locking.
//!
//! Every operation that touches several accounts locks them in ascending
//! [`AccountId`] order. Two transfers sharing accounts therefore always contend
//! on the lowest shared account first, so no cycle of waiters can form
//! (A→B and B→A both start with `min(A, B)`).
//!
//! The locks themselves belong to the unit of work ([`LedgerTx`]); they are
//! released when it commits, rolls back or is dropped.

use std::time::Duration;

use tokio::time::Instant;
use tracing::instrument;

use remit_core::AccountId;

use crate::store::{LedgerTx, StoreError};

/// Sorted, de-duplicated set of accounts to lock for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSet {
    accounts: Vec<AccountId>,
}

impl LockSet {
    pub fn new(accounts: impl IntoIterator<Item = AccountId>) -> Self {
        let mut accounts: Vec<AccountId> = accounts.into_iter().collect();
        accounts.sort_unstable();
        accounts.dedup();
        Self { accounts }
    }

    /// Lock set of a transfer: both parties, or one account for a self-transfer.
    pub fn for_transfer(from: AccountId, to: AccountId) -> Self {
        Self::new([from, to])
    }

    pub fn single(account: AccountId) -> Self {
        Self {
            accounts: vec![account],
        }
    }

    /// Accounts in acquisition order.
    pub fn accounts(&self) -> &[AccountId] {
        &self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }
}

/// Shortest wait handed to a single lock attempt.
pub const MIN_LOCK_WAIT: Duration = Duration::from_millis(1);

/// Acquires a [`LockSet`] within one overall timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockCoordinator {
    timeout: Duration,
}

impl LockCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Lock every account of `locks` in order through `tx`.
    ///
    /// The timeout bounds the whole set, not each account: each lock call gets
    /// whatever is left until the deadline, but never less than
    /// [`MIN_LOCK_WAIT`], so every account is tried at least once. On error,
    /// locks already taken stay with `tx` and go away with it.
    #[instrument(level = "debug", skip_all, fields(accounts = locks.len()), err)]
    pub async fn acquire(&self, tx: &mut dyn LedgerTx, locks: &LockSet) -> Result<(), StoreError> {
        let deadline = Instant::now() + self.timeout;

        for &account in locks.accounts() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            tx.lock_account(account, remaining.max(MIN_LOCK_WAIT)).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryLedgerStore, LedgerStore};
    use uuid::Uuid;

    fn account(n: u128) -> AccountId {
        AccountId::from_uuid(Uuid::from_u128(n))
    }

    #[test]
    fn order_does_not_depend_on_argument_order() {
        let low = account(1);
        let high = account(2);

        assert_eq!(LockSet::for_transfer(low, high), LockSet::for_transfer(high, low));
        assert_eq!(LockSet::for_transfer(high, low).accounts(), &[low, high]);
    }

    #[test]
    fn self_transfer_locks_one_account() {
        let a = account(7);
        let locks = LockSet::for_transfer(a, a);

        assert_eq!(locks.len(), 1);
        assert_eq!(locks, LockSet::single(a));
    }

    #[tokio::test]
    async fn zero_timeout_still_takes_free_locks() {
        let store = InMemoryLedgerStore::new();
        let coordinator = LockCoordinator::new(Duration::ZERO);
        let low = account(1);
        let high = account(2);

        let mut tx = store.begin().await.unwrap();
        coordinator
            .acquire(tx.as_mut(), &LockSet::for_transfer(low, high))
            .await
            .unwrap();

        // Held now, so a second zero-timeout attempt gives up at once.
        let mut other = store.begin().await.unwrap();
        let err = coordinator
            .acquire(other.as_mut(), &LockSet::single(high))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::LockTimeout { account: high });
    }

    #[tokio::test]
    async fn contended_account_times_out_without_touching_the_rest() {
        let store = InMemoryLedgerStore::new();
        let coordinator = LockCoordinator::new(Duration::from_millis(50));
        let low = account(1);
        let high = account(2);

        let mut holder = store.begin().await.unwrap();
        coordinator
            .acquire(holder.as_mut(), &LockSet::single(high))
            .await
            .unwrap();

        let mut waiter = store.begin().await.unwrap();
        let err = coordinator
            .acquire(waiter.as_mut(), &LockSet::for_transfer(low, high))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::LockTimeout { account: high });

        // The waiter still holds `low` until it is dropped.
        let mut third = store.begin().await.unwrap();
        assert!(third.lock_account(low, Duration::from_millis(20)).await.is_err());
        drop(waiter);
        third.lock_account(low, Duration::from_millis(20)).await.unwrap();
    }
}
