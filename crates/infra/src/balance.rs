//! Balance derivation inside a unit of work.

use tracing::instrument;

use remit_core::AccountId;
use remit_ledger::EntryFilter;

use crate::store::{LedgerTx, StoreError};

/// Derives an account balance from the ledger through an open unit of work.
///
/// Called after the account's lock is held and before any write that depends
/// on the result, so the value cannot go stale before commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceCalculator;

impl BalanceCalculator {
    /// `Σ CREDIT to account − Σ DEBIT from account`, both sums from one snapshot.
    #[instrument(level = "debug", skip(tx), err)]
    pub async fn compute(tx: &mut dyn LedgerTx, account: AccountId) -> Result<i64, StoreError> {
        let sums = tx
            .sum_amounts(&[EntryFilter::credits_to(account), EntryFilter::debits_from(account)])
            .await?;
        let &[credits, debits] = sums.as_slice() else {
            return Err(StoreError::Backend(format!(
                "expected 2 sums for account {account}, got {}",
                sums.len()
            )));
        };

        credits
            .checked_sub(debits)
            .ok_or_else(|| StoreError::Overflow(format!("balance of account {account} exceeds i64")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use remit_core::Amount;
    use remit_ledger::{LedgerEntry, TransferPosting};

    use crate::store::{FaultPoint, InMemoryLedgerStore, LedgerStore};

    fn amount(v: i64) -> Amount {
        Amount::new(v).unwrap()
    }

    #[tokio::test]
    async fn matches_the_ledger_contract() {
        let store = InMemoryLedgerStore::new();
        let alice = AccountId::new();
        let bob = AccountId::new();
        let now = Utc::now();

        let mut tx = store.begin().await.unwrap();
        tx.append(&LedgerEntry::top_up(alice, amount(1_000), now)).await.unwrap();
        let posting = TransferPosting::new(alice, bob, amount(300), now);
        for entry in posting.entries() {
            tx.append(entry).await.unwrap();
        }
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(BalanceCalculator::compute(tx.as_mut(), alice).await.unwrap(), 700);
        assert_eq!(BalanceCalculator::compute(tx.as_mut(), bob).await.unwrap(), 300);
        assert_eq!(BalanceCalculator::compute(tx.as_mut(), AccountId::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unreachable_store_is_a_storage_error() {
        let store = InMemoryLedgerStore::new();
        store.fail_next(FaultPoint::SumAmount);

        let mut tx = store.begin().await.unwrap();
        let err = BalanceCalculator::compute(tx.as_mut(), AccountId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
