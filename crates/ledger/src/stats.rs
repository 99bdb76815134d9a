use serde::{Deserialize, Serialize};

use remit_core::{AccountId, Amount, DomainError};

use crate::balance::{sum_matching, EntryFilter};
use crate::entry::LedgerEntry;

/// Denormalised running total of an account's outbound value.
///
/// Invariant: `total_outbound == Σ amount of DEBIT rows with from_account = account_id`.
/// Only ever created or incremented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStat {
    pub account_id: AccountId,
    pub total_outbound: i64,
}

impl AggregateStat {
    /// Row created by an account's first outbound transfer.
    pub fn first(account_id: AccountId, amount: Amount) -> Self {
        Self {
            account_id,
            total_outbound: amount.get(),
        }
    }

    /// Add `amount` and return the new total.
    pub fn increment(&mut self, amount: Amount) -> Result<i64, DomainError> {
        self.total_outbound = self
            .total_outbound
            .checked_add(amount.get())
            .ok_or_else(|| {
                DomainError::invariant(format!(
                    "total_outbound overflow for account {}",
                    self.account_id
                ))
            })?;
        Ok(self.total_outbound)
    }
}

/// Recompute an account's outbound total from the ledger itself.
///
/// Used to check [`AggregateStat`] against the source of truth.
pub fn outbound_total<'a, I>(entries: I, account: AccountId) -> i128
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    sum_matching(entries, &EntryFilter::debits_from(account))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::TransferPosting;
    use chrono::Utc;

    #[test]
    fn increment_accumulates() {
        let account = AccountId::new();
        let mut stat = AggregateStat::first(account, Amount::new(100).unwrap());
        assert_eq!(stat.increment(Amount::new(250).unwrap()).unwrap(), 350);
        assert_eq!(stat.total_outbound, 350);
    }

    #[test]
    fn increment_overflow_is_an_error() {
        let account = AccountId::new();
        let mut stat = AggregateStat::first(account, Amount::new(i64::MAX).unwrap());
        assert!(stat.increment(Amount::new(1).unwrap()).is_err());
        assert_eq!(stat.total_outbound, i64::MAX);
    }

    #[test]
    fn outbound_total_ignores_inbound_and_top_ups() {
        let alice = AccountId::new();
        let bob = AccountId::new();
        let now = Utc::now();

        let out = TransferPosting::new(alice, bob, Amount::new(30).unwrap(), now);
        let back = TransferPosting::new(bob, alice, Amount::new(7).unwrap(), now);
        let entries = vec![
            LedgerEntry::top_up(alice, Amount::new(100).unwrap(), now),
            out.debit,
            out.credit,
            back.debit,
            back.credit,
        ];

        assert_eq!(outbound_total(&entries, alice), 30);
        assert_eq!(outbound_total(&entries, bob), 7);
    }
}
