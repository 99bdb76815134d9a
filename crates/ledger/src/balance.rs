//! Balance derivation from ledger history.
//!
//! An account has no stored balance. It is always
//!
//! ```text
//! Σ amount (to_account = A, type = CREDIT) − Σ amount (from_account = A, type = DEBIT)
//! ```
//!
//! Stores answer the two sums through [`EntryFilter`]; [`balance_of`] is the
//! same contract evaluated over entries already in memory.

use serde::{Deserialize, Serialize};

use remit_core::AccountId;

use crate::entry::{EntryType, LedgerEntry};

/// Which account column a filter matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// `from_account`
    Sender,
    /// `to_account`
    Receiver,
}

/// A sum-aggregation key: `(account, side, type)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryFilter {
    pub account: AccountId,
    pub side: Side,
    pub entry_type: EntryType,
}

impl EntryFilter {
    /// Inbound value: CREDIT rows received by `account` (top-ups included).
    pub fn credits_to(account: AccountId) -> Self {
        Self {
            account,
            side: Side::Receiver,
            entry_type: EntryType::Credit,
        }
    }

    /// Outbound value: DEBIT rows sent by `account`.
    pub fn debits_from(account: AccountId) -> Self {
        Self {
            account,
            side: Side::Sender,
            entry_type: EntryType::Debit,
        }
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        if entry.entry_type != self.entry_type {
            return false;
        }
        match self.side {
            Side::Sender => entry.from_account == Some(self.account),
            Side::Receiver => entry.to_account == self.account,
        }
    }
}

/// Sum of `amount` over the entries matching `filter`.
///
/// Accumulates in `i128` so the sum of any number of `i64` amounts cannot wrap.
pub fn sum_matching<'a, I>(entries: I, filter: &EntryFilter) -> i128
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    entries
        .into_iter()
        .filter(|e| filter.matches(e))
        .map(|e| e.amount.get() as i128)
        .sum()
}

/// Derived balance of `account` over `entries`.
pub fn balance_of<'a, I>(entries: I, account: AccountId) -> i128
where
    I: IntoIterator<Item = &'a LedgerEntry> + Clone,
{
    sum_matching(entries.clone(), &EntryFilter::credits_to(account))
        - sum_matching(entries, &EntryFilter::debits_from(account))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::TransferPosting;
    use chrono::Utc;
    use proptest::prelude::*;
    use remit_core::Amount;

    fn amount(v: i64) -> Amount {
        Amount::new(v).unwrap()
    }

    #[test]
    fn top_up_counts_for_receiver_only() {
        let alice = AccountId::new();
        let entries = vec![LedgerEntry::top_up(alice, amount(1_000), Utc::now())];

        assert_eq!(balance_of(&entries, alice), 1_000);
        assert_eq!(balance_of(&entries, AccountId::new()), 0);
    }

    #[test]
    fn posting_moves_value_between_parties() {
        let alice = AccountId::new();
        let bob = AccountId::new();
        let now = Utc::now();

        let mut entries = vec![LedgerEntry::top_up(alice, amount(1_000), now)];
        let posting = TransferPosting::new(alice, bob, amount(400), now);
        entries.push(posting.debit);
        entries.push(posting.credit);

        assert_eq!(balance_of(&entries, alice), 600);
        assert_eq!(balance_of(&entries, bob), 400);
    }

    #[test]
    fn debit_row_does_not_credit_the_receiver() {
        // The DEBIT row also names the receiver in `to_account`; only the
        // CREDIT row may count toward the receiver.
        let alice = AccountId::new();
        let bob = AccountId::new();
        let posting = TransferPosting::new(alice, bob, amount(10), Utc::now());

        assert!(!EntryFilter::credits_to(bob).matches(&posting.debit));
        assert!(EntryFilter::credits_to(bob).matches(&posting.credit));
        assert!(EntryFilter::debits_from(alice).matches(&posting.debit));
        assert!(!EntryFilter::debits_from(alice).matches(&posting.credit));
    }

    #[test]
    fn self_posting_nets_to_zero() {
        let alice = AccountId::new();
        let now = Utc::now();
        let mut entries = vec![LedgerEntry::top_up(alice, amount(50), now)];
        let posting = TransferPosting::new(alice, alice, amount(50), now);
        entries.push(posting.debit);
        entries.push(posting.credit);

        assert_eq!(balance_of(&entries, alice), 50);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Postings never create or destroy value: the sum of all balances is
        /// always the sum of all top-ups.
        #[test]
        fn postings_conserve_total_value(
            top_ups in prop::collection::vec(1i64..1_000_000i64, 3),
            moves in prop::collection::vec((0usize..3, 0usize..3, 1i64..500_000i64), 0..40)
        ) {
            let accounts = [AccountId::new(), AccountId::new(), AccountId::new()];
            let now = Utc::now();

            let mut entries: Vec<LedgerEntry> = accounts
                .iter()
                .zip(&top_ups)
                .map(|(a, v)| LedgerEntry::top_up(*a, amount(*v), now))
                .collect();

            for (from, to, v) in moves {
                let posting = TransferPosting::new(accounts[from], accounts[to], amount(v), now);
                entries.push(posting.debit);
                entries.push(posting.credit);
            }

            let total: i128 = accounts.iter().map(|a| balance_of(&entries, *a)).sum();
            let minted: i128 = top_ups.iter().map(|v| *v as i128).sum();
            prop_assert_eq!(total, minted);
        }
    }
}
