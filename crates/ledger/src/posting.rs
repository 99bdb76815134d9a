use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use remit_core::{AccountId, Amount, EntryId};

use crate::entry::{EntryType, LedgerEntry};

/// The paired DEBIT/CREDIT rows of one committed transfer.
///
/// Both rows share amount, sender, receiver and timestamp. Downstream readers
/// take the sender's view from the DEBIT row and the receiver's view from the
/// CREDIT row, so `from_account` is the sender on both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPosting {
    pub debit: LedgerEntry,
    pub credit: LedgerEntry,
}

impl TransferPosting {
    pub fn new(from: AccountId, to: AccountId, amount: Amount, at: DateTime<Utc>) -> Self {
        let row = |entry_type| LedgerEntry {
            id: EntryId::new(),
            amount,
            entry_type,
            from_account: Some(from),
            to_account: to,
            created_at: at,
        };

        Self {
            debit: row(EntryType::Debit),
            credit: row(EntryType::Credit),
        }
    }

    /// Rows in write order: DEBIT first, then CREDIT.
    pub fn entries(&self) -> [&LedgerEntry; 2] {
        [&self.debit, &self.credit]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_differ_only_in_type_and_id() {
        let from = AccountId::new();
        let to = AccountId::new();
        let posting = TransferPosting::new(from, to, Amount::new(500).unwrap(), Utc::now());

        let [debit, credit] = posting.entries();
        assert_eq!(debit.entry_type, EntryType::Debit);
        assert_eq!(credit.entry_type, EntryType::Credit);
        assert_ne!(debit.id, credit.id);

        for row in [debit, credit] {
            assert_eq!(row.amount.get(), 500);
            assert_eq!(row.from_account, Some(from));
            assert_eq!(row.to_account, to);
        }
        assert_eq!(debit.created_at, credit.created_at);
    }
}
