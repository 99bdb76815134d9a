use chrono::{DateTime, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use remit_core::{AccountId, Amount, DomainError, EntryId};

/// Which party's view of a movement an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    /// Outbound movement, from the sender's perspective.
    Debit,
    /// Inbound movement, from the receiver's perspective.
    Credit,
}

impl EntryType {
    /// Storage representation (`entry_type` column).
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Debit => "DEBIT",
            EntryType::Credit => "CREDIT",
        }
    }
}

impl core::fmt::Display for EntryType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBIT" => Ok(EntryType::Debit),
            "CREDIT" => Ok(EntryType::Credit),
            other => Err(DomainError::validation(format!("unknown entry type '{other}'"))),
        }
    }
}

/// One immutable ledger row.
///
/// `from_account` is `None` only for external top-ups. For transfers both rows
/// of a posting carry `from_account = sender` and `to_account = receiver`; only
/// `entry_type` tells the two views apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub amount: Amount,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub from_account: Option<AccountId>,
    pub to_account: AccountId,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// External top-up: a lone CREDIT with no internal sender.
    pub fn top_up(to_account: AccountId, amount: Amount, created_at: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::new(),
            amount,
            entry_type: EntryType::Credit,
            from_account: None,
            to_account,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_type_wire_names() {
        assert_eq!(serde_json::to_string(&EntryType::Debit).unwrap(), "\"DEBIT\"");
        assert_eq!(serde_json::to_string(&EntryType::Credit).unwrap(), "\"CREDIT\"");
        assert_eq!("CREDIT".parse::<EntryType>().unwrap(), EntryType::Credit);
        assert!("credit".parse::<EntryType>().is_err());
    }

    #[test]
    fn top_up_has_no_sender() {
        let to = AccountId::new();
        let entry = LedgerEntry::top_up(to, Amount::new(1_000).unwrap(), Utc::now());

        assert_eq!(entry.from_account, None);
        assert_eq!(entry.entry_type, EntryType::Credit);
        assert_eq!(entry.to_account, to);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "CREDIT");
        assert!(json["from_account"].is_null());
    }
}
