use serde::{Deserialize, Serialize};

use remit_core::{AccountId, DomainError};

/// An account as seen by the ledger: identity plus a unique username.
///
/// Accounts are owned by the account directory; the ledger only references them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
}

impl Account {
    pub fn new(id: AccountId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// Trim a username and reject it if nothing is left.
pub fn normalize_username(raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("username must not be empty"));
    }
    Ok(trimmed.to_string())
}
