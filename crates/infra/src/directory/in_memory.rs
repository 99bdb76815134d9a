use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use remit_core::AccountId;
use remit_ledger::{normalize_username, Account};

use super::{AccountDirectory, DirectoryError};

/// In-memory account directory.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAccountDirectory {
    by_username: RwLock<HashMap<String, Account>>,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new account under a fresh identifier.
    pub fn register(&self, username: &str) -> Result<Account, DirectoryError> {
        self.insert(AccountId::new(), username)
    }

    /// Register a new account under a caller-chosen identifier.
    pub fn insert(&self, id: AccountId, username: &str) -> Result<Account, DirectoryError> {
        let username =
            normalize_username(username).map_err(|e| DirectoryError::InvalidUsername(e.to_string()))?;

        let mut accounts = self
            .by_username
            .write()
            .map_err(|_| DirectoryError::Backend("lock poisoned".to_string()))?;

        if accounts.contains_key(&username) {
            return Err(DirectoryError::UsernameTaken(username));
        }

        let account = Account::new(id, username.clone());
        accounts.insert(username, account.clone());
        Ok(account)
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn resolve(&self, username: &str) -> Result<Option<AccountId>, DirectoryError> {
        let accounts = self
            .by_username
            .read()
            .map_err(|_| DirectoryError::Backend("lock poisoned".to_string()))?;
        Ok(accounts.get(username).map(|a| a.id))
    }
}
