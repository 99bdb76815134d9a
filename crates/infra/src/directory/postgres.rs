//! Postgres-backed account directory over the `accounts` table.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use remit_core::AccountId;
use remit_ledger::{normalize_username, Account};

use super::{AccountDirectory, DirectoryError};

#[derive(Debug, Clone)]
pub struct PostgresAccountDirectory {
    pool: Arc<PgPool>,
}

impl PostgresAccountDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Insert a new account row; usernames are unique.
    #[instrument(skip(self), err)]
    pub async fn register(&self, username: &str) -> Result<Account, DirectoryError> {
        let username =
            normalize_username(username).map_err(|e| DirectoryError::InvalidUsername(e.to_string()))?;
        let id = AccountId::new();

        sqlx::query("INSERT INTO accounts (id, username) VALUES ($1, $2)")
            .bind(id.as_uuid())
            .bind(&username)
            .execute(&*self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DirectoryError::UsernameTaken(username.clone())
                } else {
                    DirectoryError::Backend(format!("register: {e}"))
                }
            })?;

        Ok(Account::new(id, username))
    }
}

#[async_trait]
impl AccountDirectory for PostgresAccountDirectory {
    async fn resolve(&self, username: &str) -> Result<Option<AccountId>, DirectoryError> {
        let id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM accounts WHERE username = $1")
            .bind(username)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| DirectoryError::Backend(format!("resolve: {e}")))?;

        Ok(id.map(AccountId::from_uuid))
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
