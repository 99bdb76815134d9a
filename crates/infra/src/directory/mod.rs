//! Account directory boundary: username → account resolution.
//!
//! The engine only ever resolves. Registration lives on the concrete
//! backends for hosts and tests.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use remit_core::AccountId;

pub use in_memory::InMemoryAccountDirectory;
pub use postgres::PostgresAccountDirectory;

/// Account directory error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("username already exists: {0}")]
    UsernameTaken(String),

    #[error("directory backend error: {0}")]
    Backend(String),
}

/// Read-only account lookup.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Resolve an exact username; `Ok(None)` when no account has it.
    async fn resolve(&self, username: &str) -> Result<Option<AccountId>, DirectoryError>;
}

#[async_trait]
impl<D> AccountDirectory for Arc<D>
where
    D: AccountDirectory + ?Sized,
{
    async fn resolve(&self, username: &str) -> Result<Option<AccountId>, DirectoryError> {
        (**self).resolve(username).await
    }
}
