//! Errors surfaced by the transfer engine.

use thiserror::Error;

use remit_core::AccountId;

use crate::directory::DirectoryError;
use crate::store::StoreError;

/// Category of a [`TransferError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed request: bad amount, rejected self-transfer.
    InvalidInput,
    /// Destination (or sender) does not exist.
    NotFound,
    /// Sender's derived balance is below the amount.
    InsufficientBalance,
    /// Lock timeout or contention detected by the store.
    Concurrency,
    /// Persistence failure.
    Storage,
}

/// Why a transfer (or top-up) did not commit.
///
/// Whatever the variant, nothing was written.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("self-transfers are not allowed (account {0})")]
    SelfTransfer(AccountId),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("insufficient balance on account {account}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        account: AccountId,
        balance: i64,
        requested: i64,
    },

    #[error("timed out waiting for lock on account {account}")]
    LockTimeout { account: AccountId },

    #[error("transfer aborted by a concurrent transaction: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::InvalidAmount(_) | TransferError::SelfTransfer(_) => ErrorKind::InvalidInput,
            TransferError::AccountNotFound(_) => ErrorKind::NotFound,
            TransferError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            TransferError::LockTimeout { .. } | TransferError::Conflict(_) => ErrorKind::Concurrency,
            TransferError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether the same call might succeed if retried later.
    ///
    /// The engine never retries by itself; this is a hint for the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Concurrency | ErrorKind::Storage)
    }
}

impl From<StoreError> for TransferError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout { account } => TransferError::LockTimeout { account },
            StoreError::UnknownAccount(account) => TransferError::AccountNotFound(account.to_string()),
            StoreError::Conflict(msg) => TransferError::Conflict(msg),
            StoreError::Overflow(msg) | StoreError::Backend(msg) => TransferError::Storage(msg),
        }
    }
}

impl From<DirectoryError> for TransferError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::InvalidUsername(name) => TransferError::AccountNotFound(name),
            other => TransferError::Storage(other.to_string()),
        }
    }
}
