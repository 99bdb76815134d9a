//! Infrastructure layer: stores, locking, the transfer engine, config.
//!
//! The engine ([`TransferEngine`]) is generic over its two collaborators, the
//! [`LedgerStore`] and the [`AccountDirectory`], each with a Postgres and an
//! in-memory backend.

pub mod balance;
pub mod config;
pub mod directory;
pub mod error;
pub mod lock;
pub mod store;
pub mod transfer;


pub use balance::BalanceCalculator;
pub use config::{ConfigError, DatabaseConfig, EngineConfig, SelfTransferPolicy};
pub use directory::{AccountDirectory, DirectoryError, InMemoryAccountDirectory, PostgresAccountDirectory};
pub use error::{ErrorKind, TransferError};
pub use lock::{LockCoordinator, LockSet};
pub use store::{InMemoryLedgerStore, LedgerStore, LedgerTx, PostgresLedgerStore, StoreError};
pub use transfer::{TransferEngine, TransferReceipt};
