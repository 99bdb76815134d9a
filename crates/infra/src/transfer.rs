//! Transfer engine: validation, locking, balance check and the atomic write.
//!
//! ## Transfer flow
//!
//! ```text
//! transfer(from, to_username, amount)
//!   ↓
//! 1. Validate amount (positive integer)
//!   ↓
//! 2. Resolve receiver through the account directory
//!   ↓
//! 3. Open a unit of work, lock {from, to} in ascending id order
//!   ↓
//! 4. Derive the sender's balance (inside the locks)
//!   ↓
//! 5. Append DEBIT + CREDIT rows, upsert the sender's aggregate stat
//!   ↓
//! 6. Commit (locks end with the unit of work)
//! ```
//!
//! Any error after step 3 drops the unit of work, which discards its writes
//! and releases its locks. Nothing is retried here and nothing is deduplicated:
//! two identical calls are two transfers.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use remit_core::{AccountId, Amount};
use remit_ledger::{AggregateStat, LedgerEntry, TransferPosting};

use crate::balance::BalanceCalculator;
use crate::config::{EngineConfig, SelfTransferPolicy};
use crate::directory::AccountDirectory;
use crate::error::{ErrorKind, TransferError};
use crate::lock::{LockCoordinator, LockSet};
use crate::store::{LedgerStore, LedgerTx, StoreError};

/// Outcome of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub debit: LedgerEntry,
    pub credit: LedgerEntry,
    /// Sender's derived balance right after the commit.
    pub sender_balance: i64,
    /// Sender's `total_outbound` right after the commit.
    pub total_outbound: i64,
}

/// Moves value between accounts over a [`LedgerStore`].
///
/// Holds no per-account state of its own; every coordination primitive lives
/// in the store, so several engines may share one backing database.
#[derive(Debug, Clone)]
pub struct TransferEngine<S, D> {
    store: S,
    directory: D,
    config: EngineConfig,
    locks: LockCoordinator,
}

impl<S, D> TransferEngine<S, D>
where
    S: LedgerStore,
    D: AccountDirectory,
{
    pub fn new(store: S, directory: D, config: EngineConfig) -> Self {
        let locks = LockCoordinator::new(config.lock_timeout);
        Self {
            store,
            directory,
            config,
            locks,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Move `amount` from `from` to the account registered as `to_username`.
    #[instrument(skip(self), fields(to = tracing::field::Empty), err(level = "debug"))]
    pub async fn transfer(
        &self,
        from: AccountId,
        to_username: &str,
        amount: i64,
    ) -> Result<TransferReceipt, TransferError> {
        let receipt = self
            .execute_transfer(from, to_username, amount)
            .await
            .map_err(report)?;

        info!(
            from = %from,
            to = %receipt.credit.to_account,
            amount,
            sender_balance = receipt.sender_balance,
            total_outbound = receipt.total_outbound,
            "transfer committed"
        );
        Ok(receipt)
    }

    async fn execute_transfer(
        &self,
        from: AccountId,
        to_username: &str,
        amount: i64,
    ) -> Result<TransferReceipt, TransferError> {
        let amount = validate_amount(amount)?;

        let to = self
            .directory
            .resolve(to_username)
            .await?
            .ok_or_else(|| TransferError::AccountNotFound(to_username.to_string()))?;
        tracing::Span::current().record("to", tracing::field::display(to));

        if from == to && self.config.self_transfer == SelfTransferPolicy::Reject {
            return Err(TransferError::SelfTransfer(from));
        }

        let mut tx = self.store.begin().await?;
        match self.post_transfer(tx.as_mut(), from, to, amount).await {
            Ok(receipt) => {
                tx.commit().await?;
                Ok(receipt)
            }
            Err(err) => {
                abort(tx).await;
                Err(err)
            }
        }
    }

    /// Steps 3 to 5 of the transfer flow, inside `tx`.
    async fn post_transfer(
        &self,
        tx: &mut dyn LedgerTx,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<TransferReceipt, TransferError> {
        self.locks.acquire(tx, &LockSet::for_transfer(from, to)).await?;

        let balance = BalanceCalculator::compute(tx, from).await?;
        if balance < amount.get() {
            return Err(TransferError::InsufficientBalance {
                account: from,
                balance,
                requested: amount.get(),
            });
        }

        let posting = TransferPosting::new(from, to, amount, Utc::now());
        for entry in posting.entries() {
            tx.append(entry).await?;
        }
        let total_outbound = tx.upsert_increment(from, amount).await?;

        // A self-transfer credits back what it debits.
        let sender_balance = if from == to {
            balance
        } else {
            balance - amount.get()
        };

        Ok(TransferReceipt {
            debit: posting.debit,
            credit: posting.credit,
            sender_balance,
            total_outbound,
        })
    }

    /// Record an external top-up: one CREDIT row with no sender.
    ///
    /// Top-ups are not outbound value, so no aggregate row changes.
    #[instrument(skip(self), err(level = "debug"))]
    pub async fn deposit(&self, to: AccountId, amount: i64) -> Result<LedgerEntry, TransferError> {
        let entry = self.execute_deposit(to, amount).await.map_err(report)?;

        info!(to = %to, amount, "top-up committed");
        Ok(entry)
    }

    async fn execute_deposit(&self, to: AccountId, amount: i64) -> Result<LedgerEntry, TransferError> {
        let amount = validate_amount(amount)?;
        let entry = LedgerEntry::top_up(to, amount, Utc::now());

        let mut tx = self.store.begin().await?;
        let written: Result<(), StoreError> = async {
            self.locks.acquire(tx.as_mut(), &LockSet::single(to)).await?;
            tx.append(&entry).await
        }
        .await;

        match written {
            Ok(()) => {
                tx.commit().await?;
                Ok(entry)
            }
            Err(err) => {
                abort(tx).await;
                Err(err.into())
            }
        }
    }

    /// Current derived balance of `account`, read without taking its lock.
    ///
    /// The value may be stale by the time the caller looks at it; transfers
    /// never rely on it.
    #[instrument(skip(self), err(level = "debug"))]
    pub async fn balance(&self, account: AccountId) -> Result<i64, TransferError> {
        let mut tx = self.store.begin().await?;
        let balance = BalanceCalculator::compute(tx.as_mut(), account).await;
        abort(tx).await;
        Ok(balance?)
    }

    /// Committed aggregate row of `account`, if it has ever sent value.
    pub async fn aggregate_stat(&self, account: AccountId) -> Result<Option<AggregateStat>, TransferError> {
        Ok(self.store.aggregate_stat(account).await?)
    }
}

fn validate_amount(raw: i64) -> Result<Amount, TransferError> {
    Amount::new(raw).map_err(|e| TransferError::InvalidAmount(e.to_string()))
}

/// Roll back a unit of work that will not be committed.
///
/// A failed rollback is only logged: the unit of work is gone either way and
/// its writes were never committed.
async fn abort(tx: Box<dyn LedgerTx>) {
    if let Err(err) = tx.rollback().await {
        warn!(error = %err, "rollback failed");
    }
}

/// Log a failure at the level its kind deserves, then hand it back.
fn report(err: TransferError) -> TransferError {
    match err.kind() {
        ErrorKind::InvalidInput | ErrorKind::NotFound => debug!(error = %err, "transfer rejected"),
        ErrorKind::InsufficientBalance => warn!(error = %err, "transfer rejected"),
        ErrorKind::Concurrency => warn!(error = %err, "transfer aborted"),
        ErrorKind::Storage => error!(error = %err, "transfer failed"),
    }
    err
}
