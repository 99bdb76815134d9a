//! Postgres-backed ledger store implementation.
//!
//! A unit of work is one database transaction. Account locks are row locks on
//! `accounts` (`SELECT ... FOR UPDATE`), so they serialize every engine
//! instance that shares the database, and they end with the transaction.
//! The wait is bounded per statement with `lock_timeout` (`SET LOCAL`
//! semantics, via `set_config(..., true)`).
//!
//! ## Error Mapping
//!
//! | SQLSTATE | Meaning | StoreError |
//! |----------|---------|------------|
//! | `55P03` | lock_not_available (lock_timeout expired) | `LockTimeout` |
//! | `40P01` | deadlock_detected | `Conflict` |
//! | `40001` | serialization_failure | `Conflict` |
//! | `23505` | unique_violation (duplicate entry id) | `Conflict` |
//! | `22003` | numeric_value_out_of_range (sum/total overflow) | `Overflow` |
//! | other / no code | network, pool, anything else | `Backend` |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use remit_core::{AccountId, Amount, EntryId};
use remit_ledger::{AggregateStat, EntryFilter, EntryType, LedgerEntry, Side};

use super::r#trait::{LedgerStore, LedgerTx, StoreError};

/// Postgres-backed append-only ledger store.
///
/// Requires the schema from [`super::schema`]. Every account that sends or
/// receives value must have a row in `accounts`.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    /// Create a new PostgresLedgerStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresTx { tx }))
    }

    #[instrument(skip_all, fields(account = %account), err)]
    async fn entries_for(&self, account: AccountId) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                amount,
                entry_type,
                from_account,
                to_account,
                created_at
            FROM ledger_entries
            WHERE from_account = $1 OR to_account = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(account.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("entries_for", e))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let parsed = LedgerEntryRow::from_row(&row)
                .map_err(|e| StoreError::Backend(format!("failed to read ledger row: {e}")))?;
            entries.push(parsed.try_into()?);
        }
        Ok(entries)
    }

    #[instrument(skip_all, fields(account = %account), err)]
    async fn aggregate_stat(&self, account: AccountId) -> Result<Option<AggregateStat>, StoreError> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT total_outbound FROM aggregate_stats WHERE account_id = $1",
        )
        .bind(account.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("aggregate_stat", e))?;

        Ok(total.map(|total_outbound| AggregateStat {
            account_id: account,
            total_outbound,
        }))
    }
}

/// One open database transaction.
///
/// Dropping it without `commit` rolls the transaction back (SQLx behaviour),
/// which also releases its row locks.
struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PostgresTx {
    async fn lock_account(&mut self, account: AccountId, timeout: Duration) -> Result<(), StoreError> {
        // lock_timeout = 0 would disable the bound entirely.
        let millis = timeout.as_millis().max(1);

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{millis}ms"))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(account.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_lock_not_available(&e) {
                    StoreError::LockTimeout { account }
                } else {
                    map_sqlx_error("lock_account", e)
                }
            })?;

        match locked {
            Some(_) => Ok(()),
            None => Err(StoreError::UnknownAccount(account)),
        }
    }

    async fn sum_amounts(&mut self, filters: &[EntryFilter]) -> Result<Vec<i64>, StoreError> {
        if filters.is_empty() {
            return Ok(Vec::new());
        }

        // One statement, hence one READ COMMITTED snapshot for every sum.
        let columns: Vec<String> = filters
            .iter()
            .enumerate()
            .map(|(i, filter)| {
                let account_column = match filter.side {
                    Side::Sender => "from_account",
                    Side::Receiver => "to_account",
                };
                format!(
                    "(SELECT COALESCE(SUM(amount), 0)::BIGINT FROM ledger_entries \
                     WHERE {account_column} = ${} AND entry_type = ${})",
                    2 * i + 1,
                    2 * i + 2
                )
            })
            .collect();
        let sql = format!("SELECT {}", columns.join(", "));

        let mut query = sqlx::query(&sql);
        for filter in filters {
            query = query
                .bind(filter.account.as_uuid())
                .bind(filter.entry_type.as_str());
        }

        let row = query
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("sum_amounts", e))?;

        (0..filters.len())
            .map(|i| {
                row.try_get::<i64, _>(i)
                    .map_err(|e| StoreError::Backend(format!("failed to read sum {i}: {e}")))
            })
            .collect()
    }

    async fn append(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                id,
                amount,
                entry_type,
                from_account,
                to_account,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.amount.get())
        .bind(entry.entry_type.as_str())
        .bind(entry.from_account.map(Uuid::from))
        .bind(entry.to_account.as_uuid())
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_entry", e))?;

        Ok(())
    }

    async fn upsert_increment(&mut self, account: AccountId, delta: Amount) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO aggregate_stats (account_id, total_outbound)
            VALUES ($1, $2)
            ON CONFLICT (account_id)
            DO UPDATE SET
                total_outbound = aggregate_stats.total_outbound + EXCLUDED.total_outbound,
                updated_at = NOW()
            RETURNING total_outbound
            "#,
        )
        .bind(account.as_uuid())
        .bind(delta.get())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_increment", e))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                Some("40P01") | Some("40001") | Some("23505") => StoreError::Conflict(msg),
                Some("22003") => StoreError::Overflow(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Backend(format!("timed out acquiring a connection in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Check if an error is Postgres giving up on a lock wait (`lock_timeout`).
fn is_lock_not_available(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "55P03";
        }
    }
    false
}

// SQLx row types

#[derive(Debug)]
struct LedgerEntryRow {
    id: Uuid,
    amount: i64,
    entry_type: String,
    from_account: Option<Uuid>,
    to_account: Uuid,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for LedgerEntryRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(LedgerEntryRow {
            id: row.try_get("id")?,
            amount: row.try_get("amount")?,
            entry_type: row.try_get("entry_type")?,
            from_account: row.try_get("from_account")?,
            to_account: row.try_get("to_account")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<LedgerEntryRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: LedgerEntryRow) -> Result<Self, Self::Error> {
        let corrupt = |e: remit_core::DomainError| {
            StoreError::Backend(format!("corrupt ledger row {}: {}", row.id, e))
        };

        Ok(LedgerEntry {
            id: EntryId::from_uuid(row.id),
            amount: Amount::new(row.amount).map_err(corrupt)?,
            entry_type: row.entry_type.parse::<EntryType>().map_err(corrupt)?,
            from_account: row.from_account.map(AccountId::from_uuid),
            to_account: AccountId::from_uuid(row.to_account),
            created_at: row.created_at,
        })
    }
}
