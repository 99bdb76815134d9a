//! Postgres schema for the ledger.
//!
//! Every statement is idempotent, so `migrate` can run on every deploy.

use sqlx::PgPool;
use tracing::instrument;

use super::postgres::map_sqlx_error;
use super::r#trait::StoreError;

/// DDL applied by [`migrate`].
///
/// `accounts` rows are the lock targets for `SELECT ... FOR UPDATE`.
/// `ledger_entries` rejects UPDATE and DELETE through a trigger.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id          UUID PRIMARY KEY,
    username    TEXT NOT NULL UNIQUE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS ledger_entries (
    id            UUID PRIMARY KEY,
    amount        BIGINT NOT NULL CHECK (amount > 0),
    entry_type    TEXT NOT NULL CHECK (entry_type IN ('DEBIT', 'CREDIT')),
    from_account  UUID NULL REFERENCES accounts (id),
    to_account    UUID NOT NULL REFERENCES accounts (id),
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS ledger_entries_to_type_idx
    ON ledger_entries (to_account, entry_type);

CREATE INDEX IF NOT EXISTS ledger_entries_from_type_idx
    ON ledger_entries (from_account, entry_type);

CREATE OR REPLACE FUNCTION ledger_entries_append_only() RETURNS trigger AS $$
BEGIN
    RAISE EXCEPTION 'ledger_entries is append-only';
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS ledger_entries_append_only ON ledger_entries;
CREATE TRIGGER ledger_entries_append_only
    BEFORE UPDATE OR DELETE ON ledger_entries
    FOR EACH ROW EXECUTE FUNCTION ledger_entries_append_only();

CREATE TABLE IF NOT EXISTS aggregate_stats (
    account_id      UUID PRIMARY KEY REFERENCES accounts (id),
    total_outbound  BIGINT NOT NULL CHECK (total_outbound >= 0),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS aggregate_stats_total_outbound_idx
    ON aggregate_stats (total_outbound DESC);
"#;

/// Apply [`SCHEMA`] to the database behind `pool`.
#[instrument(skip(pool), err)]
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("migrate", e))?;
    Ok(())
}
