//! Apply the ledger schema to the database named by `DATABASE_URL`.

use anyhow::Context;

use remit_infra::config::DatabaseConfig;
use remit_infra::store::schema;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    remit_observability::init();

    let config = DatabaseConfig::from_env().context("loading database configuration")?;
    let pool = config
        .connect()
        .await
        .context("connecting to the database")?;

    schema::migrate(&pool).await.context("applying schema")?;

    tracing::info!(max_connections = config.max_connections, "schema is up to date");
    Ok(())
}
