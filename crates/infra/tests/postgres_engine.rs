//! Transfer engine against a real Postgres.
//!
//! Ignored by default. Run with `DATABASE_URL` pointing at a scratch database
//! and `--ignored`; every test registers fresh accounts so runs do not
//! interfere with each other.

use std::sync::Arc;
use std::time::Duration;

use remit_core::AccountId;
use remit_infra::store::schema;
use remit_infra::{
    DatabaseConfig, EngineConfig, ErrorKind, LedgerStore, PostgresAccountDirectory,
    PostgresLedgerStore, TransferEngine, TransferError,
};
use uuid::Uuid;

type Engine = TransferEngine<PostgresLedgerStore, PostgresAccountDirectory>;

async fn setup(lock_timeout: Duration) -> (Arc<Engine>, PostgresAccountDirectory) {
    let config = DatabaseConfig::from_env().expect("DATABASE_URL must name a scratch database");
    let pool = config.connect().await.expect("connect to DATABASE_URL");
    schema::migrate(&pool).await.expect("apply schema");

    let directory = PostgresAccountDirectory::new(pool.clone());
    let engine = TransferEngine::new(
        PostgresLedgerStore::new(pool),
        directory.clone(),
        EngineConfig::default().with_lock_timeout(lock_timeout),
    );
    (Arc::new(engine), directory)
}

/// Unique username so repeated runs never collide.
fn username(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

async fn register(directory: &PostgresAccountDirectory, prefix: &str) -> (AccountId, String) {
    let account = directory.register(&username(prefix)).await.unwrap();
    (account.id, account.username)
}

#[tokio::test]
#[ignore = "needs DATABASE_URL pointing at a scratch Postgres"]
async fn transfer_debits_credits_and_counts_outbound() {
    let (engine, directory) = setup(Duration::from_secs(5)).await;
    let (x, _) = register(&directory, "x").await;
    let (y, y_name) = register(&directory, "y").await;
    engine.deposit(x, 1_000).await.unwrap();

    let receipt = engine.transfer(x, &y_name, 1_000).await.unwrap();
    assert_eq!(receipt.sender_balance, 0);
    assert_eq!(receipt.total_outbound, 1_000);
    assert_eq!(engine.balance(x).await.unwrap(), 0);
    assert_eq!(engine.balance(y).await.unwrap(), 1_000);

    let rows = engine.store().entries_for(x).await.unwrap();
    // top-up + DEBIT + CREDIT, the pair sharing sender and receiver
    assert_eq!(rows.len(), 3);
    assert!(rows[1..].iter().all(|r| r.from_account == Some(x) && r.to_account == y));
}

#[tokio::test]
#[ignore = "needs DATABASE_URL pointing at a scratch Postgres"]
async fn rejected_transfers_leave_no_rows() {
    let (engine, directory) = setup(Duration::from_secs(5)).await;
    let (x, _) = register(&directory, "x").await;
    let (_, y_name) = register(&directory, "y").await;
    engine.deposit(x, 999).await.unwrap();

    let err = engine.transfer(x, &y_name, 1_000).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);

    let err = engine.transfer(x, &username("nobody"), 100).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = engine.transfer(x, &y_name, 0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    assert_eq!(engine.store().entries_for(x).await.unwrap().len(), 1);
    assert!(engine.aggregate_stat(x).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "needs DATABASE_URL pointing at a scratch Postgres"]
async fn row_lock_held_elsewhere_times_out() {
    let (engine, directory) = setup(Duration::from_millis(200)).await;
    let (x, _) = register(&directory, "x").await;
    let (y, y_name) = register(&directory, "y").await;
    engine.deposit(x, 500).await.unwrap();

    let mut holder = engine.store().begin().await.unwrap();
    holder.lock_account(y, Duration::from_secs(1)).await.unwrap();

    let err = engine.transfer(x, &y_name, 100).await.unwrap_err();
    assert!(matches!(err, TransferError::LockTimeout { .. }), "{err:?}");

    holder.rollback().await.unwrap();
    engine.transfer(x, &y_name, 100).await.unwrap();
    assert_eq!(engine.balance(x).await.unwrap(), 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs DATABASE_URL pointing at a scratch Postgres"]
async fn opposite_transfers_complete_without_deadlock() {
    let (engine, directory) = setup(Duration::from_secs(5)).await;
    let (a, a_name) = register(&directory, "a").await;
    let (b, b_name) = register(&directory, "b").await;
    engine.deposit(a, 1_000).await.unwrap();
    engine.deposit(b, 1_000).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..40 {
        let engine = engine.clone();
        let (from, to) = if i % 2 == 0 { (a, b_name.clone()) } else { (b, a_name.clone()) };
        handles.push(tokio::spawn(async move { engine.transfer(from, &to, 10).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(engine.balance(a).await.unwrap(), 1_000);
    assert_eq!(engine.balance(b).await.unwrap(), 1_000);
    assert_eq!(engine.aggregate_stat(a).await.unwrap().unwrap().total_outbound, 200);
}
