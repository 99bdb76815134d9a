use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use remit_core::{AccountId, Amount};
use remit_infra::{EngineConfig, InMemoryAccountDirectory, InMemoryLedgerStore, TransferEngine};
use remit_ledger::{balance_of, LedgerEntry, TransferPosting};
use std::sync::Arc;

/// Ledger history of `postings` transfers bouncing between two accounts.
fn history(postings: usize) -> (Vec<LedgerEntry>, AccountId) {
    let alice = AccountId::new();
    let bob = AccountId::new();
    let now = Utc::now();
    let one = Amount::new(1).unwrap();

    let mut entries = vec![LedgerEntry::top_up(alice, Amount::new(1_000_000).unwrap(), now)];
    for i in 0..postings {
        let (from, to) = if i % 2 == 0 { (alice, bob) } else { (bob, alice) };
        let posting = TransferPosting::new(from, to, one, now);
        entries.push(posting.debit);
        entries.push(posting.credit);
    }
    (entries, alice)
}

fn bench_balance_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("balance_derivation");

    for postings in [100, 1_000, 10_000] {
        let (entries, alice) = history(postings);
        group.throughput(Throughput::Elements(entries.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(postings), &entries, |b, entries| {
            b.iter(|| balance_of(black_box(entries), black_box(alice)));
        });
    }

    group.finish();
}

fn bench_in_memory_transfer(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let store = InMemoryLedgerStore::new();
    let directory = Arc::new(InMemoryAccountDirectory::new());
    let alice = directory.register("alice").unwrap().id;
    directory.register("bob").unwrap();
    let engine = TransferEngine::new(store, directory, EngineConfig::default());
    runtime.block_on(engine.deposit(alice, i64::MAX / 2)).unwrap();

    // The ledger grows with every iteration, so later samples pay for a
    // longer aggregation pass, as a real account would.
    c.bench_function("in_memory_transfer", |b| {
        b.to_async(&runtime)
            .iter(|| async { engine.transfer(alice, "bob", 1).await.unwrap() });
    });
}

criterion_group!(benches, bench_balance_derivation, bench_in_memory_transfer);
criterion_main!(benches);
