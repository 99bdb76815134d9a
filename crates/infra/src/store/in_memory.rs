use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use remit_core::{AccountId, Amount};
use remit_ledger::{sum_matching, AggregateStat, EntryFilter, LedgerEntry};

use super::r#trait::{LedgerStore, LedgerTx, StoreError};

/// Operation at which an armed fault fires (see [`InMemoryLedgerStore::fail_next`]).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Begin,
    SumAmount,
    Append,
    UpsertIncrement,
    Commit,
}

#[derive(Debug, Default)]
struct State {
    entries: Vec<LedgerEntry>,
    stats: HashMap<AccountId, AggregateStat>,
}

#[derive(Debug, Default)]
struct Inner {
    state: RwLock<State>,
    row_locks: Mutex<HashMap<AccountId, Arc<AsyncMutex<()>>>>,
    faults: Mutex<HashSet<FaultPoint>>,
}

impl Inner {
    /// Consume an armed fault for `point`, if any.
    fn trip(&self, point: FaultPoint) -> Result<(), StoreError> {
        let mut faults = self.faults.lock().map_err(|_| poisoned())?;
        if faults.remove(&point) {
            return Err(StoreError::Backend(format!("injected fault at {point:?}")));
        }
        Ok(())
    }

    fn row_lock(&self, account: AccountId) -> Result<Arc<AsyncMutex<()>>, StoreError> {
        let mut locks = self.row_locks.lock().map_err(|_| poisoned())?;
        Ok(locks.entry(account).or_default().clone())
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Writes of a unit of work are buffered and applied
/// under one write lock on commit. Account locks are per-account async mutexes
/// whose guards live in the unit of work, so they are released on commit,
/// rollback or drop. Locks only coordinate units of work opened on the same
/// store (clones share state).
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    inner: Arc<Inner>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call reaching `point` fail with a backend error.
    pub fn fail_next(&self, point: FaultPoint) {
        if let Ok(mut faults) = self.inner.faults.lock() {
            faults.insert(point);
        }
    }

    /// Every committed row, in commit order.
    pub fn all_entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.inner.state.read().map_err(|_| poisoned())?;
        Ok(state.entries.clone())
    }

    /// Every committed aggregate row.
    pub fn all_stats(&self) -> Result<Vec<AggregateStat>, StoreError> {
        let state = self.inner.state.read().map_err(|_| poisoned())?;
        Ok(state.stats.values().cloned().collect())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        self.inner.trip(FaultPoint::Begin)?;
        Ok(Box::new(InMemoryTx {
            inner: self.inner.clone(),
            guards: BTreeMap::new(),
            pending_entries: Vec::new(),
            pending_increments: Vec::new(),
        }))
    }

    async fn entries_for(&self, account: AccountId) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.inner.state.read().map_err(|_| poisoned())?;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.to_account == account || e.from_account == Some(account))
            .cloned()
            .collect())
    }

    async fn aggregate_stat(&self, account: AccountId) -> Result<Option<AggregateStat>, StoreError> {
        let state = self.inner.state.read().map_err(|_| poisoned())?;
        Ok(state.stats.get(&account).cloned())
    }
}

struct InMemoryTx {
    inner: Arc<Inner>,
    guards: BTreeMap<AccountId, OwnedMutexGuard<()>>,
    pending_entries: Vec<LedgerEntry>,
    /// Outbound increments in call order, replayed onto the committed stats on commit.
    pending_increments: Vec<(AccountId, Amount)>,
}

/// Apply one increment to `stats`, creating the row on first use.
fn apply_increment(
    stats: &mut HashMap<AccountId, AggregateStat>,
    account: AccountId,
    delta: Amount,
) -> Result<i64, StoreError> {
    match stats.get_mut(&account) {
        Some(stat) => stat
            .increment(delta)
            .map_err(|e| StoreError::Overflow(e.to_string())),
        None => {
            let stat = AggregateStat::first(account, delta);
            let total = stat.total_outbound;
            stats.insert(account, stat);
            Ok(total)
        }
    }
}

/// Committed stats of every account in `pending`, with the pending increments applied.
fn replay(
    committed: &HashMap<AccountId, AggregateStat>,
    pending: &[(AccountId, Amount)],
) -> Result<HashMap<AccountId, AggregateStat>, StoreError> {
    let mut stats: HashMap<AccountId, AggregateStat> = pending
        .iter()
        .filter_map(|(account, _)| committed.get(account).map(|s| (*account, s.clone())))
        .collect();
    for (account, delta) in pending {
        apply_increment(&mut stats, *account, *delta)?;
    }
    Ok(stats)
}

#[async_trait]
impl LedgerTx for InMemoryTx {
    async fn lock_account(&mut self, account: AccountId, timeout: Duration) -> Result<(), StoreError> {
        if self.guards.contains_key(&account) {
            return Ok(());
        }

        let lock = self.inner.row_lock(account)?;
        let guard = tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout { account })?;

        self.guards.insert(account, guard);
        Ok(())
    }

    async fn sum_amounts(&mut self, filters: &[EntryFilter]) -> Result<Vec<i64>, StoreError> {
        self.inner.trip(FaultPoint::SumAmount)?;

        // One read guard for every filter: all sums see the same committed state.
        let state = self.inner.state.read().map_err(|_| poisoned())?;
        filters
            .iter()
            .map(|filter| {
                let total = sum_matching(state.entries.iter().chain(&self.pending_entries), filter);
                i64::try_from(total)
                    .map_err(|_| StoreError::Overflow(format!("sum for {filter:?} exceeds i64")))
            })
            .collect()
    }

    async fn append(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.inner.trip(FaultPoint::Append)?;
        self.pending_entries.push(entry.clone());
        Ok(())
    }

    async fn upsert_increment(&mut self, account: AccountId, delta: Amount) -> Result<i64, StoreError> {
        self.inner.trip(FaultPoint::UpsertIncrement)?;

        let mut pending = self.pending_increments.clone();
        pending.push((account, delta));

        let projected = {
            let state = self.inner.state.read().map_err(|_| poisoned())?;
            replay(&state.stats, &pending)?
        };
        let total = projected
            .get(&account)
            .map(|s| s.total_outbound)
            .ok_or_else(|| StoreError::Backend(format!("no aggregate row for account {account}")))?;

        self.pending_increments = pending;
        Ok(total)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.trip(FaultPoint::Commit)?;

        let mut state = self.inner.state.write().map_err(|_| poisoned())?;

        // Validate everything before touching state so the commit stays all-or-nothing.
        let mut seen: HashSet<_> = state.entries.iter().map(|e| e.id).collect();
        for entry in &self.pending_entries {
            if !seen.insert(entry.id) {
                return Err(StoreError::Conflict(format!("duplicate ledger entry id {}", entry.id)));
            }
        }
        let updated = replay(&state.stats, &self.pending_increments)?;

        state.entries.extend(self.pending_entries.iter().cloned());
        state.stats.extend(updated);

        // Row locks are released when `self.guards` drops, after the write above.
        drop(state);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
