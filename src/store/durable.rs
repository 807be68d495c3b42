//! Aggregate counter store over a key/value backend
//!
//! Each counter is persisted as one bincode-encoded [`CounterState`] under
//! `<prefix>:<name>`. Increments are read-modify-write cycles serialized by a
//! per-name lock held in process; cross-process coordination is the
//! backend's concern.

use super::backend::KeyValueBackend;
use super::keyed::KeyedStore;
use super::repository::{zero_counts, zero_counts_in, AggregateCounterRepository};
use crate::counter::{AggregateCount, CounterError, CounterState, Interval, Resolution, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// [`AggregateCounterRepository`] persisting counter state in a [`KeyValueBackend`]
pub struct BackendCounterStore<B: KeyValueBackend> {
    backend: B,
    prefix: String,
    // Only names with an operation in flight have an entry
    locks: KeyedStore<String, Mutex<()>>,
}

impl<B: KeyValueBackend> BackendCounterStore<B> {
    pub fn new(backend: B, prefix: impl Into<String>) -> Self {
        BackendCounterStore {
            backend,
            prefix: prefix.into(),
            locks: KeyedStore::new(|_| Mutex::new(())),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn key(&self, name: &str) -> String {
        format!("{}:{}", self.prefix, name)
    }

    fn load(&self, name: &str) -> Result<Option<CounterState>> {
        let Some(bytes) = self.backend.get(&self.key(name))? else {
            return Ok(None);
        };
        let state: CounterState = bincode::deserialize(&bytes)?;
        if !state.is_consistent() {
            warn!(counter = %name, "rejecting inconsistent counter record");
            return Err(CounterError::Backend(format!(
                "corrupt record for counter {}",
                name
            )));
        }
        Ok(Some(state))
    }

    /// Run `op` holding the per-name lock, then drop the lock entry unless
    /// another caller is already waiting on it
    fn locked<T>(&self, name: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.locks.get_or_create(name);
        let result = {
            let _guard = lock.lock();
            op()
        };
        drop(lock);
        self.locks.remove_if_unshared(name);
        result
    }

    fn save(&self, name: &str, state: &CounterState) -> Result<()> {
        let bytes = bincode::serialize(state)?;
        self.backend.put(&self.key(name), &bytes)?;
        Ok(())
    }
}

impl<B: KeyValueBackend> AggregateCounterRepository for BackendCounterStore<B> {
    fn increment(&self, name: &str, amount: i64, instant: DateTime<Utc>) -> Result<i64> {
        if amount < 0 {
            return Err(CounterError::InvalidAmount(amount));
        }
        self.locked(name, || {
            let mut state = match self.load(name)? {
                Some(state) => state,
                None => {
                    debug!(counter = %name, "creating aggregate counter");
                    CounterState::new()
                }
            };
            let total = state.increment(amount, instant)?;
            self.save(name, &state)?;
            Ok(total)
        })
    }

    fn query(
        &self,
        name: &str,
        n_counts: usize,
        end: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<AggregateCount> {
        match self.load(name)? {
            Some(state) => state.counts(name, resolution, n_counts, end),
            None => zero_counts(name, n_counts, end, resolution),
        }
    }

    fn query_interval(
        &self,
        name: &str,
        interval: &Interval,
        resolution: Resolution,
    ) -> Result<AggregateCount> {
        match self.load(name)? {
            Some(state) => state.counts_in(name, resolution, interval),
            None => zero_counts_in(name, interval, resolution),
        }
    }

    fn total(&self, name: &str) -> Result<i64> {
        Ok(self.load(name)?.map(|s| s.total()).unwrap_or(0))
    }

    fn reset(&self, name: &str) -> Result<bool> {
        let removed = self.locked(name, || Ok(self.backend.delete(&self.key(name))?))?;
        if removed {
            info!(counter = %name, "reset aggregate counter");
        }
        Ok(removed)
    }

    fn names(&self) -> Result<Vec<String>> {
        let prefix = format!("{}:", self.prefix);
        let keys = self.backend.keys(&prefix)?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }
}
