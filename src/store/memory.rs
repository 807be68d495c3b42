//! Default in-memory aggregate counter store

use super::keyed::KeyedStore;
use super::repository::{zero_counts, zero_counts_in, AggregateCounterRepository};
use crate::config::CounterConfig;
use crate::counter::{AggregateCount, AggregateCounter, CounterError, Interval, Resolution, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Registry of [`AggregateCounter`]s keyed by name
///
/// Lookup and lazy creation are one atomic step on a sharded map; each
/// counter carries its own lock, so increments to different names never
/// wait on each other.
///
/// A reset racing with an increment to the same name may let that increment
/// land on the counter being removed.
#[derive(Debug)]
pub struct AggregateCounterStore {
    counters: KeyedStore<String, AggregateCounter>,
}

impl AggregateCounterStore {
    pub fn new() -> Self {
        AggregateCounterStore {
            counters: KeyedStore::new(Self::create),
        }
    }

    /// Build a store sized and sharded per `config`
    pub fn with_config(config: &CounterConfig) -> Self {
        let counters = match config.shard_amount {
            Some(shards) => {
                KeyedStore::with_capacity_and_shards(config.initial_capacity, shards, Self::create)
            }
            None => KeyedStore::with_capacity(config.initial_capacity, Self::create),
        };
        AggregateCounterStore { counters }
    }

    #[allow(clippy::ptr_arg)]
    fn create(name: &String) -> AggregateCounter {
        debug!(counter = %name, "creating aggregate counter");
        AggregateCounter::new(name.as_str())
    }

    /// Live counter for `name`, if it has been incremented since its last reset
    pub fn counter(&self, name: &str) -> Option<Arc<AggregateCounter>> {
        self.counters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.counters.contains_key(name)
    }

    /// Number of live counters
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Drop every counter
    pub fn clear(&self) {
        info!(counters = self.counters.len(), "clearing aggregate counter store");
        self.counters.clear();
    }
}

impl Default for AggregateCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateCounterRepository for AggregateCounterStore {
    fn increment(&self, name: &str, amount: i64, instant: DateTime<Utc>) -> Result<i64> {
        // Reject before lookup so a bad amount never creates an entry
        if amount < 0 {
            return Err(CounterError::InvalidAmount(amount));
        }
        self.counters.get_or_create(name).increment(amount, instant)
    }

    fn query(
        &self,
        name: &str,
        n_counts: usize,
        end: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<AggregateCount> {
        match self.counters.get(name) {
            Some(counter) => counter.counts(resolution, n_counts, end),
            None => {
                debug!(counter = %name, %resolution, "query for unknown counter");
                zero_counts(name, n_counts, end, resolution)
            }
        }
    }

    fn query_interval(
        &self,
        name: &str,
        interval: &Interval,
        resolution: Resolution,
    ) -> Result<AggregateCount> {
        match self.counters.get(name) {
            Some(counter) => counter.counts_in(resolution, interval),
            None => {
                debug!(counter = %name, %resolution, "interval query for unknown counter");
                zero_counts_in(name, interval, resolution)
            }
        }
    }

    fn total(&self, name: &str) -> Result<i64> {
        Ok(self.counters.get(name).map(|c| c.total()).unwrap_or(0))
    }

    fn reset(&self, name: &str) -> Result<bool> {
        let removed = self.counters.remove(name).is_some();
        if removed {
            info!(counter = %name, "reset aggregate counter");
        }
        Ok(removed)
    }

    fn names(&self) -> Result<Vec<String>> {
        let mut names = self.counters.keys();
        names.sort();
        Ok(names)
    }
}
