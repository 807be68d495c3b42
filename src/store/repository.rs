//! Contract every aggregate counter backend satisfies

use crate::counter::{AggregateCount, Interval, Resolution, Result};
use chrono::{DateTime, Utc};

/// Name-keyed aggregate counter storage
///
/// Implementations must:
/// - create a counter lazily on its first increment, never on a query
/// - answer queries against unknown names with an all-zero snapshot
/// - serialize increments to the same name and keep every resolution
///   consistent with the total
/// - reject negative amounts and empty queries without mutating anything
///
/// The store never reads the system clock; all instants come from the caller.
pub trait AggregateCounterRepository: Send + Sync {
    /// Add `amount` to `name` at `instant`, returning the new total
    fn increment(&self, name: &str, amount: i64, instant: DateTime<Utc>) -> Result<i64>;

    /// The last `n_counts` buckets at `resolution` ending at the bucket
    /// containing `end`
    fn query(
        &self,
        name: &str,
        n_counts: usize,
        end: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<AggregateCount>;

    /// Every bucket at `resolution` covering `interval`
    fn query_interval(
        &self,
        name: &str,
        interval: &Interval,
        resolution: Resolution,
    ) -> Result<AggregateCount>;

    /// Running total for `name` (zero if unknown)
    fn total(&self, name: &str) -> Result<i64>;

    /// Remove `name` entirely. Returns whether a counter existed.
    fn reset(&self, name: &str) -> Result<bool>;

    /// Names of every live counter, sorted
    fn names(&self) -> Result<Vec<String>>;
}

/// Snapshot for a name that has never been incremented
pub(crate) fn zero_counts(
    name: &str,
    n_counts: usize,
    end: DateTime<Utc>,
    resolution: Resolution,
) -> Result<AggregateCount> {
    crate::counter::CounterState::new().counts(name, resolution, n_counts, end)
}

/// Interval snapshot for a name that has never been incremented
pub(crate) fn zero_counts_in(
    name: &str,
    interval: &Interval,
    resolution: Resolution,
) -> Result<AggregateCount> {
    crate::counter::CounterState::new().counts_in(name, resolution, interval)
}
