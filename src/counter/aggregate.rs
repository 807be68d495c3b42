//! Named counter: a running total plus one bucket series per resolution

use super::error::{CounterError, Result};
use super::resolution::Resolution;
use super::series::BucketSeries;
use super::types::{AggregateCount, Interval};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Unsynchronized counter state
///
/// Every series is a complete rollup of the same increments, so each series
/// sums to `total`. This is also the unit a durable backend persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    total: i64,
    series: Vec<BucketSeries>,
}

impl CounterState {
    pub fn new() -> Self {
        CounterState {
            total: 0,
            series: Resolution::ALL.iter().map(|r| BucketSeries::new(*r)).collect(),
        }
    }

    /// Verify all invariants hold for this state
    #[cfg(debug_assertions)]
    pub fn verify_invariants(&self) {
        debug_assert!(self.total >= 0, "Invariant violated: negative total {}", self.total);
        for series in &self.series {
            debug_assert_eq!(
                series.sum(),
                self.total,
                "Invariant violated: {} series does not roll up to total",
                series.resolution()
            );
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub fn verify_invariants(&self) {}

    /// Structural check for state read back from a backend
    pub fn is_consistent(&self) -> bool {
        self.total >= 0
            && self.series.len() == Resolution::ALL.len()
            && self
                .series
                .iter()
                .zip(Resolution::ALL)
                .all(|(s, r)| {
                    s.resolution() == r && s.is_well_formed() && s.checked_sum() == Some(self.total)
                })
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn series(&self, resolution: Resolution) -> &BucketSeries {
        &self.series[resolution.index()]
    }

    /// Apply one increment to the total and every series.
    ///
    /// Validation happens up front so a rejected increment touches nothing.
    /// Once the total fits, every bucket fits too: buckets are non-negative
    /// parts of the total.
    pub fn increment(&mut self, amount: i64, instant: DateTime<Utc>) -> Result<i64> {
        if amount < 0 {
            return Err(CounterError::InvalidAmount(amount));
        }
        let total = self.total.checked_add(amount).ok_or(CounterError::Overflow {
            current: self.total,
            amount,
        })?;

        for series in &mut self.series {
            series.add(amount, instant)?;
        }
        self.total = total;
        self.verify_invariants();
        Ok(total)
    }

    /// `n_counts` buckets at `resolution` ending at the bucket containing `end`
    pub fn counts(
        &self,
        name: &str,
        resolution: Resolution,
        n_counts: usize,
        end: DateTime<Utc>,
    ) -> Result<AggregateCount> {
        let series = self.series(resolution);
        let (first, counts) = series.window(end, n_counts)?;
        Ok(AggregateCount {
            name: name.to_string(),
            resolution,
            interval: Interval::new(first, resolution.bucket_start(end))?,
            counts,
        })
    }

    /// One bucket per `resolution` step across `interval`
    pub fn counts_in(
        &self,
        name: &str,
        resolution: Resolution,
        interval: &Interval,
    ) -> Result<AggregateCount> {
        let series = self.series(resolution);
        let (first, counts) = series.span(interval.start(), interval.end())?;
        Ok(AggregateCount {
            name: name.to_string(),
            resolution,
            interval: Interval::new(first, resolution.bucket_start(interval.end()))?,
            counts,
        })
    }
}

impl Default for CounterState {
    fn default() -> Self {
        Self::new()
    }
}

/// One named counter, safe to share across threads
///
/// A single mutex per counter guards increments and reads alike, so readers
/// never observe a partially applied increment.
#[derive(Debug)]
pub struct AggregateCounter {
    name: String,
    state: Mutex<CounterState>,
}

impl AggregateCounter {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_state(name, CounterState::new())
    }

    /// Rebuild a counter around previously captured state
    pub fn from_state(name: impl Into<String>, state: CounterState) -> Self {
        AggregateCounter {
            name: name.into(),
            state: Mutex::new(state),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add `amount` at `instant`; returns the new total
    pub fn increment(&self, amount: i64, instant: DateTime<Utc>) -> Result<i64> {
        self.state.lock().increment(amount, instant)
    }

    pub fn counts(
        &self,
        resolution: Resolution,
        n_counts: usize,
        end: DateTime<Utc>,
    ) -> Result<AggregateCount> {
        self.state.lock().counts(&self.name, resolution, n_counts, end)
    }

    pub fn counts_in(&self, resolution: Resolution, interval: &Interval) -> Result<AggregateCount> {
        self.state.lock().counts_in(&self.name, resolution, interval)
    }

    pub fn total(&self) -> i64 {
        self.state.lock().total()
    }

    /// Consistent copy of the full state
    pub fn snapshot(&self) -> CounterState {
        self.state.lock().clone()
    }
}
