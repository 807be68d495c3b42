//! Query types shared by counters and stores

use super::error::{CounterError, Result};
use super::resolution::Resolution;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed time interval, `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Interval {
    /// Create an interval, rejecting `start > end`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(CounterError::InvalidArgument(format!(
                "interval start {} is after end {}",
                start, end
            )));
        }
        Ok(Interval { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Snapshot of one counter's bucket sums at a single resolution
///
/// `counts` is ordered oldest to newest. `interval` spans the start of the
/// first bucket through the start of the last bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCount {
    pub name: String,
    pub resolution: Resolution,
    pub interval: Interval,
    pub counts: Vec<i64>,
}

impl AggregateCount {
    /// Sum of all bucket values in the snapshot
    pub fn sum(&self) -> i64 {
        self.counts.iter().sum()
    }

    /// Number of buckets
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Pairs each count with the start of its bucket.
    ///
    /// Fails with `InvalidArgument` when the buckets would run past the
    /// supported calendar range, which only a hand-built snapshot can do.
    pub fn buckets(&self) -> Result<Vec<(DateTime<Utc>, i64)>> {
        let mut out = Vec::with_capacity(self.counts.len());
        let mut start = self.interval.start;
        for (i, &count) in self.counts.iter().enumerate() {
            if i > 0 {
                start = self.resolution.next(start)?;
            }
            out.push((start, count));
        }
        Ok(out)
    }
}
