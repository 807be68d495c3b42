//! Sparse per-resolution bucket storage
//!
//! Only buckets that received at least one increment are materialized, so
//! memory follows activity rather than wall-clock age. Reads walk the
//! calendar bucket by bucket and fill every missing bucket with zero.

use super::error::{CounterError, Result};
use super::resolution::Resolution;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound on the up-front reservation for a read
const MAX_PREALLOCATED_BUCKETS: usize = 4096;

/// Bucket-start -> accumulated amount for one resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSeries {
    resolution: Resolution,
    buckets: BTreeMap<DateTime<Utc>, i64>,
}

impl BucketSeries {
    pub fn new(resolution: Resolution) -> Self {
        BucketSeries {
            resolution,
            buckets: BTreeMap::new(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Add `amount` to the bucket containing `instant`.
    ///
    /// Returns the bucket's new value.
    pub fn add(&mut self, amount: i64, instant: DateTime<Utc>) -> Result<i64> {
        if amount < 0 {
            return Err(CounterError::InvalidAmount(amount));
        }
        let start = self.resolution.bucket_start(instant);
        let slot = self.buckets.entry(start).or_insert(0);
        *slot = slot.checked_add(amount).ok_or(CounterError::Overflow {
            current: *slot,
            amount,
        })?;
        Ok(*slot)
    }

    /// Value of the bucket containing `instant` (zero if never touched)
    pub fn get(&self, instant: DateTime<Utc>) -> i64 {
        self.buckets
            .get(&self.resolution.bucket_start(instant))
            .copied()
            .unwrap_or(0)
    }

    /// The `count` bucket values ending at the bucket containing `end`,
    /// oldest first.
    pub fn extract_range(&self, end: DateTime<Utc>, count: usize) -> Result<Vec<i64>> {
        self.window(end, count).map(|(_, counts)| counts)
    }

    /// One value per bucket from the bucket containing `start` through the
    /// bucket containing `end`, inclusive.
    pub fn extract_interval(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<i64>> {
        self.span(start, end).map(|(_, counts)| counts)
    }

    /// Trailing window plus the start of its first bucket
    pub(crate) fn window(
        &self,
        end: DateTime<Utc>,
        count: usize,
    ) -> Result<(DateTime<Utc>, Vec<i64>)> {
        if count == 0 {
            return Err(CounterError::InvalidArgument(
                "bucket count must be positive".to_string(),
            ));
        }

        // Resolve the first bucket up front so an out-of-range window fails
        // before anything is allocated
        let last = self.resolution.bucket_start(end);
        let first = self.resolution.rewind(last, count - 1)?;
        let counts = self.collect_from(first, last, count)?;
        Ok((first, counts))
    }

    /// Interval values plus the start of the first bucket
    pub(crate) fn span(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, Vec<i64>)> {
        if start > end {
            return Err(CounterError::InvalidArgument(format!(
                "interval start {} is after end {}",
                start, end
            )));
        }

        let first = self.resolution.bucket_start(start);
        let last = self.resolution.bucket_start(end);
        let counts = self.collect_from(first, last, 0)?;
        Ok((first, counts))
    }

    /// Walk from `first` through `last` inclusive
    fn collect_from(
        &self,
        first: DateTime<Utc>,
        last: DateTime<Utc>,
        expected: usize,
    ) -> Result<Vec<i64>> {
        let mut counts = Vec::with_capacity(expected.min(MAX_PREALLOCATED_BUCKETS));
        let mut cursor = first;
        loop {
            counts.push(self.value_at(cursor));
            if cursor >= last {
                break;
            }
            cursor = self.resolution.next(cursor)?;
        }
        Ok(counts)
    }

    #[inline]
    fn value_at(&self, bucket_start: DateTime<Utc>) -> i64 {
        self.buckets.get(&bucket_start).copied().unwrap_or(0)
    }

    /// Sum over every recorded bucket
    pub fn sum(&self) -> i64 {
        self.buckets.values().sum()
    }

    pub(crate) fn checked_sum(&self) -> Option<i64> {
        self.buckets
            .values()
            .try_fold(0i64, |acc, value| acc.checked_add(*value))
    }

    /// Number of materialized buckets
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// First and last recorded bucket starts
    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.buckets.keys().next()?;
        let last = self.buckets.keys().next_back()?;
        Some((*first, *last))
    }

    /// Recorded buckets in ascending time order
    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, i64)> + '_ {
        self.buckets.iter().map(|(start, value)| (*start, *value))
    }

    /// Every recorded key is aligned to this series' resolution and every
    /// value is non-negative
    pub(crate) fn is_well_formed(&self) -> bool {
        self.buckets
            .iter()
            .all(|(start, value)| *value >= 0 && self.resolution.bucket_start(*start) == *start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_add_accumulates_in_same_bucket() {
        let mut series = BucketSeries::new(Resolution::Hour);
        let t = utc(2024, 5, 1, 10, 15);

        assert_eq!(series.add(3, t).unwrap(), 3);
        assert_eq!(series.add(4, t + TimeDelta::minutes(30)).unwrap(), 7);
        assert_eq!(series.add(1, t + TimeDelta::hours(1)).unwrap(), 1);
        assert_eq!(series.len(), 2);
        assert_eq!(series.get(t), 7);
    }

    #[test]
    fn test_add_rejects_negative_without_mutation() {
        let mut series = BucketSeries::new(Resolution::Minute);
        let t = utc(2024, 5, 1, 10, 15);
        series.add(5, t).unwrap();

        assert!(matches!(
            series.add(-1, t),
            Err(CounterError::InvalidAmount(-1))
        ));
        assert_eq!(series.get(t), 5);
    }

    #[test]
    fn test_add_rejects_overflow() {
        let mut series = BucketSeries::new(Resolution::Day);
        let t = utc(2024, 5, 1, 0, 0);
        series.add(i64::MAX, t).unwrap();

        assert!(matches!(
            series.add(1, t),
            Err(CounterError::Overflow { current: i64::MAX, amount: 1 })
        ));
        assert_eq!(series.get(t), i64::MAX);
    }

    #[test]
    fn test_extract_range_zero_fills() {
        let mut series = BucketSeries::new(Resolution::Hour);
        let end = utc(2024, 5, 1, 10, 0);
        series.add(2, end - TimeDelta::hours(3)).unwrap();
        series.add(9, end + TimeDelta::minutes(59)).unwrap();

        assert_eq!(series.extract_range(end, 5).unwrap(), vec![0, 2, 0, 0, 9]);
        assert_eq!(series.extract_range(end, 1).unwrap(), vec![9]);
    }

    #[test]
    fn test_extract_range_rejects_zero_count() {
        let series = BucketSeries::new(Resolution::Hour);
        assert!(matches!(
            series.extract_range(utc(2024, 1, 1, 0, 0), 0),
            Err(CounterError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_extract_range_crosses_month_lengths() {
        let mut series = BucketSeries::new(Resolution::Day);
        series.add(1, utc(2024, 2, 28, 12, 0)).unwrap();
        series.add(2, utc(2024, 3, 1, 12, 0)).unwrap();

        // 2024 is a leap year: Feb 28, Feb 29, Mar 1
        assert_eq!(
            series.extract_range(utc(2024, 3, 1, 0, 0), 3).unwrap(),
            vec![1, 0, 2]
        );
    }

    #[test]
    fn test_window_reports_first_bucket() {
        let series = BucketSeries::new(Resolution::Month);
        let (first, counts) = series.window(utc(2024, 2, 15, 0, 0), 3).unwrap();

        assert_eq!(first, utc(2023, 12, 1, 0, 0));
        assert_eq!(counts, vec![0, 0, 0]);
    }

    #[test]
    fn test_oversized_window_rejected_without_allocating() {
        let mut series = BucketSeries::new(Resolution::Year);
        series.add(1, utc(2024, 5, 1, 0, 0)).unwrap();

        for count in [usize::MAX, usize::MAX / 2, 1 << 40] {
            assert!(matches!(
                series.extract_range(utc(2024, 5, 1, 0, 0), count),
                Err(CounterError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_window_near_calendar_start() {
        let series = BucketSeries::new(Resolution::Day);
        let earliest = Resolution::Day.bucket_start(DateTime::<Utc>::MIN_UTC);

        assert_eq!(series.extract_range(earliest, 1).unwrap(), vec![0]);
        assert!(matches!(
            series.extract_range(earliest, 2),
            Err(CounterError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_extract_interval_inclusive() {
        let mut series = BucketSeries::new(Resolution::Minute);
        let start = utc(2024, 1, 1, 0, 0);
        series.add(1, start).unwrap();
        series.add(4, start + TimeDelta::minutes(2)).unwrap();

        let values = series
            .extract_interval(start + TimeDelta::seconds(30), start + TimeDelta::seconds(150))
            .unwrap();
        assert_eq!(values, vec![1, 0, 4]);

        let single = series.extract_interval(start, start).unwrap();
        assert_eq!(single, vec![1]);
    }

    #[test]
    fn test_extract_interval_rejects_inverted() {
        let series = BucketSeries::new(Resolution::Minute);
        let t = utc(2024, 1, 1, 0, 0);
        assert!(matches!(
            series.extract_interval(t, t - TimeDelta::minutes(1)),
            Err(CounterError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_interval_over_bounds_sums_to_total() {
        let mut series = BucketSeries::new(Resolution::Month);
        series.add(5, utc(2023, 11, 3, 0, 0)).unwrap();
        series.add(7, utc(2024, 2, 29, 0, 0)).unwrap();

        let (first, last) = series.bounds().unwrap();
        let values = series.extract_interval(first, last).unwrap();
        assert_eq!(values, vec![5, 0, 0, 7]);
        assert_eq!(values.iter().sum::<i64>(), series.sum());
    }

    #[test]
    fn test_well_formed() {
        let mut series = BucketSeries::new(Resolution::Year);
        series.add(1, utc(1999, 6, 1, 0, 0)).unwrap();
        assert!(series.is_well_formed());
        assert_eq!(series.iter().next(), Some((utc(1999, 1, 1, 0, 0), 1)));
    }
}
