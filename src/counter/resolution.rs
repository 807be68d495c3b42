//! Time granularities and calendar-aware bucket arithmetic
//!
//! All alignment happens in the UTC proleptic Gregorian calendar. A bucket is
//! identified by its start instant: the start of the containing minute, hour,
//! calendar day, calendar month or calendar year. Day, month and year steps use
//! calendar arithmetic, never fixed durations.

use super::error::{CounterError, Result};
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bucket granularity, ordered from finest to coarsest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl Resolution {
    /// Every resolution, finest first
    pub const ALL: [Resolution; 5] = [
        Resolution::Minute,
        Resolution::Hour,
        Resolution::Day,
        Resolution::Month,
        Resolution::Year,
    ];

    /// Position in [`Resolution::ALL`]
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Minute => "minute",
            Resolution::Hour => "hour",
            Resolution::Day => "day",
            Resolution::Month => "month",
            Resolution::Year => "year",
        }
    }

    /// Start of the bucket containing `instant`.
    ///
    /// Always `<= instant` and idempotent.
    pub fn bucket_start(self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let date = instant.date_naive();
        let start = match self {
            Resolution::Minute => date.and_hms_opt(instant.hour(), instant.minute(), 0),
            Resolution::Hour => date.and_hms_opt(instant.hour(), 0, 0),
            Resolution::Day => date.and_hms_opt(0, 0, 0),
            Resolution::Month => date.with_day(1).and_then(|d| d.and_hms_opt(0, 0, 0)),
            Resolution::Year => {
                NaiveDate::from_ymd_opt(date.year(), 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
            }
        };
        // Fields taken from a valid date are always valid.
        start.map(|naive| naive.and_utc()).unwrap_or(instant)
    }

    /// Start of the bucket immediately after the one starting at `bucket_start`
    pub fn next(self, bucket_start: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let next = match self {
            Resolution::Minute => bucket_start.checked_add_signed(TimeDelta::minutes(1)),
            Resolution::Hour => bucket_start.checked_add_signed(TimeDelta::hours(1)),
            Resolution::Day => bucket_start.checked_add_days(Days::new(1)),
            Resolution::Month => bucket_start.checked_add_months(Months::new(1)),
            Resolution::Year => bucket_start.checked_add_months(Months::new(12)),
        };
        next.ok_or_else(|| self.out_of_range("after", bucket_start))
    }

    /// Start of the bucket immediately before the one starting at `bucket_start`
    pub fn previous(self, bucket_start: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let previous = match self {
            Resolution::Minute => bucket_start.checked_sub_signed(TimeDelta::minutes(1)),
            Resolution::Hour => bucket_start.checked_sub_signed(TimeDelta::hours(1)),
            Resolution::Day => bucket_start.checked_sub_days(Days::new(1)),
            Resolution::Month => bucket_start.checked_sub_months(Months::new(1)),
            Resolution::Year => bucket_start.checked_sub_months(Months::new(12)),
        };
        previous.ok_or_else(|| self.out_of_range("before", bucket_start))
    }

    /// Start of the bucket `steps` buckets before the one starting at
    /// `bucket_start`, computed in one calendar step
    pub fn rewind(self, bucket_start: DateTime<Utc>, steps: usize) -> Result<DateTime<Utc>> {
        let steps_i64 = i64::try_from(steps).ok();
        let months = |per_step: usize| {
            steps
                .checked_mul(per_step)
                .and_then(|m| u32::try_from(m).ok())
                .and_then(|m| bucket_start.checked_sub_months(Months::new(m)))
        };
        let rewound = match self {
            Resolution::Minute => steps_i64
                .and_then(TimeDelta::try_minutes)
                .and_then(|delta| bucket_start.checked_sub_signed(delta)),
            Resolution::Hour => steps_i64
                .and_then(TimeDelta::try_hours)
                .and_then(|delta| bucket_start.checked_sub_signed(delta)),
            Resolution::Day => bucket_start.checked_sub_days(Days::new(steps as u64)),
            Resolution::Month => months(1),
            Resolution::Year => months(12),
        };
        rewound.ok_or_else(|| self.out_of_range("before", bucket_start))
    }

    fn out_of_range(self, direction: &str, bucket_start: DateTime<Utc>) -> CounterError {
        CounterError::InvalidArgument(format!(
            "no {} bucket {} {} within the supported calendar range",
            self, direction, bucket_start
        ))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = CounterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minute" => Ok(Resolution::Minute),
            "hour" => Ok(Resolution::Hour),
            "day" => Ok(Resolution::Day),
            "month" => Ok(Resolution::Month),
            "year" => Ok(Resolution::Year),
            other => Err(CounterError::InvalidArgument(format!(
                "unknown resolution: {}",
                other
            ))),
        }
    }
}
