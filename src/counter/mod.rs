//! Multi-resolution aggregate counters
//!
//! A counter keeps a running total plus a sparse bucket series for every
//! [`Resolution`]. Each increment lands in exactly one bucket per resolution,
//! so every series is a complete rollup of the same event stream.

mod aggregate;
mod error;
mod resolution;
mod series;
mod types;

pub use aggregate::{AggregateCounter, CounterState};
pub use error::{CounterError, Result};
pub use resolution::Resolution;
pub use series::BucketSeries;
pub use types::{AggregateCount, Interval};
