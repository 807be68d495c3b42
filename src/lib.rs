//! Multi-resolution time-bucketed counters
//!
//! Each named counter keeps a running total plus per-bucket sums at minute,
//! hour, day, month and year granularity, and answers queries of the form
//! "the last N buckets at resolution R ending at T" with gaps filled as zero.
//!
//! - **Lazy creation**: counters appear on first increment; queries never create them
//! - **Per-counter locking**: increments to different names never block each other
//! - **Pluggable persistence**: in-memory by default, or any key/value backend
//!
//! Timestamps are always supplied by the caller. Buckets align to the UTC
//! calendar.

pub mod config;
pub mod counter;
pub mod store;

pub use config::{BackendKind, ConfigError, CounterConfig};
pub use counter::{
    AggregateCount, AggregateCounter, BucketSeries, CounterError, CounterState, Interval,
    Resolution, Result,
};
pub use store::{
    open_repository, AggregateCounterRepository, AggregateCounterStore, BackendCounterStore,
    InMemoryBackend, KeyValueBackend, KeyedStore, LocalFsBackend,
};
