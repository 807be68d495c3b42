//! Aggregate counter stores
//!
//! - [`AggregateCounterStore`]: in-memory registry, the default
//! - [`BackendCounterStore`]: persists each counter in a [`KeyValueBackend`]
//!
//! Both satisfy [`AggregateCounterRepository`]; callers pick one with
//! [`open_repository`] or construct it directly.

mod backend;
mod durable;
mod keyed;
mod memory;
mod repository;

pub use backend::{InMemoryBackend, KeyValueBackend, LocalFsBackend};
pub use durable::BackendCounterStore;
pub use keyed::KeyedStore;
pub use memory::AggregateCounterStore;
pub use repository::AggregateCounterRepository;

use crate::config::{BackendKind, ConfigError, CounterConfig};
use tracing::info;

/// Build the repository described by `config`
pub fn open_repository(
    config: &CounterConfig,
) -> Result<Box<dyn AggregateCounterRepository>, ConfigError> {
    config.validate()?;

    match config.backend.kind {
        BackendKind::InMemory => {
            info!(capacity = config.initial_capacity, "opening in-memory aggregate counter store");
            Ok(Box::new(AggregateCounterStore::with_config(config)))
        }
        BackendKind::LocalFs => {
            let path = config.backend.path.as_ref().ok_or_else(|| {
                ConfigError::Invalid("local_fs backend requires a path".to_string())
            })?;
            info!(path = %path.display(), "opening filesystem aggregate counter store");
            let backend = LocalFsBackend::open(path)?;
            Ok(Box::new(BackendCounterStore::new(
                backend,
                config.backend.key_prefix.clone(),
            )))
        }
    }
}
