//! Store configuration
//!
//! Loaded from TOML, with optional environment overrides:
//! - `AGGREGATE_COUNTER_INITIAL_CAPACITY`: expected number of counters
//! - `AGGREGATE_COUNTER_SHARDS`: map shard count (power of two > 1)
//! - `AGGREGATE_COUNTER_BACKEND`: `in_memory` or `local_fs`
//! - `AGGREGATE_COUNTER_PATH`: directory for the `local_fs` backend
//! - `AGGREGATE_COUNTER_KEY_PREFIX`: key prefix for durable backends
//!
//! ```toml
//! initial_capacity = 1024
//! shard_amount = 16
//!
//! [backend]
//! kind = "local_fs"
//! path = "/var/lib/counters"
//! key_prefix = "clicks"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for an aggregate counter store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    /// Expected number of distinct counters (default: 64)
    pub initial_capacity: usize,
    /// Concurrent map shard count; `None` uses the map's default
    pub shard_amount: Option<usize>,
    /// Where counter state lives
    pub backend: BackendConfig,
}

impl Default for CounterConfig {
    fn default() -> Self {
        CounterConfig {
            initial_capacity: 64,
            shard_amount: None,
            backend: BackendConfig::default(),
        }
    }
}

/// Backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Directory for the `local_fs` backend
    pub path: Option<PathBuf>,
    /// Prefix for keys written to durable backends (default: aggregate-counter)
    pub key_prefix: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            kind: BackendKind::InMemory,
            path: None,
            key_prefix: "aggregate-counter".to_string(),
        }
    }
}

/// Type of counter backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Process-local map (state is lost on exit)
    InMemory,
    /// One file per counter under `path`
    LocalFs,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in_memory" | "memory" => Ok(BackendKind::InMemory),
            "local_fs" | "fs" => Ok(BackendKind::LocalFs),
            other => Err(ConfigError::Invalid(format!("unknown backend: {}", other))),
        }
    }
}

/// Error type for configuration loading
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read, or backend directory not created
    Io(std::io::Error),
    /// TOML did not parse
    Parse(String),
    /// Values parsed but do not make sense together
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {}", e),
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

impl CounterConfig {
    /// Parse from a TOML document; missing fields take defaults
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: CounterConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = CounterConfig::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay any `AGGREGATE_COUNTER_*` variables onto this config
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("AGGREGATE_COUNTER_INITIAL_CAPACITY") {
            self.initial_capacity = v.parse().map_err(|_| {
                ConfigError::Invalid(format!("AGGREGATE_COUNTER_INITIAL_CAPACITY: {}", v))
            })?;
        }
        if let Some(v) = lookup("AGGREGATE_COUNTER_SHARDS") {
            let shards = v
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("AGGREGATE_COUNTER_SHARDS: {}", v)))?;
            self.shard_amount = Some(shards);
        }
        if let Some(v) = lookup("AGGREGATE_COUNTER_BACKEND") {
            self.backend.kind = v.parse()?;
        }
        if let Some(v) = lookup("AGGREGATE_COUNTER_PATH") {
            self.backend.path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("AGGREGATE_COUNTER_KEY_PREFIX") {
            self.backend.key_prefix = v;
        }
        Ok(())
    }

    /// Reject combinations the stores cannot honor
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(shards) = self.shard_amount {
            if shards < 2 || !shards.is_power_of_two() {
                return Err(ConfigError::Invalid(format!(
                    "shard_amount must be a power of two greater than 1, got {}",
                    shards
                )));
            }
        }
        if self.backend.kind == BackendKind::LocalFs && self.backend.path.is_none() {
            return Err(ConfigError::Invalid(
                "local_fs backend requires a path".to_string(),
            ));
        }
        if self.backend.key_prefix.is_empty() {
            return Err(ConfigError::Invalid("key_prefix must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = CounterConfig::default();
        assert_eq!(config.initial_capacity, 64);
        assert_eq!(config.shard_amount, None);
        assert_eq!(config.backend.kind, BackendKind::InMemory);
        assert_eq!(config.backend.key_prefix, "aggregate-counter");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = CounterConfig::from_toml_str(
            r#"
            initial_capacity = 1024
            shard_amount = 16

            [backend]
            kind = "local_fs"
            path = "/tmp/counters"
            "#,
        )
        .unwrap();

        assert_eq!(config.initial_capacity, 1024);
        assert_eq!(config.shard_amount, Some(16));
        assert_eq!(config.backend.kind, BackendKind::LocalFs);
        assert_eq!(config.backend.path, Some(PathBuf::from("/tmp/counters")));
        assert_eq!(config.backend.key_prefix, "aggregate-counter");
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(CounterConfig::from_toml_str("").unwrap(), CounterConfig::default());
    }

    #[test]
    fn test_toml_parse_error() {
        assert!(matches!(
            CounterConfig::from_toml_str("initial_capacity = \"lots\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_shards() {
        for shards in [0, 1, 3, 12] {
            let config = CounterConfig {
                shard_amount: Some(shards),
                ..CounterConfig::default()
            };
            assert!(config.validate().is_err(), "shards {} accepted", shards);
        }
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("AGGREGATE_COUNTER_SHARDS", "32"),
            ("AGGREGATE_COUNTER_BACKEND", "local_fs"),
            ("AGGREGATE_COUNTER_PATH", "/data"),
            ("AGGREGATE_COUNTER_KEY_PREFIX", "hits"),
        ]
        .into_iter()
        .collect();

        let mut config = CounterConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.shard_amount, Some(32));
        assert_eq!(config.backend.kind, BackendKind::LocalFs);
        assert_eq!(config.backend.path, Some(PathBuf::from("/data")));
        assert_eq!(config.backend.key_prefix, "hits");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_override_rejects_garbage() {
        let mut config = CounterConfig::default();
        let result = config.apply_overrides(|k| {
            (k == "AGGREGATE_COUNTER_INITIAL_CAPACITY").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.toml");
        std::fs::write(&path, "initial_capacity = 8\n").unwrap();

        assert_eq!(CounterConfig::load(&path).unwrap().initial_capacity, 8);
        assert!(matches!(
            CounterConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
