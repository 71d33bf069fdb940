//! Configuration management
//!
//! Defaults, then an optional TOML file, then `RINGCORE__*` environment
//! variables (`RINGCORE__SERVICE__QUEUE_CAPACITY=64`).

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub history: HistoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Depth of the serialized task queue
    pub queue_capacity: usize,
    /// Buffered service events per subscriber
    pub event_capacity: usize,
    /// Upper bound the worker waits on the history store
    pub history_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            event_capacity: 256,
            history_timeout_ms: 2000,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_entries: 500 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration, layering an optional file and the environment
    /// over the defaults
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }

        builder
            .add_source(config::Environment::with_prefix("RINGCORE").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.service.queue_capacity, 1000);
        assert_eq!(config.history.max_entries, 500);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.service, ServiceConfig::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!("ringcore-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[service]\nqueue_capacity = 8\n\n[history]\nmax_entries = 3").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.service.queue_capacity, 8);
        assert_eq!(config.service.history_timeout_ms, 2000);
        assert_eq!(config.history.max_entries, 3);
    }
}
