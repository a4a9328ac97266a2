//! Runtime configuration (TOML).
//!
//! Every section is optional; missing keys take the defaults below.
//!
//! ```toml
//! [queue]
//! capacity = 32        # ring slots; at most capacity - 1 reports are buffered
//! max_report_len = 64  # larger reports are dropped
//!
//! [receiver]
//! max_devices = 3
//!
//! [requests]
//! timeout_ms = 2000
//!
//! [pool]
//! workers = 2
//!
//! [log]
//! filter = "info"
//! ```

use crate::error::ConfigError;
use crate::protocol::RECEIVER_MAX_SLOTS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub receiver: ReceiverConfig,
    pub requests: RequestConfig,
    pub pool: PoolConfig,
    pub log: LogConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub max_report_len: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 32,
            max_report_len: 64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Device count the receiver is negotiated to.
    pub max_devices: u8,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            max_devices: RECEIVER_MAX_SLOTS as u8,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub timeout_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout_ms: 2000 }
    }
}

impl RequestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { workers: 2 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `LGMUX_LOG`.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Reads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.capacity < 2 {
            return Err(ConfigError::Invalid {
                field: "queue.capacity",
                reason: format!("{} leaves no usable slot (minimum 2)", self.queue.capacity),
            });
        }
        if self.queue.max_report_len == 0 {
            return Err(ConfigError::Invalid {
                field: "queue.max_report_len",
                reason: "must be positive".to_string(),
            });
        }
        let max = self.receiver.max_devices as usize;
        if !(1..=RECEIVER_MAX_SLOTS).contains(&max) {
            return Err(ConfigError::Invalid {
                field: "receiver.max_devices",
                reason: format!("{max} outside 1..={RECEIVER_MAX_SLOTS}"),
            });
        }
        if self.pool.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "pool.workers",
                reason: "need at least one worker".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.queue.capacity, 32);
        assert_eq!(config.receiver.max_devices, 3);
        assert_eq!(config.requests.timeout(), Duration::from_secs(2));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [queue]
            capacity = 8

            [log]
            filter = "lgmux=debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.queue.capacity, 8);
        assert_eq!(config.queue.max_report_len, 64);
        assert_eq!(config.log.filter, "lgmux=debug");
        assert_eq!(config.pool.workers, 2);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = Config::from_toml_str("[receiver]\nmax_devices = 4\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "receiver.max_devices",
                ..
            }
        ));
        assert!(Config::from_toml_str("[queue]\ncapacity = 1\n").is_err());
        assert!(Config::from_toml_str("[pool]\nworkers = 0\n").is_err());
        assert!(matches!(
            Config::from_toml_str("[queue]\ncapacity = \"many\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
