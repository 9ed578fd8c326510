//! Ingest Configuration
//!
//! - **storage**: where and how segments are written (see [`StorageConfig`])
//! - **flush_interval_ms**: background flush period; zero or negative falls
//!   back to 2 seconds
//! - **rotation_check_interval_ms**: how often the flush loop closes aged
//!   segments; unset (or non-positive) checks on every flush tick
//! - **observer_queue_capacity**: per-observer queue depth before records are
//!   dropped for that observer (default: 1024)

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tapehouse_storage::StorageConfig;

/// Flush period used when the configured one is not positive.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub storage: StorageConfig,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: i64,

    #[serde(default)]
    pub rotation_check_interval_ms: Option<i64>,

    #[serde(default = "default_observer_queue_capacity")]
    pub observer_queue_capacity: usize,
}

impl IngestConfig {
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            flush_interval_ms: default_flush_interval_ms(),
            rotation_check_interval_ms: None,
            observer_queue_capacity: default_observer_queue_capacity(),
        }
    }

    pub fn flush_interval(&self) -> Duration {
        positive_millis(self.flush_interval_ms).unwrap_or(DEFAULT_FLUSH_INTERVAL)
    }

    pub fn rotation_check_interval(&self) -> Duration {
        self.rotation_check_interval_ms
            .and_then(positive_millis)
            .unwrap_or_else(|| self.flush_interval())
    }
}

fn positive_millis(ms: i64) -> Option<Duration> {
    u64::try_from(ms)
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

fn default_flush_interval_ms() -> i64 {
    2_000
}

fn default_observer_queue_capacity() -> usize {
    1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_positive_interval_falls_back() {
        let mut config = IngestConfig::new(StorageConfig::default());
        config.flush_interval_ms = 0;
        assert_eq!(config.flush_interval(), DEFAULT_FLUSH_INTERVAL);
        config.flush_interval_ms = -5;
        assert_eq!(config.flush_interval(), DEFAULT_FLUSH_INTERVAL);
        config.flush_interval_ms = 250;
        assert_eq!(config.flush_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_rotation_check_defaults_to_flush_tick() {
        let mut config = IngestConfig::new(StorageConfig::default());
        config.flush_interval_ms = 500;
        assert_eq!(config.rotation_check_interval(), Duration::from_millis(500));
        config.rotation_check_interval_ms = Some(60_000);
        assert_eq!(config.rotation_check_interval(), Duration::from_secs(60));
        config.rotation_check_interval_ms = Some(0);
        assert_eq!(config.rotation_check_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: IngestConfig =
            serde_json::from_str(r#"{"storage": {"base_dir": "/data"}}"#).unwrap();
        assert_eq!(config.flush_interval_ms, 2_000);
        assert_eq!(config.observer_queue_capacity, 1024);
        assert!(config.rotation_check_interval_ms.is_none());
    }
}
