//! Storage Configuration
//!
//! This module defines configuration for the write path.
//!
//! ## StorageConfig
//!
//! Controls where segments live and when they are rotated:
//!
//! - **base_dir**: Root of the on-disk tree
//! - **exchange** / **source**: First two path components under `base_dir`
//! - **segment_max_size_mb**: Rotate a segment once its size estimate reaches this (default: 256MB)
//! - **segment_max_age_secs**: Age-based sweep threshold (default: 15 minutes)
//! - **container**: Arrow IPC stream (default) or indexed file format
//! - **conf_flags**: Feed configuration flags recorded in each manifest
//! - **sync_directories**: fsync the parent directory after each commit rename (default: true)
//!
//! ## EngineIdentity
//!
//! Who is writing: `conn_id` goes into every manifest, `ingest_id` tags log
//! lines and statistics. Passed in explicitly, so several engines can run in
//! one process.
//!
//! ## Usage
//!
//! ```
//! use tapehouse_storage::{ContainerFormat, StorageConfig};
//!
//! let config = StorageConfig {
//!     exchange: "bitfinex".to_string(),
//!     segment_max_size_mb: 1, // rotate often in tests
//!     container: ContainerFormat::File,
//!     ..StorageConfig::new("/tmp/tapehouse")
//! };
//! assert_eq!(config.segment_max_bytes(), 1024 * 1024);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Arrow IPC container written by channel writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// Sequential stream format: batches are readable in order only
    #[default]
    Stream,
    /// Indexed file format: footer lists every batch for random access
    File,
}

impl ContainerFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerFormat::Stream => "stream",
            ContainerFormat::File => "file",
        }
    }
}

/// Identity of one running ingest engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineIdentity {
    /// Feed connection id, recorded in manifests
    pub conn_id: String,
    /// Ingest process id, for correlating logs
    pub ingest_id: String,
}

impl EngineIdentity {
    pub fn new(conn_id: impl Into<String>, ingest_id: impl Into<String>) -> Self {
        Self {
            conn_id: conn_id.into(),
            ingest_id: ingest_id.into(),
        }
    }

    /// Fresh random ids (UUID v4) for both fields.
    pub fn generate() -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            uuid::Uuid::new_v4().to_string(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the segment tree
    pub base_dir: PathBuf,

    /// Exchange name, first path component (default: "exchange")
    #[serde(default = "default_exchange")]
    pub exchange: String,

    /// Source type, second path component (default: "ws")
    #[serde(default = "default_source")]
    pub source: String,

    /// Segment size threshold in megabytes (default: 256)
    #[serde(default = "default_segment_max_size_mb")]
    pub segment_max_size_mb: u64,

    /// Maximum segment age in seconds before the sweep closes it (default: 900)
    #[serde(default = "default_segment_max_age_secs")]
    pub segment_max_age_secs: u64,

    /// IPC container for new files (default: stream)
    #[serde(default)]
    pub container: ContainerFormat,

    /// Feed configuration flags, copied into manifests
    #[serde(default)]
    pub conf_flags: i64,

    /// fsync parent directories after renames (default: true)
    #[serde(default = "default_sync_directories")]
    pub sync_directories: bool,
}

impl StorageConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            exchange: default_exchange(),
            source: default_source(),
            segment_max_size_mb: default_segment_max_size_mb(),
            segment_max_age_secs: default_segment_max_age_secs(),
            container: ContainerFormat::default(),
            conf_flags: 0,
            sync_directories: default_sync_directories(),
        }
    }

    pub fn segment_max_bytes(&self) -> u64 {
        self.segment_max_size_mb.max(1) * 1024 * 1024
    }

    pub fn segment_max_age(&self) -> Duration {
        Duration::from_secs(self.segment_max_age_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new("./data")
    }
}

fn default_exchange() -> String {
    "exchange".to_string()
}

fn default_source() -> String {
    "ws".to_string()
}

fn default_segment_max_size_mb() -> u64 {
    256
}

fn default_segment_max_age_secs() -> u64 {
    15 * 60 // 15 minutes
}

fn default_sync_directories() -> bool {
    true
}
