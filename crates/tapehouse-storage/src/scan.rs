//! Data File Discovery
//!
//! Walks a directory tree and lists committed data files with the partition
//! facts recoverable from their paths. In-progress `.tmp` files and manifests
//! are skipped. Unreadable subdirectories are logged and skipped so one bad
//! directory does not hide the rest of the tree.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::layout::{is_data_file_name, PathInfo};

#[derive(Debug, Clone, Serialize)]
pub struct DataFileInfo {
    pub path: PathBuf,
    /// Path relative to the scan root
    pub relative_path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
    pub exchange: Option<String>,
    pub source: Option<String>,
    pub channel: Option<String>,
    pub symbol: Option<String>,
    pub date: Option<NaiveDate>,
    pub hour: Option<u32>,
    pub segment: Option<String>,
}

/// List every committed data file under `root`, sorted by path.
pub fn scan_data_files(root: &Path) -> Result<Vec<DataFileInfo>> {
    let meta = std::fs::metadata(root).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound {
            path: root.to_path_buf(),
        },
        _ => Error::Io(e),
    })?;
    if !meta.is_dir() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a directory", root.display()),
        )));
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping entry");
                    continue;
                }
            };

            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !is_data_file_name(&file_name) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping file");
                    continue;
                }
            };

            let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            let info = PathInfo::parse(&relative_path);
            files.push(DataFileInfo {
                relative_path,
                file_name,
                size_bytes: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                exchange: info.exchange,
                source: info.source,
                channel: info.channel,
                symbol: info.symbol,
                date: info.date,
                hour: info.hour,
                segment: info.segment,
                path,
            });
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!(root = %root.display(), files = files.len(), "Scanned data files");
    Ok(files)
}
