//! Segment Manifest
//!
//! `manifest.json` describes one closed segment: which series it belongs to,
//! which connection produced it, and the exact list of data files committed
//! inside it. It is written once, when the segment closes, through the same
//! temp → rename commit as the data files. A segment directory without a
//! manifest never closed cleanly.
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "exchange": "bitfinex",
//!   "channel": "trades",
//!   "symbol": "tBTCUSD",
//!   "pair_or_currency": "BTCUSD",
//!   "conn_id": "2b0c…",
//!   "conf_flags": 0,
//!   "segment": {
//!     "bytes_target": 268435456,
//!     "utc_start": "2024-03-05T07:30:15.042Z",
//!     "utc_end": "2024-03-05T07:41:02.118Z",
//!     "files": ["part-trades-tBTCUSD-20240305T073015.043Z-seq.arrow"]
//!   }
//! }
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::commit::commit_rename;
use crate::error::{Error, Result};
use crate::layout::{tmp_path, MANIFEST_FILE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub exchange: String,
    pub channel: String,
    pub symbol: String,
    pub pair_or_currency: String,
    pub conn_id: String,
    pub conf_flags: i64,
    pub segment: SegmentInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub bytes_target: u64,
    pub utc_start: DateTime<Utc>,
    pub utc_end: DateTime<Utc>,
    /// Committed data file names, relative to the segment directory
    pub files: Vec<String>,
}

impl Manifest {
    /// Write `manifest.json` into `dir` atomically. Returns the final path.
    pub fn write_atomic(&self, dir: &Path, sync_directory: bool) -> Result<PathBuf> {
        let final_path = dir.join(MANIFEST_FILE);
        let tmp = tmp_path(&final_path);

        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        let file = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        commit_rename(&tmp, &final_path, sync_directory)?;
        Ok(final_path)
    }

    /// Load the manifest of a segment directory.
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound { path: path.clone() },
            _ => Error::Io(e),
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
