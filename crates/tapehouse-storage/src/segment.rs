//! Segment
//!
//! A segment is one directory holding the files of one series for a bounded
//! span of time or bytes. It owns one [`ChannelWriter`] per (channel, symbol)
//! pair it has seen, created lazily on first write.
//!
//! ## Close Ordering
//!
//! ```text
//! close()
//!   ├─ mark closed            (new writes get SegmentClosed)
//!   ├─ close every writer     (each commits .tmp → final)
//!   ├─ stamp utc_end + files
//!   └─ write manifest.json    (atomic, only if every writer committed)
//! ```
//!
//! The manifest file list always equals the committed files in the
//! directory. If a writer fails to commit, no manifest is written and the
//! segment stays visibly incomplete.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tapehouse_core::{MarketRecord, RecordKind, SCHEMA_VERSION};

use crate::channel_writer::ChannelWriter;
use crate::config::ContainerFormat;
use crate::error::{Error, Result};
use crate::manifest::{Manifest, SegmentInfo};

/// Identity of one series: the channel a record kind is routed to plus the
/// instrument symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub channel: String,
    pub symbol: String,
}

impl SeriesKey {
    pub fn new(channel: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel, self.symbol)
    }
}

/// Everything a segment needs to know at creation time.
#[derive(Debug, Clone)]
pub struct SegmentParams {
    pub key: SeriesKey,
    pub dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub planned_end: DateTime<Utc>,
    pub bytes_target: u64,
    pub container: ContainerFormat,
    pub sync_directories: bool,
    pub exchange: String,
    pub pair_or_currency: String,
    pub conn_id: String,
    pub conf_flags: i64,
}

struct SegmentInner {
    writers: HashMap<SeriesKey, Arc<ChannelWriter>>,
    closed: bool,
}

pub struct Segment {
    params: SegmentParams,
    opened: Instant,
    size_estimate: AtomicU64,
    inner: Mutex<SegmentInner>,
}

impl Segment {
    /// Create the segment directory. Parent partitions are created as needed;
    /// the segment directory itself must not exist yet, so `AlreadyExists`
    /// tells the caller to pick another start time.
    pub fn open(params: SegmentParams) -> Result<Self> {
        if let Some(parent) = params.dir.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::SegmentDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::create_dir(&params.dir).map_err(|source| Error::SegmentDirectory {
            path: params.dir.clone(),
            source,
        })?;

        tracing::info!(
            series = %params.key,
            dir = %params.dir.display(),
            bytes_target = params.bytes_target,
            "Opened segment"
        );

        Ok(Self {
            params,
            opened: Instant::now(),
            size_estimate: AtomicU64::new(0),
            inner: Mutex::new(SegmentInner {
                writers: HashMap::new(),
                closed: false,
            }),
        })
    }

    /// Writer for `(channel, symbol)`, created on first use.
    pub fn writer_for(
        &self,
        channel: &str,
        symbol: &str,
        kind: RecordKind,
    ) -> Result<Arc<ChannelWriter>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(self.closed_error());
        }

        let key = SeriesKey::new(channel, symbol);
        if let Some(writer) = inner.writers.get(&key) {
            return Ok(Arc::clone(writer));
        }

        let writer = Arc::new(ChannelWriter::create(
            &self.params.dir,
            channel,
            symbol,
            kind,
            self.params.container,
            self.params.sync_directories,
        )?);
        inner.writers.insert(key, Arc::clone(&writer));
        Ok(writer)
    }

    /// Route one record to its writer and account for its size.
    pub fn write(&self, channel: &str, record: &MarketRecord) -> Result<()> {
        let writer = self.writer_for(channel, record.symbol(), record.kind())?;
        match writer.write_row(record) {
            Ok(()) => {}
            // The writer was closed by a concurrent segment close.
            Err(Error::WriterClosed { .. }) => return Err(self.closed_error()),
            Err(e) => return Err(e),
        }
        self.size_estimate
            .fetch_add(record.estimated_size() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Flush every writer. All writers are attempted even if some fail.
    pub fn flush(&self) -> Result<usize> {
        let writers: Vec<Arc<ChannelWriter>> = {
            let inner = self.inner.lock();
            if inner.closed {
                return Ok(0);
            }
            inner.writers.values().cloned().collect()
        };

        let mut failed = 0;
        for writer in &writers {
            if let Err(e) = writer.flush() {
                failed += 1;
                tracing::error!(
                    path = %writer.tmp_path().display(),
                    error = %e,
                    "Failed to flush channel writer"
                );
            }
        }

        if failed > 0 {
            return Err(Error::FlushFailed { failed });
        }
        Ok(writers.len())
    }

    /// Close the segment. Returns the manifest it wrote, or `None` when the
    /// segment was already closed.
    pub fn close(&self) -> Result<Option<Manifest>> {
        let mut writers: Vec<(SeriesKey, Arc<ChannelWriter>)> = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Ok(None);
            }
            inner.closed = true;
            inner.writers.drain().collect()
        };
        writers.sort_by(|a, b| a.0.cmp(&b.0));

        let mut files = Vec::with_capacity(writers.len());
        let mut first_error = None;
        for (key, writer) in writers {
            match writer.close() {
                Ok(name) => files.push(name),
                Err(e) => {
                    tracing::error!(
                        series = %key,
                        dir = %self.params.dir.display(),
                        error = %e,
                        "Failed to commit channel file"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let manifest = Manifest {
            schema_version: SCHEMA_VERSION,
            exchange: self.params.exchange.clone(),
            channel: self.params.key.channel.clone(),
            symbol: self.params.key.symbol.clone(),
            pair_or_currency: self.params.pair_or_currency.clone(),
            conn_id: self.params.conn_id.clone(),
            conf_flags: self.params.conf_flags,
            segment: SegmentInfo {
                bytes_target: self.params.bytes_target,
                utc_start: self.params.started_at,
                utc_end: Utc::now(),
                files,
            },
        };
        manifest.write_atomic(&self.params.dir, self.params.sync_directories)?;

        tracing::info!(
            series = %self.params.key,
            dir = %self.params.dir.display(),
            files = manifest.segment.files.len(),
            size_estimate = self.size_estimate(),
            "Closed segment"
        );
        Ok(Some(manifest))
    }

    fn closed_error(&self) -> Error {
        Error::SegmentClosed {
            dir: self.params.dir.clone(),
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.params.key
    }

    pub fn dir(&self) -> &Path {
        &self.params.dir
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.params.started_at
    }

    pub fn planned_end(&self) -> DateTime<Utc> {
        self.params.planned_end
    }

    pub fn size_estimate(&self) -> u64 {
        self.size_estimate.load(Ordering::Relaxed)
    }

    /// Size estimate has reached the rotation threshold.
    pub fn is_full(&self) -> bool {
        self.size_estimate() >= self.params.bytes_target
    }

    pub fn age(&self) -> Duration {
        self.opened.elapsed()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn writer_count(&self) -> usize {
        self.inner.lock().writers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::MANIFEST_FILE;
    use tapehouse_core::{Candle, RecordHeader};
    use tempfile::TempDir;

    fn params(dir: &Path) -> SegmentParams {
        let now = Utc::now();
        SegmentParams {
            key: SeriesKey::new("candles", "tBTCUSD"),
            dir: dir.join("seg=test"),
            started_at: now,
            planned_end: now + chrono::Duration::minutes(15),
            bytes_target: 1024,
            container: ContainerFormat::Stream,
            sync_directories: false,
            exchange: "bitfinex".to_string(),
            pair_or_currency: "BTCUSD".to_string(),
            conn_id: "conn-test".to_string(),
            conf_flags: 0,
        }
    }

    fn candle(tf: &str, i: i64) -> MarketRecord {
        MarketRecord::from(Candle {
            header: RecordHeader::new("tBTCUSD", "BTCUSD", None, i),
            timeframe: tf.to_string(),
            open_ts_ms: i,
            open: 1.0,
            close: 2.0,
            high: 3.0,
            low: 0.5,
            volume: 10.0,
        })
    }

    #[test]
    fn test_close_writes_manifest_matching_files() {
        let tmp = TempDir::new().unwrap();
        let segment = Segment::open(params(tmp.path())).unwrap();
        segment.write("candles", &candle("1m", 1)).unwrap();
        segment.write("candles_5m", &candle("5m", 2)).unwrap();
        assert_eq!(segment.writer_count(), 2);

        let manifest = segment.close().unwrap().unwrap();
        let mut on_disk: Vec<String> = std::fs::read_dir(segment.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n != MANIFEST_FILE)
            .collect();
        on_disk.sort();
        let mut listed = manifest.segment.files.clone();
        listed.sort();
        assert_eq!(on_disk, listed);
        assert!(on_disk.iter().all(|n| !n.ends_with(".tmp")));
        assert_eq!(manifest.conn_id, "conn-test");
        assert!(manifest.segment.utc_end >= manifest.segment.utc_start);
    }

    #[test]
    fn test_second_close_is_noop() {
        let tmp = TempDir::new().unwrap();
        let segment = Segment::open(params(tmp.path())).unwrap();
        segment.write("candles", &candle("1m", 1)).unwrap();
        assert!(segment.close().unwrap().is_some());
        assert!(segment.close().unwrap().is_none());
    }

    #[test]
    fn test_write_after_close_is_segment_closed() {
        let tmp = TempDir::new().unwrap();
        let segment = Segment::open(params(tmp.path())).unwrap();
        segment.close().unwrap();
        assert!(matches!(
            segment.write("candles", &candle("1m", 1)),
            Err(Error::SegmentClosed { .. })
        ));
    }

    #[test]
    fn test_size_estimate_drives_is_full() {
        let tmp = TempDir::new().unwrap();
        let segment = Segment::open(params(tmp.path())).unwrap();
        let record = candle("1m", 1);
        let per_record = record.estimated_size() as u64;
        let mut writes = 0;
        while !segment.is_full() {
            segment.write("candles", &record).unwrap();
            writes += 1;
        }
        assert_eq!(writes, 1024_u64.div_ceil(per_record));
    }

    #[test]
    fn test_existing_directory_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let p = params(tmp.path());
        std::fs::create_dir_all(&p.dir).unwrap();
        assert!(matches!(
            Segment::open(p),
            Err(Error::SegmentDirectory { .. })
        ));
    }
}
