//! Segment Manager
//!
//! Top-level coordinator of the write path. Routes each record to the
//! current segment of its series and rotates segments by size and age.
//!
//! ## Architecture
//!
//! ```text
//! SegmentManager
//!     │  RwLock<HashMap<SeriesKey, SeriesSlot>>   (fast reads, rare inserts)
//!     │
//!     ├─ trades/tBTCUSD ─ Mutex<current Segment>
//!     │                     ├─ ChannelWriter(trades, tBTCUSD)
//!     │                     └─ manifest.json on close
//!     │
//!     └─ book/tETHUSD   ─ Mutex<current Segment>
//! ```
//!
//! ## Thread Safety
//!
//! - The slot map lock is only held to find or insert a slot
//! - Rotation happens under that series' slot lock only, so other series
//!   keep writing: the full segment is closed first, then the next one is
//!   opened with a start no earlier than the old manifest's `utc_end`
//! - Age sweeps and `close()` drain segments out of their slots and close
//!   them after every lock has been released
//! - A write that raced with rotation sees `SegmentClosed` and retries
//!   against the fresh segment
//!
//! ## Identity
//!
//! The [`EngineIdentity`] is passed in by the owner; its connection id goes
//! into every manifest. Two managers in one process (as in tests) never share
//! state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tapehouse_core::MarketRecord;

use crate::config::{EngineIdentity, StorageConfig};
use crate::error::{Error, Result};
use crate::layout::{segment_dir, series_dir};
use crate::segment::{Segment, SegmentParams, SeriesKey};

/// Attempts for one write when it keeps racing with rotation.
const WRITE_ATTEMPTS: usize = 3;

/// Start-time bumps tried when a segment directory already exists.
const OPEN_ATTEMPTS: usize = 16;

#[derive(Default)]
struct SlotState {
    current: Option<Arc<Segment>>,
    last_start: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct SeriesSlot {
    state: Mutex<SlotState>,
}

pub struct SegmentManager {
    config: StorageConfig,
    identity: EngineIdentity,
    slots: RwLock<HashMap<SeriesKey, Arc<SeriesSlot>>>,
    closed: AtomicBool,
    rotation_failures: AtomicU64,
}

impl SegmentManager {
    pub fn new(config: StorageConfig, identity: EngineIdentity) -> Self {
        tracing::info!(
            base_dir = %config.base_dir.display(),
            exchange = %config.exchange,
            source = %config.source,
            segment_max_size_mb = config.segment_max_size_mb,
            container = config.container.as_str(),
            conn_id = %identity.conn_id,
            ingest_id = %identity.ingest_id,
            "Segment manager started"
        );
        Self {
            config,
            identity,
            slots: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            rotation_failures: AtomicU64::new(0),
        }
    }

    /// Write a record to the default channel of its kind.
    pub fn write(&self, record: &MarketRecord) -> Result<()> {
        self.write_to(record.kind().default_channel(), record)
    }

    /// Write a record to an explicit channel.
    pub fn write_to(&self, channel: &str, record: &MarketRecord) -> Result<()> {
        let mut attempt = 1;
        loop {
            let segment = self.segment_for(channel, record)?;
            match segment.write(channel, record) {
                Err(Error::SegmentClosed { dir }) if attempt < WRITE_ATTEMPTS => {
                    tracing::debug!(
                        dir = %dir.display(),
                        attempt,
                        "Write raced with segment rotation, retrying"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Current writable segment for the record's series. A missing, closed or
    /// full segment is replaced by a new one; the replaced segment is closed
    /// before its successor is opened.
    pub fn segment_for(&self, channel: &str, record: &MarketRecord) -> Result<Arc<Segment>> {
        if self.is_closed() {
            return Err(Error::StorageClosed);
        }
        let key = SeriesKey::new(channel, record.symbol());
        let slot = self.slot(&key);

        let mut state = slot.state.lock();
        if let Some(segment) = &state.current {
            if !segment.is_closed() && !segment.is_full() {
                return Ok(Arc::clone(segment));
            }
        }
        // Checked under the slot lock so close() cannot miss a segment.
        if self.is_closed() {
            return Err(Error::StorageClosed);
        }

        if let Some(old) = state.current.take() {
            self.retire(&old);
        }
        let segment = self.open_segment(&key, record, &mut state.last_start)?;
        state.current = Some(Arc::clone(&segment));
        Ok(segment)
    }

    fn slot(&self, key: &SeriesKey) -> Arc<SeriesSlot> {
        if let Some(slot) = self.slots.read().get(key) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    fn open_segment(
        &self,
        key: &SeriesKey,
        record: &MarketRecord,
        last_start: &mut Option<DateTime<Utc>>,
    ) -> Result<Arc<Segment>> {
        let series = series_dir(
            &self.config.base_dir,
            &self.config.exchange,
            &self.config.source,
            &key.channel,
            &key.symbol,
        );
        let max_age = chrono::Duration::from_std(self.config.segment_max_age())
            .unwrap_or_else(|_| chrono::Duration::minutes(15));

        let mut start = next_start(*last_start, Utc::now());
        let mut attempt = 1;
        loop {
            let planned_end = start + max_age;
            let params = SegmentParams {
                key: key.clone(),
                dir: segment_dir(&series, start, planned_end, self.config.segment_max_size_mb),
                started_at: start,
                planned_end,
                bytes_target: self.config.segment_max_bytes(),
                container: self.config.container,
                sync_directories: self.config.sync_directories,
                exchange: self.config.exchange.clone(),
                pair_or_currency: record.header().pair_or_currency.clone(),
                conn_id: self.identity.conn_id.clone(),
                conf_flags: self.config.conf_flags,
            };

            match Segment::open(params) {
                Ok(segment) => {
                    *last_start = Some(start);
                    return Ok(Arc::new(segment));
                }
                Err(Error::SegmentDirectory { source, .. })
                    if source.kind() == std::io::ErrorKind::AlreadyExists
                        && attempt < OPEN_ATTEMPTS =>
                {
                    start += chrono::Duration::milliseconds(1);
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(series = %key, error = %e, "Failed to open segment");
                    return Err(e);
                }
            }
        }
    }

    fn retire(&self, segment: &Segment) {
        if let Err(e) = segment.close() {
            self.rotation_failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                series = %segment.key(),
                dir = %segment.dir().display(),
                error = %e,
                "Failed to close rotated segment"
            );
        }
    }

    fn current_segments(&self) -> Vec<Arc<Segment>> {
        let slots: Vec<Arc<SeriesSlot>> = self.slots.read().values().cloned().collect();
        slots
            .iter()
            .filter_map(|slot| slot.state.lock().current.clone())
            .collect()
    }

    /// Drain segments matching `pred` out of their slots.
    fn take_segments(&self, pred: impl Fn(&Segment) -> bool) -> Vec<Arc<Segment>> {
        let slots: Vec<Arc<SeriesSlot>> = self.slots.read().values().cloned().collect();
        slots
            .iter()
            .filter_map(|slot| {
                let mut state = slot.state.lock();
                if state.current.as_deref().is_some_and(|segment| pred(segment)) {
                    state.current.take()
                } else {
                    None
                }
            })
            .collect()
    }

    /// Flush every open segment. All segments are attempted; the number of
    /// failed writers is reported in aggregate.
    pub fn flush_all(&self) -> Result<usize> {
        let segments = self.current_segments();
        let mut flushed = 0;
        let mut failed = 0;
        for segment in &segments {
            match segment.flush() {
                Ok(n) => flushed += n,
                Err(Error::FlushFailed { failed: n }) => failed += n,
                Err(e) => {
                    failed += 1;
                    tracing::error!(series = %segment.key(), error = %e, "Segment flush failed");
                }
            }
        }

        if failed > 0 {
            return Err(Error::FlushFailed { failed });
        }
        tracing::debug!(segments = segments.len(), writers = flushed, "Flushed all segments");
        Ok(flushed)
    }

    /// Close segments whose age has reached `max_age`. Returns how many were
    /// closed. The next write for those series opens a fresh segment.
    pub fn rotate_old_segments(&self, max_age: Duration) -> Result<usize> {
        let aged = self.take_segments(|segment| segment.age() >= max_age);
        if !aged.is_empty() {
            tracing::info!(segments = aged.len(), "Rotating aged segments");
        }
        close_each(&aged)
    }

    /// Close every open segment and refuse further writes. Calling it again
    /// closes nothing and succeeds.
    pub fn close(&self) -> Result<usize> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(0);
        }
        let segments = self.take_segments(|_| true);
        let closed = close_each(&segments);
        tracing::info!(
            segments = segments.len(),
            ingest_id = %self.identity.ingest_id,
            "Segment manager closed"
        );
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn open_segments(&self) -> usize {
        self.current_segments()
            .iter()
            .filter(|segment| !segment.is_closed())
            .count()
    }

    /// Rotated segments whose close failed since startup.
    pub fn rotation_failures(&self) -> u64 {
        self.rotation_failures.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn identity(&self) -> &EngineIdentity {
        &self.identity
    }
}

/// Start time for a new segment of a series: `now` rounded up to the next
/// millisecond, and always at least 1ms after the previous segment's start.
fn next_start(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = DateTime::<Utc>::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
    let now_ms = if floor < now {
        floor + chrono::Duration::milliseconds(1)
    } else {
        floor
    };
    match last {
        Some(prev) if now_ms <= prev => prev + chrono::Duration::milliseconds(1),
        _ => now_ms,
    }
}

fn close_each(segments: &[Arc<Segment>]) -> Result<usize> {
    let mut closed = 0;
    let mut failed = 0;
    let mut first = None;
    for segment in segments {
        match segment.close() {
            Ok(_) => closed += 1,
            Err(e) => {
                failed += 1;
                tracing::error!(
                    series = %segment.key(),
                    dir = %segment.dir().display(),
                    error = %e,
                    "Failed to close segment"
                );
                first.get_or_insert(e);
            }
        }
    }

    match first {
        Some(first) => Err(Error::CloseFailed {
            failed,
            first: Box::new(first),
        }),
        None => Ok(closed),
    }
}
