//! Handler Statistics
//!
//! Counters live in atomics owned by the handler. [`HandlerStatistics`] is a
//! plain copy taken on request; it shares nothing with the live counters.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tapehouse_core::RecordKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HandlerStatistics {
    pub ingest_id: String,
    pub tickers: u64,
    pub trades: u64,
    pub book_levels: u64,
    pub raw_book_events: u64,
    pub candles: u64,
    /// Records the storage layer failed to accept
    pub errors: u64,
    /// Records handed over after stop began
    pub rejected: u64,
    /// Observer deliveries dropped on a full queue
    pub observer_dropped: u64,
    pub flushes: u64,
    pub flush_errors: u64,
    pub last_flush: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub open_segments: usize,
}

impl HandlerStatistics {
    pub fn received(&self, kind: RecordKind) -> u64 {
        match kind {
            RecordKind::Ticker => self.tickers,
            RecordKind::Trade => self.trades,
            RecordKind::BookLevel => self.book_levels,
            RecordKind::RawBookEvent => self.raw_book_events,
            RecordKind::Candle => self.candles,
        }
    }

    pub fn total_received(&self) -> u64 {
        RecordKind::ALL.iter().map(|k| self.received(*k)).sum()
    }
}

#[derive(Default)]
pub(crate) struct Counters {
    tickers: AtomicU64,
    trades: AtomicU64,
    book_levels: AtomicU64,
    raw_book_events: AtomicU64,
    candles: AtomicU64,
    pub errors: AtomicU64,
    pub rejected: AtomicU64,
    pub observer_dropped: AtomicU64,
    pub flushes: AtomicU64,
    pub flush_errors: AtomicU64,
    pub last_flush: Mutex<Option<DateTime<Utc>>>,
    pub started_at: Mutex<Option<DateTime<Utc>>>,
    pub stopped_at: Mutex<Option<DateTime<Utc>>>,
}

impl Counters {
    pub fn received(&self, kind: RecordKind) {
        let counter = match kind {
            RecordKind::Ticker => &self.tickers,
            RecordKind::Trade => &self.trades,
            RecordKind::BookLevel => &self.book_levels,
            RecordKind::RawBookEvent => &self.raw_book_events,
            RecordKind::Candle => &self.candles,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, ingest_id: &str, open_segments: usize) -> HandlerStatistics {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        HandlerStatistics {
            ingest_id: ingest_id.to_string(),
            tickers: load(&self.tickers),
            trades: load(&self.trades),
            book_levels: load(&self.book_levels),
            raw_book_events: load(&self.raw_book_events),
            candles: load(&self.candles),
            errors: load(&self.errors),
            rejected: load(&self.rejected),
            observer_dropped: load(&self.observer_dropped),
            flushes: load(&self.flushes),
            flush_errors: load(&self.flush_errors),
            last_flush: *self.last_flush.lock(),
            started_at: *self.started_at.lock(),
            stopped_at: *self.stopped_at.lock(),
            open_segments,
        }
    }
}
