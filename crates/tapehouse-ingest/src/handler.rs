//! Ingestion Handler
//!
//! Entry point for the feed client. Every record goes through [`IngestHandler::handle`]
//! (or one of the typed `handle_*` shorthands), which:
//!
//! 1. Counts the record by kind
//! 2. Offers it to registered observers (never blocks)
//! 3. Writes it through the [`SegmentManager`]
//!
//! Storage errors are logged and counted, never returned: a slow or failing
//! disk must not stall the feed client.
//!
//! ## Lifecycle
//!
//! ```text
//! new() ──► start() ──────────────────────────────► stop().await
//!              │                                       │
//!              └─ flush loop (tokio task)              ├─ refuse new records
//!                   every flush interval:              ├─ signal loop, await its current cycle
//!                     flush_all()                      ├─ drain observer queues
//!                     rotate_old_segments(max_age)     ├─ final flush
//!                                                      └─ close every segment
//! ```
//!
//! `stop()` is idempotent: a second call logs a warning and returns. Flushes
//! from the loop and from [`force_flush`](IngestHandler::force_flush) never
//! overlap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tapehouse_core::{BookLevel, Candle, MarketRecord, RawBookEvent, Ticker, Trade};
use tapehouse_storage::{EngineIdentity, SegmentManager};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::observer::{ObserverHub, RecordObserver};
use crate::statistics::{Counters, HandlerStatistics};

/// State shared with the background flush task.
struct Shared {
    manager: SegmentManager,
    counters: Counters,
    flush_gate: Mutex<()>,
}

impl Shared {
    fn flush(&self) -> Result<usize> {
        let _gate = self.flush_gate.lock();
        match self.manager.flush_all() {
            Ok(writers) => {
                self.counters.flushes.fetch_add(1, Ordering::Relaxed);
                *self.counters.last_flush.lock() = Some(Utc::now());
                Ok(writers)
            }
            Err(e) => {
                self.counters.flush_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, "Flush failed");
                Err(e.into())
            }
        }
    }

    fn rotate_aged(&self, max_age: Duration) {
        let _gate = self.flush_gate.lock();
        if let Err(e) = self.manager.rotate_old_segments(max_age) {
            tracing::error!(error = %e, "Age rotation failed");
        }
    }
}

struct FlushLoop {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct IngestHandler {
    config: IngestConfig,
    shared: Arc<Shared>,
    observers: RwLock<ObserverHub>,
    flush_loop: Mutex<Option<FlushLoop>>,
    accepting: AtomicBool,
    stopped: AtomicBool,
}

impl IngestHandler {
    pub fn new(config: IngestConfig, identity: EngineIdentity) -> Self {
        let manager = SegmentManager::new(config.storage.clone(), identity);
        Self {
            config,
            shared: Arc::new(Shared {
                manager,
                counters: Counters::default(),
                flush_gate: Mutex::new(()),
            }),
            observers: RwLock::new(ObserverHub::default()),
            flush_loop: Mutex::new(None),
            accepting: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }

    /// Register a passive observer. Its worker runs on the current tokio
    /// runtime, so this must be called from within one.
    pub fn add_observer(&self, observer: Arc<dyn RecordObserver>) -> Result<()> {
        self.observers
            .write()
            .register(observer, self.config.observer_queue_capacity)
    }

    /// Start the background flush loop and return immediately.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
        if self.stopped.load(Ordering::SeqCst) {
            tracing::warn!("start() called after stop(), ignoring");
            return Ok(());
        }

        let mut slot = self.flush_loop.lock();
        if slot.is_some() {
            tracing::warn!("Ingest handler already started");
            return Ok(());
        }

        let flush_every = self.config.flush_interval();
        let rotate_every = self.config.rotation_check_interval();
        let max_age = self.config.storage.segment_max_age();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = runtime.spawn(run_flush_loop(
            Arc::clone(&self.shared),
            flush_every,
            rotate_every,
            max_age,
            stop_rx,
        ));
        *slot = Some(FlushLoop { stop_tx, task });
        *self.shared.counters.started_at.lock() = Some(Utc::now());

        tracing::info!(
            ingest_id = %self.shared.manager.identity().ingest_id,
            flush_interval_ms = flush_every.as_millis() as u64,
            rotation_check_ms = rotate_every.as_millis() as u64,
            segment_max_age_secs = max_age.as_secs(),
            "Ingest handler started"
        );
        Ok(())
    }

    /// Count, fan out and store one record.
    pub fn handle(&self, record: impl Into<MarketRecord>) {
        let record = Arc::new(record.into());
        let counters = &self.shared.counters;

        if !self.accepting.load(Ordering::Acquire) {
            counters.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(kind = %record.kind(), "Record rejected, handler stopping");
            return;
        }
        counters.received(record.kind());

        {
            let observers = self.observers.read();
            if !observers.is_empty() {
                let dropped = observers.publish(&record);
                if dropped > 0 {
                    counters.observer_dropped.fetch_add(dropped, Ordering::Relaxed);
                }
            }
        }

        if let Err(e) = self.shared.manager.write(&record) {
            counters.errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                kind = %record.kind(),
                symbol = %record.symbol(),
                error = %e,
                "Failed to store record"
            );
        }
    }

    pub fn handle_ticker(&self, ticker: Ticker) {
        self.handle(ticker)
    }

    pub fn handle_trade(&self, trade: Trade) {
        self.handle(trade)
    }

    pub fn handle_book_level(&self, level: BookLevel) {
        self.handle(level)
    }

    pub fn handle_raw_book_event(&self, event: RawBookEvent) {
        self.handle(event)
    }

    pub fn handle_candle(&self, candle: Candle) {
        self.handle(candle)
    }

    /// Flush every open writer now, on the calling thread. Waits for an
    /// in-progress background flush first. Returns the number of writers
    /// flushed.
    pub fn force_flush(&self) -> Result<usize> {
        self.shared.flush()
    }

    /// Stop intake, finish the flush loop, flush once more and close all
    /// segments so every file is committed.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            tracing::warn!("Ingest handler already stopped");
            return Ok(());
        }
        self.accepting.store(false, Ordering::Release);
        tracing::info!("Stopping ingest handler");

        let flush_loop = self.flush_loop.lock().take();
        let loop_result = match flush_loop {
            Some(FlushLoop { stop_tx, task }) => {
                // The loop may already be gone; nothing to signal then.
                let _ = stop_tx.send(true);
                task.await.map_err(Error::from)
            }
            None => Ok(()),
        };

        let hub = std::mem::take(&mut *self.observers.write());
        hub.shutdown().await;

        let shared = Arc::clone(&self.shared);
        let (flushed, closed) = tokio::task::spawn_blocking(move || {
            let flushed = shared.flush();
            let closed = shared.manager.close().map_err(Error::from);
            (flushed, closed)
        })
        .await?;

        *self.shared.counters.stopped_at.lock() = Some(Utc::now());
        let stats = self.statistics();
        tracing::info!(
            received = stats.total_received(),
            errors = stats.errors,
            rejected = stats.rejected,
            flushes = stats.flushes,
            "Ingest handler stopped"
        );

        loop_result?;
        flushed?;
        closed?;
        Ok(())
    }

    /// Independent copy of the current counters.
    pub fn statistics(&self) -> HandlerStatistics {
        self.shared.counters.snapshot(
            &self.shared.manager.identity().ingest_id,
            self.shared.manager.open_segments(),
        )
    }

    pub fn manager(&self) -> &SegmentManager {
        &self.shared.manager
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_running(&self) -> bool {
        self.flush_loop.lock().is_some()
    }
}

async fn run_flush_loop(
    shared: Arc<Shared>,
    flush_every: Duration,
    rotate_every: Duration,
    max_age: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(flush_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;
    let mut last_rotation = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
                continue;
            }
        }

        tracing::trace!("Background flush tick");
        let rotate = last_rotation.elapsed() >= rotate_every;
        if rotate {
            last_rotation = Instant::now();
        }

        let cycle = Arc::clone(&shared);
        let result = tokio::task::spawn_blocking(move || {
            // Failures are logged and counted inside.
            let _ = cycle.flush();
            if rotate {
                cycle.rotate_aged(max_age);
            }
        })
        .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "Flush cycle panicked");
        }
    }

    tracing::debug!("Flush loop stopped");
}
