//! Observer Fan-Out
//!
//! Passive consumers (a live view, a metrics tap) can watch the record stream
//! without touching the write path. Each observer gets its own bounded queue
//! drained by its own task:
//!
//! ```text
//! handle() ──try_send──► [queue: capacity N] ──► task ──► observer.on_record()
//!          ──try_send──► [queue: capacity N] ──► task ──► observer.on_record()
//! ```
//!
//! `try_send` never waits. When a queue is full the record is dropped for
//! that observer only and counted in `observer_dropped`.

use std::sync::Arc;

use async_trait::async_trait;
use tapehouse_core::MarketRecord;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

#[async_trait]
pub trait RecordObserver: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn on_record(&self, record: Arc<MarketRecord>);
}

struct ObserverWorker {
    name: String,
    tx: mpsc::Sender<Arc<MarketRecord>>,
    task: JoinHandle<()>,
}

#[derive(Default)]
pub(crate) struct ObserverHub {
    workers: Vec<ObserverWorker>,
}

impl ObserverHub {
    /// Spawn the worker task for `observer` on the current runtime.
    pub fn register(&mut self, observer: Arc<dyn RecordObserver>, capacity: usize) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let (tx, mut rx) = mpsc::channel::<Arc<MarketRecord>>(capacity.max(1));
        let name = observer.name().to_string();

        let task = runtime.spawn(async move {
            while let Some(record) = rx.recv().await {
                observer.on_record(record).await;
            }
        });

        tracing::info!(observer = %name, capacity, "Registered record observer");
        self.workers.push(ObserverWorker { name, tx, task });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Offer `record` to every observer. Returns how many deliveries were
    /// dropped.
    pub fn publish(&self, record: &Arc<MarketRecord>) -> u64 {
        let mut dropped = 0;
        for worker in &self.workers {
            match worker.tx.try_send(Arc::clone(record)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    tracing::warn!(
                        observer = %worker.name,
                        kind = %record.kind(),
                        symbol = %record.symbol(),
                        "Observer queue full, dropping record"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    dropped += 1;
                    tracing::warn!(observer = %worker.name, "Observer task has exited");
                }
            }
        }
        dropped
    }

    /// Close every queue and wait for the workers to drain what is left.
    pub async fn shutdown(self) {
        for ObserverWorker { name, tx, task } in self.workers {
            drop(tx);
            if let Err(e) = task.await {
                tracing::error!(observer = %name, error = %e, "Observer task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tapehouse_core::{Candle, RecordHeader};

    struct Counting(AtomicUsize);

    #[async_trait]
    impl RecordObserver for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn on_record(&self, _record: Arc<MarketRecord>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn candle() -> Arc<MarketRecord> {
        Arc::new(MarketRecord::from(Candle {
            header: RecordHeader::new("tBTCUSD", "BTCUSD", None, 0),
            timeframe: "1m".to_string(),
            open_ts_ms: 0,
            open: 1.0,
            close: 1.0,
            high: 1.0,
            low: 1.0,
            volume: 1.0,
        }))
    }

    #[test]
    fn test_register_needs_runtime() {
        let mut hub = ObserverHub::default();
        let observer = Arc::new(Counting(AtomicUsize::new(0)));
        assert!(matches!(hub.register(observer, 8), Err(Error::NoRuntime)));
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let mut hub = ObserverHub::default();
        let observer = Arc::new(Counting(AtomicUsize::new(0)));
        hub.register(observer.clone(), 64).unwrap();

        for _ in 0..10 {
            assert_eq!(hub.publish(&candle()), 0);
        }
        hub.shutdown().await;
        assert_eq!(observer.0.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let mut hub = ObserverHub::default();
        let observer = Arc::new(Counting(AtomicUsize::new(0)));
        hub.register(observer.clone(), 1).unwrap();

        // Current-thread runtime: the worker cannot run until we yield, so
        // the second offer finds the queue full.
        assert_eq!(hub.publish(&candle()), 0);
        assert_eq!(hub.publish(&candle()), 1);

        hub.shutdown().await;
        assert_eq!(observer.0.load(Ordering::SeqCst), 1);
    }
}
