//! Integration tests for the ingestion handler lifecycle

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tapehouse_core::{
    BookLevel, BookOp, Candle, MarketRecord, RawBookEvent, RecordHeader, Side, Ticker, Trade,
};
use tapehouse_ingest::{Error, IngestConfig, IngestHandler, RecordObserver};
use tapehouse_storage::layout::TMP_SUFFIX;
use tapehouse_storage::{read_file_summary, scan_data_files, EngineIdentity, StorageConfig};
use tempfile::TempDir;

fn header(symbol: &str, i: i64) -> RecordHeader {
    RecordHeader::new(symbol, &symbol[1..], Some(i), 1_700_000_000_000_000 + i)
}

fn trade(symbol: &str, i: i64) -> Trade {
    Trade {
        header: header(symbol, i),
        trade_id: i,
        exchange_ts_ms: Some(1_700_000_000_000 + i),
        price: 37_000.0 + i as f64,
        amount: 0.01,
        side: Side::Buy,
    }
}

fn ticker(symbol: &str, i: i64) -> Ticker {
    Ticker {
        header: header(symbol, i),
        bid: 1.0,
        bid_size: 2.0,
        ask: 1.1,
        ask_size: 3.0,
        last_price: 1.05,
        volume: 1_000.0,
        high: 1.2,
        low: 0.9,
        daily_change: 0.01,
        daily_change_pct: 0.001,
    }
}

fn config(dir: &TempDir) -> IngestConfig {
    let storage = StorageConfig {
        exchange: "bitfinex".to_string(),
        sync_directories: false,
        ..StorageConfig::new(dir.path())
    };
    IngestConfig {
        flush_interval_ms: 20,
        ..IngestConfig::new(storage)
    }
}

fn handler(dir: &TempDir) -> IngestHandler {
    IngestHandler::new(config(dir), EngineIdentity::new("conn-test", "ingest-test"))
}

fn committed_rows(dir: &TempDir) -> usize {
    scan_data_files(dir.path())
        .unwrap()
        .iter()
        .map(|f| read_file_summary(&f.path).unwrap().total_rows)
        .sum()
}

fn tmp_files(dir: &TempDir) -> usize {
    let mut count = 0;
    let mut pending = vec![dir.path().to_path_buf()];
    while let Some(d) = pending.pop() {
        for entry in std::fs::read_dir(&d).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else if path.to_string_lossy().ends_with(TMP_SUFFIX) {
                count += 1;
            }
        }
    }
    count
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_every_kind_is_counted_and_committed() {
    let dir = TempDir::new().unwrap();
    let handler = handler(&dir);
    handler.start().unwrap();

    for i in 0..150 {
        handler.handle_trade(trade("tBTCUSD", i));
        handler.handle_ticker(ticker("tBTCUSD", i));
    }
    handler.handle_book_level(BookLevel {
        header: header("tBTCUSD", 1),
        price: 37_000.0,
        count: 3,
        amount: -1.5,
        side: Side::from_amount(-1.5),
        is_snapshot: true,
    });
    handler.handle_raw_book_event(RawBookEvent {
        header: header("tBTCUSD", 2),
        order_id: 123_456,
        price: 0.0,
        amount: 1.0,
        op: BookOp::Delete,
        side: Side::Buy,
        is_snapshot: false,
    });
    handler.handle_candle(Candle {
        header: header("tBTCUSD", 3),
        timeframe: "1m".to_string(),
        open_ts_ms: 1_700_000_000_000,
        open: 1.0,
        close: 2.0,
        high: 2.5,
        low: 0.5,
        volume: 10.0,
    });

    handler.stop().await.unwrap();

    let stats = handler.statistics();
    assert_eq!(stats.trades, 150);
    assert_eq!(stats.tickers, 150);
    assert_eq!(stats.book_levels, 1);
    assert_eq!(stats.raw_book_events, 1);
    assert_eq!(stats.candles, 1);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.ingest_id, "ingest-test");
    assert!(stats.started_at.is_some());
    assert!(stats.stopped_at.is_some());
    assert_eq!(stats.open_segments, 0);

    assert_eq!(committed_rows(&dir), 303);
    assert_eq!(tmp_files(&dir), 0);

    let channels: std::collections::BTreeSet<String> = scan_data_files(dir.path())
        .unwrap()
        .into_iter()
        .filter_map(|f| f.channel)
        .collect();
    let expected: std::collections::BTreeSet<String> = ["book", "candles", "raw_book", "ticker", "trades"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(channels, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_double_stop_is_safe() {
    let dir = TempDir::new().unwrap();
    let handler = handler(&dir);
    handler.start().unwrap();
    handler.handle_trade(trade("tBTCUSD", 1));

    handler.stop().await.unwrap();
    let files_after_first = scan_data_files(dir.path()).unwrap().len();
    handler.stop().await.unwrap();

    assert_eq!(scan_data_files(dir.path()).unwrap().len(), files_after_first);
    assert_eq!(committed_rows(&dir), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_records_after_stop_are_rejected() {
    let dir = TempDir::new().unwrap();
    let handler = handler(&dir);
    handler.start().unwrap();
    handler.handle_trade(trade("tBTCUSD", 1));
    handler.stop().await.unwrap();

    handler.handle_trade(trade("tBTCUSD", 2));
    handler.handle_trade(trade("tBTCUSD", 3));

    let stats = handler.statistics();
    assert_eq!(stats.trades, 1);
    assert_eq!(stats.rejected, 2);
    assert_eq!(stats.errors, 0);
    assert_eq!(committed_rows(&dir), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_without_start() {
    let dir = TempDir::new().unwrap();
    let handler = handler(&dir);
    handler.handle_trade(trade("tBTCUSD", 1));
    handler.stop().await.unwrap();
    assert_eq!(committed_rows(&dir), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_loop_flushes() {
    let dir = TempDir::new().unwrap();
    let handler = handler(&dir);
    handler.start().unwrap();
    assert!(handler.is_running());

    for i in 0..5 {
        handler.handle_trade(trade("tBTCUSD", i));
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats = handler.statistics();
    assert!(stats.flushes >= 1, "no background flush after 200ms");
    assert!(stats.last_flush.is_some());
    handler.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_age_rotation_commits_without_stop() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.storage.segment_max_age_secs = 0;
    let handler = IngestHandler::new(config, EngineIdentity::new("conn", "ingest"));
    handler.start().unwrap();

    for i in 0..10 {
        handler.handle_trade(trade("tBTCUSD", i));
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Aged segments were closed by the loop, so files are already visible.
    assert_eq!(committed_rows(&dir), 10);
    handler.stop().await.unwrap();
    assert_eq!(committed_rows(&dir), 10);
}

#[test]
fn test_force_flush_without_runtime() {
    let dir = TempDir::new().unwrap();
    let handler = handler(&dir);
    handler.handle_trade(trade("tBTCUSD", 1));
    assert_eq!(handler.force_flush().unwrap(), 1);
    assert_eq!(handler.statistics().flushes, 1);
    // Flushed data stays in .tmp until its segment closes.
    assert!(scan_data_files(dir.path()).unwrap().is_empty());
}

#[test]
fn test_start_needs_runtime() {
    let dir = TempDir::new().unwrap();
    let handler = handler(&dir);
    assert!(matches!(handler.start(), Err(Error::NoRuntime)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers() {
    let dir = TempDir::new().unwrap();
    let handler = Arc::new(handler(&dir));
    handler.start().unwrap();

    let producers: Vec<_> = ["tBTCUSD", "tETHUSD", "tSOLUSD"]
        .into_iter()
        .map(|symbol| {
            let handler = Arc::clone(&handler);
            std::thread::spawn(move || {
                for i in 0..2_000 {
                    handler.handle_trade(trade(symbol, i));
                    handler.handle_ticker(ticker(symbol, i));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    handler.stop().await.unwrap();
    let stats = handler.statistics();
    assert_eq!(stats.total_received(), 12_000);
    assert_eq!(stats.errors, 0);
    assert_eq!(committed_rows(&dir), 12_000);
}

struct CountingObserver {
    seen: AtomicU64,
}

#[async_trait]
impl RecordObserver for CountingObserver {
    fn name(&self) -> &str {
        "counting"
    }

    async fn on_record(&self, _record: Arc<MarketRecord>) {
        self.seen.fetch_add(1, Ordering::SeqCst);
    }
}

struct SlowObserver;

#[async_trait]
impl RecordObserver for SlowObserver {
    fn name(&self) -> &str {
        "slow"
    }

    async fn on_record(&self, _record: Arc<MarketRecord>) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_observers_see_every_record() {
    let dir = TempDir::new().unwrap();
    let handler = handler(&dir);
    let observer = Arc::new(CountingObserver {
        seen: AtomicU64::new(0),
    });
    handler.add_observer(observer.clone()).unwrap();
    assert_eq!(handler.observer_count(), 1);
    handler.start().unwrap();

    for i in 0..200 {
        handler.handle_trade(trade("tBTCUSD", i));
    }
    handler.stop().await.unwrap();

    assert_eq!(observer.seen.load(Ordering::SeqCst), 200);
    assert_eq!(handler.statistics().observer_dropped, 0);
    assert_eq!(committed_rows(&dir), 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_observer_never_blocks_writes() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.observer_queue_capacity = 2;
    let handler = IngestHandler::new(config, EngineIdentity::new("conn", "ingest"));
    handler.add_observer(Arc::new(SlowObserver)).unwrap();
    handler.start().unwrap();

    let started = std::time::Instant::now();
    for i in 0..100 {
        handler.handle_trade(trade("tBTCUSD", i));
    }
    // 100 records at 50ms each would take 5s if the observer blocked.
    assert!(started.elapsed() < Duration::from_secs(2));

    handler.stop().await.unwrap();
    let stats = handler.statistics();
    assert!(stats.observer_dropped > 0);
    assert_eq!(stats.trades, 100);
    assert_eq!(committed_rows(&dir), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_storage_failure_is_counted_not_raised() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("not-a-dir");
    std::fs::write(&base, b"plain file").unwrap();

    let mut config = config(&dir);
    config.storage.base_dir = base;
    let handler = IngestHandler::new(config, EngineIdentity::new("conn", "ingest"));
    handler.start().unwrap();

    // Returns normally even though the segment directory cannot be created.
    handler.handle_trade(trade("tBTCUSD", 1));

    let stats = handler.statistics();
    assert_eq!(stats.trades, 1);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.open_segments, 0);

    handler.stop().await.unwrap();
    assert_eq!(handler.statistics().errors, 1);
}
