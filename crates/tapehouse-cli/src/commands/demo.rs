//! Synthetic ingestion
//!
//! Drives generated tickers and trades through [`IngestHandler`] exactly as a
//! feed client would, then stops the handler so every file is committed.
//! Useful for checking a deployment's disk layout and rotation settings.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, ValueEnum};
use serde::Serialize;
use tabled::Tabled;
use tapehouse_core::{RecordHeader, Side, Ticker, Trade};
use tapehouse_ingest::{IngestConfig, IngestHandler};
use tapehouse_storage::{ContainerFormat, EngineIdentity, StorageConfig};

use crate::format::{Formatter, OutputFormat};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ContainerArg {
    Stream,
    File,
}

impl From<ContainerArg> for ContainerFormat {
    fn from(arg: ContainerArg) -> Self {
        match arg {
            ContainerArg::Stream => ContainerFormat::Stream,
            ContainerArg::File => ContainerFormat::File,
        }
    }
}

#[derive(Debug, Args)]
pub struct DemoArgs {
    /// Base directory for segments
    #[arg(long, env = "TAPEHOUSE_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Exchange name used in the directory layout
    #[arg(long, default_value = "demo")]
    pub exchange: String,

    /// Comma-separated symbols
    #[arg(long, value_delimiter = ',', default_value = "tBTCUSD,tETHUSD")]
    pub symbols: Vec<String>,

    /// Tickers and trades to generate per symbol
    #[arg(short = 'n', long, default_value_t = 1000)]
    pub count: u64,

    /// Container format for new files
    #[arg(long, value_enum, default_value_t = ContainerArg::Stream)]
    pub container: ContainerArg,

    /// Segment size target in MB
    #[arg(long, default_value_t = 256)]
    pub segment_size_mb: u64,

    /// Background flush interval in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub flush_interval_ms: i64,
}

#[derive(Serialize, Tabled)]
struct DemoRow {
    ingest_id: String,
    tickers: u64,
    trades: u64,
    errors: u64,
    flushes: u64,
    open_segments: usize,
}

pub async fn run(args: DemoArgs, formatter: &Formatter) -> Result<()> {
    let storage = StorageConfig {
        exchange: args.exchange.clone(),
        segment_max_size_mb: args.segment_size_mb,
        container: args.container.into(),
        ..StorageConfig::new(args.data_dir.clone())
    };
    let config = IngestConfig {
        flush_interval_ms: args.flush_interval_ms,
        ..IngestConfig::new(storage)
    };
    let handler = IngestHandler::new(config, EngineIdentity::generate());
    handler.start().context("Failed to start ingest handler")?;

    tracing::info!(
        data_dir = %args.data_dir.display(),
        symbols = args.symbols.len(),
        count = args.count,
        "Generating synthetic records"
    );

    for i in 0..args.count {
        for (n, symbol) in args.symbols.iter().enumerate() {
            let (ticker, trade) = synthetic(symbol, n, i);
            handler.handle_ticker(ticker);
            handler.handle_trade(trade);
        }
    }

    handler.stop().await.context("Failed to stop ingest handler")?;
    let stats = handler.statistics();

    if formatter.format() == OutputFormat::Json {
        return crate::format::print_json(&stats);
    }
    formatter.print_single(DemoRow {
        ingest_id: stats.ingest_id,
        tickers: stats.tickers,
        trades: stats.trades,
        errors: stats.errors,
        flushes: stats.flushes,
        open_segments: stats.open_segments,
    })
}

/// Deterministic ticker and trade for `symbol` at step `i`.
fn synthetic(symbol: &str, n: usize, i: u64) -> (Ticker, Trade) {
    let pair = symbol
        .strip_prefix('t')
        .or_else(|| symbol.strip_prefix('f'))
        .unwrap_or(symbol);
    let base = 100.0 * (n + 1) as f64;
    let price = base * (1.0 + 0.01 * (i as f64 * 0.05).sin());
    let spread = base * 0.0001;
    let seq = i as i64;
    let now = Utc::now();

    let ticker = Ticker {
        header: RecordHeader::new(symbol, pair, Some(seq * 2), now.timestamp_micros()),
        bid: price - spread,
        bid_size: 1.0 + (i % 7) as f64,
        ask: price + spread,
        ask_size: 1.0 + (i % 5) as f64,
        last_price: price,
        volume: 1_000.0 + i as f64,
        high: base * 1.01,
        low: base * 0.99,
        daily_change: price - base,
        daily_change_pct: (price - base) / base,
    };
    let amount = if i % 3 == 0 { -0.5 } else { 0.25 };
    let trade = Trade {
        header: RecordHeader::new(symbol, pair, Some(seq * 2 + 1), now.timestamp_micros()),
        trade_id: seq,
        exchange_ts_ms: Some(now.timestamp_millis()),
        price,
        amount,
        side: Side::from_amount(amount),
    };
    (ticker, trade)
}
