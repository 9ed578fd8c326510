//! Tapehouse Ingest
//!
//! The dispatcher between a market-data feed client and tapehouse storage.
//!
//! ```text
//! feed client ── handle_trade(..) ─┐
//!             ── handle_ticker(..) ┼─► IngestHandler ──► SegmentManager ──► segments on disk
//!             ── handle_candle(..) ┘        │                  ▲
//!                                           │                  │ flush / age rotation
//!                                           ▼                  │
//!                                      observers         flush loop (tokio)
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use tapehouse_core::{RecordHeader, Side, Trade};
//! use tapehouse_ingest::{IngestConfig, IngestHandler};
//! use tapehouse_storage::{EngineIdentity, StorageConfig};
//!
//! # async fn run() -> tapehouse_ingest::Result<()> {
//! let config = IngestConfig::new(StorageConfig::new("/var/lib/tapehouse"));
//! let handler = IngestHandler::new(config, EngineIdentity::generate());
//! handler.start()?;
//!
//! handler.handle_trade(Trade {
//!     header: RecordHeader::new("tBTCUSD", "BTCUSD", Some(1), 1_700_000_000_000_000),
//!     trade_id: 401597395,
//!     exchange_ts_ms: Some(1_700_000_000_000),
//!     price: 37_000.0,
//!     amount: 0.01,
//!     side: Side::Buy,
//! });
//!
//! handler.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod observer;
pub mod statistics;

pub use config::{IngestConfig, DEFAULT_FLUSH_INTERVAL};
pub use error::{Error, Result};
pub use handler::IngestHandler;
pub use observer::RecordObserver;
pub use statistics::HandlerStatistics;
