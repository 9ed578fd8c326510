//! Market Data Records
//!
//! The typed records handed over by the feed client. Every record carries a
//! [`RecordHeader`] (the common prefix) and kind-specific fields.
//!
//! Records are plain immutable values. The field order of each `AppendRow`
//! impl below must follow the layout in [`crate::schema`]; the row cursor
//! rejects any deviation at runtime.
//!
//! ## Example
//! ```
//! use tapehouse_core::{MarketRecord, RecordHeader, Side, Trade};
//!
//! let trade = Trade {
//!     header: RecordHeader::new("tBTCUSD", "BTCUSD", Some(42), 1_700_000_000_000_000),
//!     trade_id: 1,
//!     exchange_ts_ms: Some(1_700_000_000_000),
//!     price: 37_000.5,
//!     amount: 0.25,
//!     side: Side::Buy,
//! };
//! let record = MarketRecord::from(trade);
//! assert_eq!(record.kind().default_channel(), "trades");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::columns::{AppendRow, RowAppender};
use crate::error::Result;

/// Record variant tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Ticker,
    Trade,
    BookLevel,
    RawBookEvent,
    Candle,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Ticker,
        RecordKind::Trade,
        RecordKind::BookLevel,
        RecordKind::RawBookEvent,
        RecordKind::Candle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Ticker => "ticker",
            RecordKind::Trade => "trade",
            RecordKind::BookLevel => "book_level",
            RecordKind::RawBookEvent => "raw_book_event",
            RecordKind::Candle => "candle",
        }
    }

    /// Channel name used in directory and file names.
    pub fn default_channel(self) -> &'static str {
        match self {
            RecordKind::Ticker => "ticker",
            RecordKind::Trade => "trades",
            RecordKind::BookLevel => "book",
            RecordKind::RawBookEvent => "raw_book",
            RecordKind::Candle => "candles",
        }
    }

    /// Parse either the kind name or its channel name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s || k.default_channel() == s)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    /// Side from a signed amount: positive is bid/buy, negative is ask/sell.
    pub fn from_amount(amount: f64) -> Self {
        if amount < 0.0 {
            Side::Sell
        } else {
            Side::Buy
        }
    }
}

/// Raw order-book operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookOp {
    Upsert,
    Delete,
}

impl BookOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BookOp::Upsert => "upsert",
            BookOp::Delete => "delete",
        }
    }
}

/// Fields shared by every record kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordHeader {
    /// Exchange symbol, e.g. `tBTCUSD`
    pub symbol: String,

    /// Trading pair or funding currency, e.g. `BTCUSD` or `USD`
    pub pair_or_currency: String,

    /// Monotonic feed sequence number, when the feed provides one
    pub seq: Option<i64>,

    /// Local receive time in microseconds since epoch
    pub recv_ts_us: i64,
}

impl RecordHeader {
    pub fn new(
        symbol: impl Into<String>,
        pair_or_currency: impl Into<String>,
        seq: Option<i64>,
        recv_ts_us: i64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            pair_or_currency: pair_or_currency.into(),
            seq,
            recv_ts_us,
        }
    }

    fn estimated_size(&self) -> usize {
        self.symbol.len() + self.pair_or_currency.len() + 8 + 8
    }

    fn append_prefix(&self, row: &mut RowAppender<'_>) -> Result<()> {
        row.push_str(&self.symbol)?;
        row.push_str(&self.pair_or_currency)?;
        row.push_opt_i64(self.seq)?;
        row.push_i64(self.recv_ts_us)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub header: RecordHeader,
    pub bid: f64,
    pub bid_size: f64,
    pub ask: f64,
    pub ask_size: f64,
    pub last_price: f64,
    pub volume: f64,
    pub high: f64,
    pub low: f64,
    pub daily_change: f64,
    pub daily_change_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub header: RecordHeader,
    pub trade_id: i64,
    pub exchange_ts_ms: Option<i64>,
    pub price: f64,
    pub amount: f64,
    pub side: Side,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub header: RecordHeader,
    pub price: f64,
    pub count: i32,
    pub amount: f64,
    pub side: Side,
    pub is_snapshot: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBookEvent {
    pub header: RecordHeader,
    pub order_id: i64,
    pub price: f64,
    pub amount: f64,
    pub op: BookOp,
    pub side: Side,
    pub is_snapshot: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub header: RecordHeader,
    /// Candle width as the feed names it, e.g. `1m`
    pub timeframe: String,
    pub open_ts_ms: i64,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
}

impl AppendRow for Ticker {
    fn append_row(&self, row: &mut RowAppender<'_>) -> Result<()> {
        self.header.append_prefix(row)?;
        row.push_f64(self.bid)?;
        row.push_f64(self.bid_size)?;
        row.push_f64(self.ask)?;
        row.push_f64(self.ask_size)?;
        row.push_f64(self.last_price)?;
        row.push_f64(self.volume)?;
        row.push_f64(self.high)?;
        row.push_f64(self.low)?;
        row.push_f64(self.daily_change)?;
        row.push_f64(self.daily_change_pct)
    }
}

impl AppendRow for Trade {
    fn append_row(&self, row: &mut RowAppender<'_>) -> Result<()> {
        self.header.append_prefix(row)?;
        row.push_i64(self.trade_id)?;
        row.push_opt_i64(self.exchange_ts_ms)?;
        row.push_f64(self.price)?;
        row.push_f64(self.amount)?;
        row.push_str(self.side.as_str())
    }
}

impl AppendRow for BookLevel {
    fn append_row(&self, row: &mut RowAppender<'_>) -> Result<()> {
        self.header.append_prefix(row)?;
        row.push_f64(self.price)?;
        row.push_i32(self.count)?;
        row.push_f64(self.amount)?;
        row.push_str(self.side.as_str())?;
        row.push_bool(self.is_snapshot)
    }
}

impl AppendRow for RawBookEvent {
    fn append_row(&self, row: &mut RowAppender<'_>) -> Result<()> {
        self.header.append_prefix(row)?;
        row.push_i64(self.order_id)?;
        row.push_f64(self.price)?;
        row.push_f64(self.amount)?;
        row.push_str(self.op.as_str())?;
        row.push_str(self.side.as_str())?;
        row.push_bool(self.is_snapshot)
    }
}

impl AppendRow for Candle {
    fn append_row(&self, row: &mut RowAppender<'_>) -> Result<()> {
        self.header.append_prefix(row)?;
        row.push_str(&self.timeframe)?;
        row.push_i64(self.open_ts_ms)?;
        row.push_f64(self.open)?;
        row.push_f64(self.close)?;
        row.push_f64(self.high)?;
        row.push_f64(self.low)?;
        row.push_f64(self.volume)
    }
}

/// Any record the feed client can hand over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketRecord {
    Ticker(Ticker),
    Trade(Trade),
    BookLevel(BookLevel),
    RawBookEvent(RawBookEvent),
    Candle(Candle),
}

impl MarketRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            MarketRecord::Ticker(_) => RecordKind::Ticker,
            MarketRecord::Trade(_) => RecordKind::Trade,
            MarketRecord::BookLevel(_) => RecordKind::BookLevel,
            MarketRecord::RawBookEvent(_) => RecordKind::RawBookEvent,
            MarketRecord::Candle(_) => RecordKind::Candle,
        }
    }

    pub fn header(&self) -> &RecordHeader {
        match self {
            MarketRecord::Ticker(r) => &r.header,
            MarketRecord::Trade(r) => &r.header,
            MarketRecord::BookLevel(r) => &r.header,
            MarketRecord::RawBookEvent(r) => &r.header,
            MarketRecord::Candle(r) => &r.header,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.header().symbol
    }

    /// Approximate in-memory payload size, used for segment size accounting.
    pub fn estimated_size(&self) -> usize {
        let body = match self {
            MarketRecord::Ticker(_) => 10 * 8,
            MarketRecord::Trade(r) => 8 + 8 + 8 + 8 + r.side.as_str().len(),
            MarketRecord::BookLevel(r) => 8 + 4 + 8 + r.side.as_str().len() + 1,
            MarketRecord::RawBookEvent(r) => {
                8 + 8 + 8 + r.op.as_str().len() + r.side.as_str().len() + 1
            }
            MarketRecord::Candle(r) => r.timeframe.len() + 8 + 5 * 8,
        };
        self.header().estimated_size() + body
    }
}

impl AppendRow for MarketRecord {
    fn append_row(&self, row: &mut RowAppender<'_>) -> Result<()> {
        match self {
            MarketRecord::Ticker(r) => r.append_row(row),
            MarketRecord::Trade(r) => r.append_row(row),
            MarketRecord::BookLevel(r) => r.append_row(row),
            MarketRecord::RawBookEvent(r) => r.append_row(row),
            MarketRecord::Candle(r) => r.append_row(row),
        }
    }
}

macro_rules! impl_from_record {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for MarketRecord {
                fn from(record: $variant) -> Self {
                    MarketRecord::$variant(record)
                }
            }
        )*
    };
}

impl_from_record!(Ticker, Trade, BookLevel, RawBookEvent, Candle);

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> RecordHeader {
        RecordHeader::new("tETHUSD", "ETHUSD", None, 1_700_000_000_000_000)
    }

    #[test]
    fn test_kind_parse_accepts_kind_and_channel_names() {
        assert_eq!(RecordKind::parse("raw_book"), Some(RecordKind::RawBookEvent));
        assert_eq!(RecordKind::parse("raw_book_event"), Some(RecordKind::RawBookEvent));
        assert_eq!(RecordKind::parse("trades"), Some(RecordKind::Trade));
        assert_eq!(RecordKind::parse("orders"), None);
    }

    #[test]
    fn test_side_from_amount() {
        assert_eq!(Side::from_amount(1.5), Side::Buy);
        assert_eq!(Side::from_amount(-0.1), Side::Sell);
    }

    #[test]
    fn test_estimated_size_counts_strings() {
        let short = MarketRecord::from(Candle {
            header: header(),
            timeframe: "1m".into(),
            open_ts_ms: 0,
            open: 1.0,
            close: 1.0,
            high: 1.0,
            low: 1.0,
            volume: 1.0,
        });
        let long = MarketRecord::from(Candle {
            header: header(),
            timeframe: "12h".into(),
            open_ts_ms: 0,
            open: 1.0,
            close: 1.0,
            high: 1.0,
            low: 1.0,
            volume: 1.0,
        });
        assert_eq!(long.estimated_size(), short.estimated_size() + 1);
    }

    #[test]
    fn test_serde_tagging() {
        let record = MarketRecord::from(BookLevel {
            header: header(),
            price: 2000.0,
            count: 3,
            amount: -1.25,
            side: Side::Sell,
            is_snapshot: true,
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "book_level");
        assert_eq!(json["side"], "sell");

        let back: MarketRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
