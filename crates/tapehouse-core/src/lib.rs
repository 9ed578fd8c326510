//! Tapehouse Core
//!
//! Shared building blocks for the tapehouse ingestion engine: the typed market-data
//! record model, the schema registry that fixes each record kind's column layout,
//! and the column builder set that turns rows into Arrow record batches.
//!
//! ## Data Flow
//!
//! ```text
//! feed client
//!     │ MarketRecord (Ticker | Trade | BookLevel | RawBookEvent | Candle)
//!     ▼
//! RecordSchema::for_kind()      ◄── schema registry, one layout per kind
//!     │
//!     ▼
//! ColumnSet::row() + AppendRow  ◄── one typed push per field, in schema order
//!     │
//!     ▼
//! ColumnSet::take_batch()       ◄── immutable RecordBatch for the IPC writer
//! ```
//!
//! ## Storage Contract
//!
//! The field order in [`schema`] is a storage contract shared by writers and
//! readers. Any change to it must bump [`schema::SCHEMA_VERSION`], which is
//! stamped into every segment manifest and into the Arrow schema metadata.

pub mod columns;
pub mod error;
pub mod record;
pub mod schema;

pub use columns::{AppendRow, ColumnSet, RowAppender};
pub use error::{Error, Result};
pub use record::{
    BookLevel, BookOp, Candle, MarketRecord, RawBookEvent, RecordHeader, RecordKind, Side, Ticker,
    Trade,
};
pub use schema::{FieldSpec, FieldType, RecordSchema, SCHEMA_VERSION};
