//! Tapehouse Storage
//!
//! Segmented, append-only Arrow IPC storage for market data, plus the
//! read-side scanner and paginated reader.
//!
//! ## Write Path
//!
//! ```text
//! MarketRecord
//!     │
//!     ▼
//! SegmentManager ── one current Segment per (channel, symbol)
//!     │                 rotated by size estimate or age
//!     ▼
//! Segment ── one ChannelWriter per (channel, symbol) seen
//!     │        manifest.json written on close
//!     ▼
//! ChannelWriter ── rows → 100-row record batches → part-….arrow.tmp
//!                  close(): finish, fsync, rename to part-….arrow
//! ```
//!
//! ## Read Path
//!
//! - [`scan_data_files`] lists committed files with their partition facts
//! - [`read_file_summary`] counts rows and batches and lists the columns
//! - [`read_file_page`] returns one budgeted page of rows as JSON maps
//!
//! Readers accept both IPC containers (stream and file) and never see
//! in-progress `.tmp` files.

pub mod channel_writer;
mod commit;
pub mod config;
pub mod error;
pub mod layout;
pub mod manager;
pub mod manifest;
pub mod reader;
pub mod scan;
pub mod segment;

pub use channel_writer::{ChannelWriter, BATCH_ROWS};
pub use config::{ContainerFormat, EngineIdentity, StorageConfig};
pub use error::{Error, Result};
pub use manager::SegmentManager;
pub use manifest::{Manifest, SegmentInfo};
pub use reader::{
    open_source, read_file_page, read_file_summary, BatchSource, FieldSummary, FileSummary,
    Page, Row, PAGE_BYTE_BUDGET,
};
pub use scan::{scan_data_files, DataFileInfo};
pub use segment::{Segment, SegmentParams, SeriesKey};
