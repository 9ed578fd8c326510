//! Storage Error Types
//!
//! This module defines all error types that can occur during storage operations.
//!
//! ## Error Categories
//!
//! ### Lifecycle Errors
//! - `WriterClosed`: a row arrived at a channel writer after `close()`
//! - `SegmentClosed`: a write raced with segment rotation (retried by the manager)
//! - `StorageClosed`: the segment manager has been shut down
//!
//! ### Durability Errors
//! - `SegmentDirectory`: a new segment's directory could not be created; the
//!   triggering write fails with it
//! - `Commit`: the temp → final rename failed; the file is not durable
//! - `FlushFailed` / `CloseFailed`: aggregate results of manager-wide sweeps
//!
//! ### Reader Errors
//! - `NotFound`: the requested file does not exist
//! - `UnknownContainer`: neither the indexed nor the sequential IPC reader
//!   accepted the file
//!
//! ## Usage
//!
//! All storage operations return `Result<T>` which is aliased to
//! `Result<T, Error>`. This allows clean error propagation with `?`.

use std::path::PathBuf;

use arrow::error::ArrowError;
use tapehouse_core::RecordKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Row encoding error: {0}")]
    Core(#[from] tapehouse_core::Error),

    #[error("Manifest encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Writer closed: {}", path.display())]
    WriterClosed { path: PathBuf },

    #[error("Segment closed: {}", dir.display())]
    SegmentClosed { dir: PathBuf },

    #[error("Storage closed")]
    StorageClosed,

    #[error("Record kind {got} does not match writer kind {expected}")]
    KindMismatch {
        expected: RecordKind,
        got: RecordKind,
    },

    #[error("Failed to create segment directory {}: {source}", path.display())]
    SegmentDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to commit {} -> {}: {source}", from.display(), to.display())]
    Commit {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Unknown container format for {}: {detail}", path.display())]
    UnknownContainer { path: PathBuf, detail: String },

    #[error("Flush failed for {failed} writer(s)")]
    FlushFailed { failed: usize },

    #[error("{failed} segment(s) failed to close; first error: {first}")]
    CloseFailed { failed: usize, first: Box<Error> },
}
