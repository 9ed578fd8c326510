//! Channel Writer
//!
//! Appends rows of one record kind for one (channel, symbol) pair to a single
//! Arrow IPC file inside a segment directory.
//!
//! ## Lifecycle
//!
//! ```text
//! create()            write_row() × N              close()
//!   │                    │                           │
//!   ▼                    ▼                           ▼
//! part-….arrow.tmp   rows buffered in columns   flush remainder
//! IPC header         every BATCH_ROWS rows      mark closed
//!                    → one record batch         finish IPC stream
//!                                               fsync + close file
//!                                               rename → part-….arrow
//!                                               fsync directory
//! ```
//!
//! Until `close()` returns, only the `.tmp` file exists. Readers never look at
//! `.tmp` files, so a crash mid-write never exposes a half-written file under
//! its final name.
//!
//! ## Thread Safety
//!
//! All state sits behind one mutex; any number of producers may share an
//! `Arc<ChannelWriter>`. Rows from concurrent producers interleave but a row is
//! never split.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use arrow::datatypes::Schema;
use arrow::ipc::writer::{FileWriter, StreamWriter};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use parking_lot::Mutex;
use tapehouse_core::{ColumnSet, MarketRecord, RecordKind, RecordSchema};

use crate::commit::commit_rename;
use crate::config::ContainerFormat;
use crate::error::{Error, Result};
use crate::layout::{part_file_name, tmp_path};

/// Rows buffered before a record batch is written.
pub const BATCH_ROWS: usize = 100;

const WRITE_BUFFER_BYTES: usize = 64 * 1024;

enum IpcSink {
    Stream(StreamWriter<BufWriter<File>>),
    File(FileWriter<BufWriter<File>>),
}

impl IpcSink {
    fn create(file: File, schema: &Schema, format: ContainerFormat) -> Result<Self> {
        let out = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
        Ok(match format {
            ContainerFormat::Stream => IpcSink::Stream(StreamWriter::try_new(out, schema)?),
            ContainerFormat::File => IpcSink::File(FileWriter::try_new(out, schema)?),
        })
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        match self {
            IpcSink::Stream(w) => w.write(batch)?,
            IpcSink::File(w) => w.write(batch)?,
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            IpcSink::Stream(w) => w.get_mut().flush()?,
            IpcSink::File(w) => w.get_mut().flush()?,
        }
        Ok(())
    }

    /// Write the end-of-stream marker (or footer) and hand back the file.
    fn finish(self) -> Result<File> {
        let out = match self {
            IpcSink::Stream(mut w) => {
                w.finish()?;
                w.into_inner()?
            }
            IpcSink::File(mut w) => {
                w.finish()?;
                w.into_inner()?
            }
        };
        out.into_inner().map_err(|e| Error::Io(e.into_error()))
    }
}

struct WriterState {
    sink: Option<IpcSink>,
    columns: ColumnSet,
    rows_written: u64,
    batches_written: u64,
    closed: bool,
}

pub struct ChannelWriter {
    channel: String,
    symbol: String,
    kind: RecordKind,
    file_name: String,
    final_path: PathBuf,
    tmp_path: PathBuf,
    sync_directory: bool,
    state: Mutex<WriterState>,
}

impl ChannelWriter {
    /// Create the `.tmp` file in `dir` and write the IPC header for `kind`.
    pub fn create(
        dir: &Path,
        channel: &str,
        symbol: &str,
        kind: RecordKind,
        format: ContainerFormat,
        sync_directory: bool,
    ) -> Result<Self> {
        let file_name = part_file_name(channel, symbol, Utc::now());
        let final_path = dir.join(&file_name);
        let tmp_path = tmp_path(&final_path);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        let schema = RecordSchema::for_kind(kind);
        let sink = IpcSink::create(file, schema.arrow_schema().as_ref(), format)?;

        tracing::debug!(
            channel = %channel,
            symbol = %symbol,
            kind = %kind,
            container = format.as_str(),
            path = %tmp_path.display(),
            "Opened channel writer"
        );

        Ok(Self {
            channel: channel.to_string(),
            symbol: symbol.to_string(),
            kind,
            file_name,
            final_path,
            tmp_path,
            sync_directory,
            state: Mutex::new(WriterState {
                sink: Some(sink),
                columns: ColumnSet::with_capacity(schema, BATCH_ROWS),
                rows_written: 0,
                batches_written: 0,
                closed: false,
            }),
        })
    }

    /// Append one record as one row. A full buffer becomes one record batch.
    pub fn write_row(&self, record: &MarketRecord) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::WriterClosed {
                path: self.final_path.clone(),
            });
        }
        if record.kind() != self.kind {
            return Err(Error::KindMismatch {
                expected: self.kind,
                got: record.kind(),
            });
        }

        state.columns.append(record)?;
        state.rows_written += 1;

        if state.columns.rows() >= BATCH_ROWS {
            Self::write_pending(&mut state)?;
        }
        Ok(())
    }

    /// Write any buffered rows as a (possibly short) batch and flush the OS
    /// buffer. A closed writer has nothing pending.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        Self::write_pending(&mut state)?;
        if let Some(sink) = state.sink.as_mut() {
            sink.flush()?;
        }
        Ok(())
    }

    /// Finalize the file and commit it under its final name.
    ///
    /// Returns the committed file name. Closing twice is an error; the first
    /// close already committed (or failed to commit) the file.
    pub fn close(&self) -> Result<String> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::WriterClosed {
                path: self.final_path.clone(),
            });
        }

        let pending = Self::write_pending(&mut state);
        state.closed = true;
        let sink = state.sink.take();
        let rows = state.rows_written;
        let batches = state.batches_written;
        drop(state);
        pending?;

        if let Some(sink) = sink {
            let file = sink.finish()?;
            file.sync_all()?;
        }

        commit_rename(&self.tmp_path, &self.final_path, self.sync_directory)?;

        tracing::info!(
            channel = %self.channel,
            symbol = %self.symbol,
            rows,
            batches,
            path = %self.final_path.display(),
            "Committed channel file"
        );
        Ok(self.file_name.clone())
    }

    fn write_pending(state: &mut WriterState) -> Result<()> {
        let Some(batch) = state.columns.take_batch()? else {
            return Ok(());
        };
        if let Some(sink) = state.sink.as_mut() {
            sink.write(&batch)?;
            state.batches_written += 1;
        }
        Ok(())
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    pub fn rows_written(&self) -> u64 {
        self.state.lock().rows_written
    }

    pub fn batches_written(&self) -> u64 {
        self.state.lock().batches_written
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
