//! Batch Sources
//!
//! Committed files come in two Arrow IPC containers. Both are read through
//! [`BatchSource`] so paging and summaries do not care which one they got:
//!
//! - [`IndexedFileSource`]: file format. The footer lists every batch, so the
//!   batch count is known before reading any of them.
//! - [`SequentialStreamSource`]: stream format. Batches can only be read in
//!   order from the start.
//!
//! [`open_source`] probes the file format first and falls back to the stream
//! format. Dropping a source closes the file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use arrow::datatypes::SchemaRef;
use arrow::ipc::reader::{FileReader, StreamReader};
use arrow::record_batch::RecordBatch;

use crate::config::ContainerFormat;
use crate::error::{Error, Result};

pub trait BatchSource {
    fn schema(&self) -> SchemaRef;

    /// Next batch in file order, `None` at the end.
    fn next_batch(&mut self) -> Option<Result<RecordBatch>>;

    fn container(&self) -> ContainerFormat;

    /// Batch count when the container records it up front.
    fn batch_count(&self) -> Option<usize> {
        None
    }
}

pub struct IndexedFileSource {
    reader: FileReader<BufReader<File>>,
    next_index: usize,
}

impl IndexedFileSource {
    pub fn new(reader: FileReader<BufReader<File>>) -> Self {
        Self {
            reader,
            next_index: 0,
        }
    }
}

impl BatchSource for IndexedFileSource {
    fn schema(&self) -> SchemaRef {
        self.reader.schema()
    }

    fn next_batch(&mut self) -> Option<Result<RecordBatch>> {
        if self.next_index >= self.reader.num_batches() {
            return None;
        }
        self.next_index += 1;
        self.reader.next().map(|batch| batch.map_err(Error::from))
    }

    fn container(&self) -> ContainerFormat {
        ContainerFormat::File
    }

    fn batch_count(&self) -> Option<usize> {
        Some(self.reader.num_batches())
    }
}

pub struct SequentialStreamSource {
    reader: StreamReader<BufReader<File>>,
}

impl SequentialStreamSource {
    pub fn new(reader: StreamReader<BufReader<File>>) -> Self {
        Self { reader }
    }
}

impl BatchSource for SequentialStreamSource {
    fn schema(&self) -> SchemaRef {
        self.reader.schema()
    }

    fn next_batch(&mut self) -> Option<Result<RecordBatch>> {
        self.reader.next().map(|batch| batch.map_err(Error::from))
    }

    fn container(&self) -> ContainerFormat {
        ContainerFormat::Stream
    }
}

fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound {
            path: path.to_path_buf(),
        },
        _ => Error::Io(e),
    })
}

/// Open `path` with whichever IPC reader accepts it.
pub fn open_source(path: &Path) -> Result<Box<dyn BatchSource>> {
    let file_err = match FileReader::try_new(BufReader::new(open_file(path)?), None) {
        Ok(reader) => return Ok(Box::new(IndexedFileSource::new(reader))),
        Err(e) => e,
    };

    match StreamReader::try_new(BufReader::new(open_file(path)?), None) {
        Ok(reader) => Ok(Box::new(SequentialStreamSource::new(reader))),
        Err(stream_err) => {
            tracing::debug!(
                path = %path.display(),
                file_error = %file_err,
                stream_error = %stream_err,
                "Neither IPC reader accepted file"
            );
            Err(Error::UnknownContainer {
                path: path.to_path_buf(),
                detail: stream_err.to_string(),
            })
        }
    }
}
