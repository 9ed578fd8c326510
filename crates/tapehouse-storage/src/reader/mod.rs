//! Paginated Reader
//!
//! Read-side access to committed files: whole-file summaries and pages of
//! rows as JSON-ready maps.
//!
//! ## Paging
//!
//! Pages are cut at batch boundaries by an estimated in-memory size budget
//! ([`PAGE_BYTE_BUDGET`]) and an optional row cap:
//!
//! ```text
//! batch 0  batch 1  batch 2 │ batch 3  batch 4 │ batch 5
//! ◄──── page 1 ────────────►│◄─── page 2 ─────►│◄ page 3
//!                    budget reached      budget reached
//! ```
//!
//! - The first batch of a page is always included, so a page is never empty
//!   while batches remain
//! - A page ends after the batch that reaches the budget (or the row cap)
//! - Page N is found by replaying pages 1..N from the start of the file. Stream
//!   files have no index and no saved cursor, so reading page N again (or
//!   going back to an earlier page) scans the file from its beginning
//! - `total_pages` is an estimate from the file size; `has_more` is exact

mod source;
mod value;

pub use source::{open_source, BatchSource, IndexedFileSource, SequentialStreamSource};
pub use value::{
    batch_to_rows, cell_to_json, estimate_batch, estimate_cell, BOOL_VALUE_BYTES,
    DEFAULT_VALUE_BYTES, NARROW_VALUE_BYTES, WIDE_VALUE_BYTES,
};

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use tapehouse_core::schema::META_KIND;
use tapehouse_core::RecordKind;

use crate::config::ContainerFormat;
use crate::error::{Error, Result};

/// Estimated bytes of row data per page.
pub const PAGE_BYTE_BUDGET: usize = 10 * 1024 * 1024;

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSummary {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub path: PathBuf,
    pub container: ContainerFormat,
    /// Record kind from the schema metadata, for files written by this crate
    pub kind: Option<RecordKind>,
    pub file_size: u64,
    pub total_rows: usize,
    pub batch_count: usize,
    pub column_count: usize,
    pub fields: Vec<FieldSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub page_number: usize,
    /// Row cap requested by the caller, 0 for none
    pub page_size: usize,
    pub total_pages: usize,
    pub rows: Vec<Row>,
    pub total_rows_in_page: usize,
    pub batch_count: usize,
    pub estimated_bytes: usize,
    pub has_more: bool,
    pub container: ContainerFormat,
}

fn file_size(path: &Path) -> Result<u64> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound {
                path: path.to_path_buf(),
            },
            _ => Error::Io(e),
        })
}

/// Estimated page count from the on-disk size, at least 1.
pub fn estimate_total_pages(file_size: u64) -> usize {
    let budget = PAGE_BYTE_BUDGET as u64;
    (file_size.div_ceil(budget) as usize).max(1)
}

/// Read every batch once and describe the file.
pub fn read_file_summary(path: &Path) -> Result<FileSummary> {
    let file_size = file_size(path)?;
    let mut source = open_source(path)?;
    let schema = source.schema();

    let mut total_rows = 0;
    let mut batch_count = 0;
    while let Some(batch) = source.next_batch() {
        total_rows += batch?.num_rows();
        batch_count += 1;
    }

    let fields = schema
        .fields()
        .iter()
        .map(|f| FieldSummary {
            name: f.name().clone(),
            data_type: f.data_type().to_string(),
            nullable: f.is_nullable(),
        })
        .collect::<Vec<_>>();

    Ok(FileSummary {
        path: path.to_path_buf(),
        container: source.container(),
        kind: schema.metadata().get(META_KIND).and_then(|k| RecordKind::parse(k)),
        file_size,
        total_rows,
        batch_count,
        column_count: fields.len(),
        fields,
    })
}

/// Read page `page_number` (1-based; 0 is treated as 1) of `path`.
///
/// `page_size` caps the rows per page at batch granularity: a page ends after
/// the batch that reaches it. Pass 0 to page by byte budget only.
pub fn read_file_page(path: &Path, page_number: usize, page_size: usize) -> Result<Page> {
    let page_number = page_number.max(1);
    let total_pages = estimate_total_pages(file_size(path)?);
    let mut source = open_source(path)?;

    let mut page = Page {
        page_number,
        page_size,
        total_pages,
        rows: Vec::new(),
        total_rows_in_page: 0,
        batch_count: 0,
        estimated_bytes: 0,
        has_more: false,
        container: source.container(),
    };

    let mut current = 1;
    let mut skipped_rows = 0;
    let mut skipped_bytes = 0;
    while let Some(batch) = source.next_batch() {
        let batch = batch?;

        let page_full = if current == page_number {
            let (rows, bytes) = batch_to_rows(&batch);
            page.rows.extend(rows);
            page.total_rows_in_page += batch.num_rows();
            page.estimated_bytes += bytes;
            page.batch_count += 1;
            page_is_full(page.total_rows_in_page, page.estimated_bytes, page_size)
        } else {
            skipped_rows += batch.num_rows();
            skipped_bytes += estimate_batch(&batch);
            page_is_full(skipped_rows, skipped_bytes, page_size)
        };

        if !page_full {
            continue;
        }
        if current == page_number {
            page.has_more = source.next_batch().transpose()?.is_some();
            break;
        }
        current += 1;
        skipped_rows = 0;
        skipped_bytes = 0;
    }

    // The estimate can undershoot when batches compress well on disk.
    if page.has_more {
        page.total_pages = page.total_pages.max(page_number + 1);
    } else if page.total_rows_in_page > 0 {
        page.total_pages = page.total_pages.max(page_number);
    }

    tracing::debug!(
        path = %path.display(),
        page = page_number,
        rows = page.total_rows_in_page,
        batches = page.batch_count,
        estimated_bytes = page.estimated_bytes,
        has_more = page.has_more,
        "Read page"
    );
    Ok(page)
}

fn page_is_full(rows: usize, bytes: usize, page_size: usize) -> bool {
    bytes >= PAGE_BYTE_BUDGET || (page_size > 0 && rows >= page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_estimate() {
        assert_eq!(estimate_total_pages(0), 1);
        assert_eq!(estimate_total_pages(1), 1);
        assert_eq!(estimate_total_pages(PAGE_BYTE_BUDGET as u64), 1);
        assert_eq!(estimate_total_pages(PAGE_BYTE_BUDGET as u64 + 1), 2);
    }

    #[test]
    fn test_page_is_full() {
        assert!(!page_is_full(10, 100, 0));
        assert!(page_is_full(10, PAGE_BYTE_BUDGET, 0));
        assert!(page_is_full(100, 0, 100));
        assert!(!page_is_full(99, 0, 100));
    }
}
