//! Read-only commands over a data directory

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;
use tapehouse_storage::{read_file_page, read_file_summary, scan_data_files};

use crate::format::{or_dash, Formatter, OutputFormat};

#[derive(Serialize, Tabled)]
struct FileRow {
    channel: String,
    symbol: String,
    date: String,
    hour: String,
    size: u64,
    file: String,
}

#[derive(Serialize, Tabled)]
struct SummaryRow {
    file: String,
    container: String,
    kind: String,
    rows: usize,
    batches: usize,
    columns: usize,
    size: u64,
}

#[derive(Serialize, Tabled)]
struct FieldRow {
    name: String,
    #[tabled(rename = "type")]
    data_type: String,
    nullable: bool,
}

pub fn scan(root: &Path, formatter: &Formatter) -> Result<()> {
    let files = scan_data_files(root)
        .with_context(|| format!("Failed to scan {}", root.display()))?;
    tracing::debug!(root = %root.display(), files = files.len(), "Scanned data directory");

    if formatter.format() == OutputFormat::Json {
        return crate::format::print_json(&files);
    }

    let rows = files
        .into_iter()
        .map(|f| FileRow {
            channel: or_dash(f.channel),
            symbol: or_dash(f.symbol),
            date: or_dash(f.date),
            hour: or_dash(f.hour),
            size: f.size_bytes,
            file: f.relative_path.display().to_string(),
        })
        .collect();
    formatter.print_list(rows)
}

pub fn summary(file: &Path, formatter: &Formatter) -> Result<()> {
    let summary = read_file_summary(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    if formatter.format() == OutputFormat::Json {
        return crate::format::print_json(&summary);
    }

    formatter.print_single(SummaryRow {
        file: summary.path.display().to_string(),
        container: summary.container.as_str().to_string(),
        kind: or_dash(summary.kind),
        rows: summary.total_rows,
        batches: summary.batch_count,
        columns: summary.column_count,
        size: summary.file_size,
    })?;
    let fields = summary
        .fields
        .into_iter()
        .map(|f| FieldRow {
            name: f.name,
            data_type: f.data_type,
            nullable: f.nullable,
        })
        .collect();
    formatter.print_list(fields)
}

pub fn page(file: &Path, page_number: usize, page_size: usize, formatter: &Formatter) -> Result<()> {
    let page = read_file_page(file, page_number, page_size)
        .with_context(|| format!("Failed to read page {} of {}", page_number, file.display()))?;

    if formatter.format() == OutputFormat::Json {
        return crate::format::print_json(&page);
    }

    if page.rows.is_empty() {
        println!("Page {} is empty", page.page_number);
        return Ok(());
    }

    let headers: Vec<String> = page.rows[0].keys().cloned().collect();
    let rows = page
        .rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .map(|h| row.get(h).map(cell).unwrap_or_default())
                .collect()
        })
        .collect();
    formatter.print_dynamic(headers, rows);
    println!(
        "Page {} of ~{} ({} rows, {} batches, {} container{})",
        page.page_number,
        page.total_pages,
        page.total_rows_in_page,
        page.batch_count,
        page.container.as_str(),
        if page.has_more { ", more available" } else { "" }
    );
    Ok(())
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cell_rendering() {
        assert_eq!(cell(&Value::Null), "");
        assert_eq!(cell(&json!("tBTCUSD")), "tBTCUSD");
        assert_eq!(cell(&json!(37000.5)), "37000.5");
        assert_eq!(cell(&json!(true)), "true");
    }
}
