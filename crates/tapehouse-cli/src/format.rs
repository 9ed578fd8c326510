//! Output formatting for tapectl
//!
//! - Table: rounded ASCII tables (default)
//! - JSON: pretty-printed, machine-readable

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Print a list of items
    pub fn print_list<T: Serialize + Tabled>(&self, items: Vec<T>) -> Result<()> {
        match self.format {
            OutputFormat::Table => {
                if items.is_empty() {
                    println!("No items found");
                    return Ok(());
                }
                print_table(Table::new(items));
                Ok(())
            }
            OutputFormat::Json => print_json(&items),
        }
    }

    /// Print a single item
    pub fn print_single<T: Serialize + Tabled>(&self, item: T) -> Result<()> {
        match self.format {
            OutputFormat::Table => {
                print_table(Table::new(vec![item]));
                Ok(())
            }
            OutputFormat::Json => print_json(&item),
        }
    }

    /// Print rows whose columns are only known at runtime.
    pub fn print_dynamic(&self, headers: Vec<String>, rows: Vec<Vec<String>>) {
        let mut builder = Builder::default();
        builder.push_record(headers);
        for row in rows {
            builder.push_record(row);
        }
        print_table(builder.build());
    }
}

fn print_table(mut table: Table) {
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));
    println!("{}", table);
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `-` for missing values in table cells.
pub fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Tabled)]
    struct TestItem {
        name: String,
        rows: usize,
    }

    fn items() -> Vec<TestItem> {
        vec![
            TestItem {
                name: "part-trades".to_string(),
                rows: 10,
            },
            TestItem {
                name: "part-ticker".to_string(),
                rows: 3,
            },
        ]
    }

    #[test]
    fn test_json_format() {
        let formatter = Formatter::new(OutputFormat::Json);
        formatter.print_list(items()).unwrap();
    }

    #[test]
    fn test_table_format() {
        let formatter = Formatter::new(OutputFormat::Table);
        formatter.print_list(items()).unwrap();
        formatter.print_list(Vec::<TestItem>::new()).unwrap();
    }

    #[test]
    fn test_dynamic_table() {
        let formatter = Formatter::new(OutputFormat::Table);
        formatter.print_dynamic(
            vec!["symbol".to_string(), "price".to_string()],
            vec![vec!["tBTCUSD".to_string(), "37000".to_string()]],
        );
    }

    #[test]
    fn test_or_dash() {
        assert_eq!(or_dash::<u32>(None), "-");
        assert_eq!(or_dash(Some(7)), "7");
    }
}
