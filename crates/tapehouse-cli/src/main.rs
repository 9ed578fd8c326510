//! tapectl - Tapehouse command-line tool
//!
//! Inspect committed market-data files and exercise the write path.
//!
//! ```text
//! tapectl scan ./data
//! tapectl summary ./data/.../part-trades-tBTCUSD-...arrow
//! tapectl page <file> --page 2 --page-size 500
//! tapectl --format json ingest-demo --data-dir /tmp/th --count 10000
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod format;

use commands::DemoArgs;
use format::{Formatter, OutputFormat};

#[derive(Parser)]
#[command(name = "tapectl")]
#[command(about = "Tapehouse market-data storage tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Table, env = "TAPECTL_FORMAT")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List committed data files under a directory
    Scan {
        /// Root to scan
        #[arg(env = "TAPEHOUSE_DATA_DIR", default_value = "./data")]
        root: PathBuf,
    },

    /// Show the schema and row counts of a data file
    Summary {
        /// Path to an .arrow file
        file: PathBuf,
    },

    /// Print one page of rows from a data file
    Page {
        /// Path to an .arrow file
        file: PathBuf,

        /// Page number, starting at 1
        #[arg(short, long, default_value_t = 1)]
        page: usize,

        /// Row cap per page (0 = byte budget only)
        #[arg(short = 'n', long, default_value_t = 0)]
        page_size: usize,
    },

    /// Write synthetic tickers and trades through the ingest handler
    IngestDemo(DemoArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so JSON output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let formatter = Formatter::new(cli.format);

    match cli.command {
        Commands::Scan { root } => commands::files::scan(&root, &formatter),
        Commands::Summary { file } => commands::files::summary(&file, &formatter),
        Commands::Page {
            file,
            page,
            page_size,
        } => commands::files::page(&file, page, page_size, &formatter),
        Commands::IngestDemo(args) => commands::demo::run(args, &formatter).await,
    }
}
