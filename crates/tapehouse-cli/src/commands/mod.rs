//! Command handlers for tapectl
//!
//! - files: scan, summary and page over committed data files
//! - demo: synthetic ingestion through the full write path

pub mod demo;
pub mod files;

pub use demo::DemoArgs;
