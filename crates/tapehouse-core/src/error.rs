//! Core Error Types
//!
//! Errors raised while turning records into Arrow columns.
//!
//! - `SchemaMismatch`: a record pushed a value whose type differs from the
//!   registry declaration for that column (a bug in an `AppendRow` impl)
//! - `IncompleteRow`: a row was finished before every column received a value
//! - `TooManyValues`: a row pushed more values than the schema has columns
//! - `NullInRequiredColumn`: a null was pushed into a non-nullable column
//! - `Arrow`: batch assembly failed inside arrow itself

use arrow::error::ArrowError;
use thiserror::Error;

use crate::schema::FieldType;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Schema mismatch on column '{column}': expected {expected}, got {got}")]
    SchemaMismatch {
        column: String,
        expected: FieldType,
        got: FieldType,
    },

    #[error("Incomplete row: {appended} of {expected} columns appended")]
    IncompleteRow { appended: usize, expected: usize },

    #[error("Too many values: schema has {expected} columns")]
    TooManyValues { expected: usize },

    #[error("Null value for required column '{0}'")]
    NullInRequiredColumn(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

pub type Result<T> = std::result::Result<T, Error>;
