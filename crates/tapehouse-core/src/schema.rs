//! Schema Registry
//!
//! Fixed column layouts for every record kind. Each layout starts with the same
//! four prefix columns, followed by the kind-specific columns:
//!
//! ```text
//! ┌────────┬──────────────────┬──────────────┬────────────┬─────────────────────┐
//! │ symbol │ pair_or_currency │ seq (null?)  │ recv_ts_us │ kind-specific …     │
//! │ utf8   │ utf8             │ int64        │ int64      │                     │
//! └────────┴──────────────────┴──────────────┴────────────┴─────────────────────┘
//! ```
//!
//! The order is consumed identically by the channel writers and by the
//! paginated reader. Reordering, renaming, or retyping a column is a breaking
//! format change and requires bumping [`SCHEMA_VERSION`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};

use crate::record::RecordKind;

/// Version of the column layouts below. Written into every manifest.
pub const SCHEMA_VERSION: u32 = 1;

/// Arrow schema metadata key holding the record kind.
pub const META_KIND: &str = "tapehouse.kind";

/// Arrow schema metadata key holding the schema version.
pub const META_SCHEMA_VERSION: &str = "tapehouse.schema_version";

/// Semantic column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Utf8,
    Int64,
    Float64,
    Int32,
    Boolean,
}

impl FieldType {
    pub fn data_type(self) -> DataType {
        match self {
            FieldType::Utf8 => DataType::Utf8,
            FieldType::Int64 => DataType::Int64,
            FieldType::Float64 => DataType::Float64,
            FieldType::Int32 => DataType::Int32,
            FieldType::Boolean => DataType::Boolean,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Utf8 => "utf8",
            FieldType::Int64 => "int64",
            FieldType::Float64 => "float64",
            FieldType::Int32 => "int32",
            FieldType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub nullable: bool,
}

const fn required(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        ty,
        nullable: false,
    }
}

const fn optional(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        ty,
        nullable: true,
    }
}

/// Leading columns shared by every record kind.
pub const COMMON_PREFIX: &[FieldSpec] = &[
    required("symbol", FieldType::Utf8),
    required("pair_or_currency", FieldType::Utf8),
    optional("seq", FieldType::Int64),
    required("recv_ts_us", FieldType::Int64),
];

const TICKER_FIELDS: &[FieldSpec] = &[
    required("bid", FieldType::Float64),
    required("bid_size", FieldType::Float64),
    required("ask", FieldType::Float64),
    required("ask_size", FieldType::Float64),
    required("last_price", FieldType::Float64),
    required("volume", FieldType::Float64),
    required("high", FieldType::Float64),
    required("low", FieldType::Float64),
    required("daily_change", FieldType::Float64),
    required("daily_change_pct", FieldType::Float64),
];

const TRADE_FIELDS: &[FieldSpec] = &[
    required("trade_id", FieldType::Int64),
    optional("exchange_ts_ms", FieldType::Int64),
    required("price", FieldType::Float64),
    required("amount", FieldType::Float64),
    required("side", FieldType::Utf8),
];

const BOOK_LEVEL_FIELDS: &[FieldSpec] = &[
    required("price", FieldType::Float64),
    required("count", FieldType::Int32),
    required("amount", FieldType::Float64),
    required("side", FieldType::Utf8),
    required("is_snapshot", FieldType::Boolean),
];

const RAW_BOOK_EVENT_FIELDS: &[FieldSpec] = &[
    required("order_id", FieldType::Int64),
    required("price", FieldType::Float64),
    required("amount", FieldType::Float64),
    required("op", FieldType::Utf8),
    required("side", FieldType::Utf8),
    required("is_snapshot", FieldType::Boolean),
];

const CANDLE_FIELDS: &[FieldSpec] = &[
    required("timeframe", FieldType::Utf8),
    required("open_ts_ms", FieldType::Int64),
    required("open", FieldType::Float64),
    required("close", FieldType::Float64),
    required("high", FieldType::Float64),
    required("low", FieldType::Float64),
    required("volume", FieldType::Float64),
];

/// Column layout for one record kind, plus its Arrow rendition.
#[derive(Debug)]
pub struct RecordSchema {
    kind: RecordKind,
    fields: Vec<FieldSpec>,
    arrow: SchemaRef,
}

impl RecordSchema {
    /// Registry lookup. Layouts are built once per process and shared.
    pub fn for_kind(kind: RecordKind) -> &'static RecordSchema {
        static TICKER: OnceLock<RecordSchema> = OnceLock::new();
        static TRADE: OnceLock<RecordSchema> = OnceLock::new();
        static BOOK_LEVEL: OnceLock<RecordSchema> = OnceLock::new();
        static RAW_BOOK_EVENT: OnceLock<RecordSchema> = OnceLock::new();
        static CANDLE: OnceLock<RecordSchema> = OnceLock::new();

        match kind {
            RecordKind::Ticker => TICKER.get_or_init(|| Self::build(kind, TICKER_FIELDS)),
            RecordKind::Trade => TRADE.get_or_init(|| Self::build(kind, TRADE_FIELDS)),
            RecordKind::BookLevel => {
                BOOK_LEVEL.get_or_init(|| Self::build(kind, BOOK_LEVEL_FIELDS))
            }
            RecordKind::RawBookEvent => {
                RAW_BOOK_EVENT.get_or_init(|| Self::build(kind, RAW_BOOK_EVENT_FIELDS))
            }
            RecordKind::Candle => CANDLE.get_or_init(|| Self::build(kind, CANDLE_FIELDS)),
        }
    }

    fn build(kind: RecordKind, specific: &[FieldSpec]) -> Self {
        let fields: Vec<FieldSpec> = COMMON_PREFIX.iter().chain(specific).copied().collect();

        let arrow_fields: Vec<Field> = fields
            .iter()
            .map(|f| Field::new(f.name, f.ty.data_type(), f.nullable))
            .collect();

        let metadata = HashMap::from([
            (META_KIND.to_string(), kind.as_str().to_string()),
            (META_SCHEMA_VERSION.to_string(), SCHEMA_VERSION.to_string()),
        ]);

        Self {
            kind,
            fields,
            arrow: Arc::new(Schema::new(arrow_fields).with_metadata(metadata)),
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn arrow_schema(&self) -> SchemaRef {
        Arc::clone(&self.arrow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_starts_with_common_prefix() {
        for kind in RecordKind::ALL {
            let schema = RecordSchema::for_kind(kind);
            assert_eq!(&schema.fields()[..COMMON_PREFIX.len()], COMMON_PREFIX);
            assert_eq!(schema.kind(), kind);
        }
    }

    #[test]
    fn test_arrow_schema_matches_specs() {
        let schema = RecordSchema::for_kind(RecordKind::BookLevel);
        let arrow = schema.arrow_schema();

        assert_eq!(arrow.fields().len(), schema.len());
        for (spec, field) in schema.fields().iter().zip(arrow.fields().iter()) {
            assert_eq!(field.name(), spec.name);
            assert_eq!(field.data_type(), &spec.ty.data_type());
            assert_eq!(field.is_nullable(), spec.nullable);
        }
        assert_eq!(
            arrow.metadata().get(META_KIND).map(String::as_str),
            Some("book_level")
        );
        assert_eq!(
            arrow.metadata().get(META_SCHEMA_VERSION).map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn test_registry_returns_shared_instance() {
        let a = RecordSchema::for_kind(RecordKind::Trade);
        let b = RecordSchema::for_kind(RecordKind::Trade);
        assert!(std::ptr::eq(a, b));
        assert!(Arc::ptr_eq(&a.arrow_schema(), &b.arrow_schema()));
    }

    #[test]
    fn test_seq_is_the_only_nullable_prefix_column() {
        let nullable: Vec<_> = COMMON_PREFIX
            .iter()
            .filter(|f| f.nullable)
            .map(|f| f.name)
            .collect();
        assert_eq!(nullable, vec!["seq"]);
    }

    #[test]
    fn test_index_of() {
        let schema = RecordSchema::for_kind(RecordKind::Candle);
        assert_eq!(schema.index_of("symbol"), Some(0));
        assert_eq!(schema.index_of("timeframe"), Some(COMMON_PREFIX.len()));
        assert_eq!(schema.index_of("nope"), None);
    }
}
