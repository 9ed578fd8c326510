//! Column Builder Set
//!
//! Turns rows into Arrow record batches without per-kind `match` blocks in the
//! writer. Each record kind implements [`AppendRow`] and pushes its values
//! through a [`RowAppender`] cursor in schema order.
//!
//! ## Row Staging
//!
//! Values are staged for the whole row and only copied into the builders once
//! [`RowAppender::finish`] has checked that every column got exactly one
//! value. A record that fails halfway leaves the builders untouched, so every
//! column length always equals the committed row count.
//!
//! ```text
//! push_str("tBTCUSD") ─┐
//! push_opt_i64(None)  ─┼─► staged cells ──finish()──► typed builders (+1 row)
//! push_f64(37000.5)   ─┘        │
//!                               └── type/nullability checked per push
//! ```

use std::ops::Range;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanBuilder, Float64Builder, Int32Builder, Int64Builder, StringBuilder,
};
use arrow::record_batch::RecordBatch;

use crate::error::{Error, Result};
use crate::schema::{FieldSpec, FieldType, RecordSchema};

/// Implemented by every record kind: push own values in registry order.
pub trait AppendRow {
    fn append_row(&self, row: &mut RowAppender<'_>) -> Result<()>;
}

enum ColumnBuilder {
    Utf8(StringBuilder),
    Int64(Int64Builder),
    Float64(Float64Builder),
    Int32(Int32Builder),
    Boolean(BooleanBuilder),
}

impl ColumnBuilder {
    fn new(ty: FieldType, capacity: usize) -> Self {
        match ty {
            FieldType::Utf8 => Self::Utf8(StringBuilder::with_capacity(capacity, capacity * 16)),
            FieldType::Int64 => Self::Int64(Int64Builder::with_capacity(capacity)),
            FieldType::Float64 => Self::Float64(Float64Builder::with_capacity(capacity)),
            FieldType::Int32 => Self::Int32(Int32Builder::with_capacity(capacity)),
            FieldType::Boolean => Self::Boolean(BooleanBuilder::with_capacity(capacity)),
        }
    }

    fn append_null(&mut self) {
        match self {
            Self::Utf8(b) => b.append_null(),
            Self::Int64(b) => b.append_null(),
            Self::Float64(b) => b.append_null(),
            Self::Int32(b) => b.append_null(),
            Self::Boolean(b) => b.append_null(),
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            Self::Utf8(b) => Arc::new(b.finish()),
            Self::Int64(b) => Arc::new(b.finish()),
            Self::Float64(b) => Arc::new(b.finish()),
            Self::Int32(b) => Arc::new(b.finish()),
            Self::Boolean(b) => Arc::new(b.finish()),
        }
    }
}

#[derive(Debug, Clone)]
enum Cell {
    Null,
    Str(Range<usize>),
    I64(i64),
    F64(f64),
    I32(i32),
    Bool(bool),
}

/// One typed builder per schema column, plus the staging area for the row
/// currently being appended.
pub struct ColumnSet {
    schema: &'static RecordSchema,
    builders: Vec<ColumnBuilder>,
    rows: usize,
    staged: Vec<Cell>,
    staged_text: String,
}

impl ColumnSet {
    pub fn for_schema(schema: &'static RecordSchema) -> Self {
        Self::with_capacity(schema, 0)
    }

    pub fn with_capacity(schema: &'static RecordSchema, capacity: usize) -> Self {
        let builders = schema
            .fields()
            .iter()
            .map(|f| ColumnBuilder::new(f.ty, capacity))
            .collect();

        Self {
            schema,
            builders,
            rows: 0,
            staged: Vec::with_capacity(schema.len()),
            staged_text: String::new(),
        }
    }

    pub fn schema(&self) -> &'static RecordSchema {
        self.schema
    }

    /// Rows committed since the last [`take_batch`](Self::take_batch).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Start a new row. Anything staged by an abandoned row is discarded.
    pub fn row(&mut self) -> RowAppender<'_> {
        self.staged.clear();
        self.staged_text.clear();
        RowAppender { set: self }
    }

    /// Append one record as one row.
    pub fn append<R: AppendRow + ?Sized>(&mut self, record: &R) -> Result<()> {
        let mut row = self.row();
        record.append_row(&mut row)?;
        row.finish()
    }

    /// Finish the builders into a batch and reset them. `None` when empty.
    pub fn take_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.rows == 0 {
            return Ok(None);
        }

        let columns: Vec<ArrayRef> = self.builders.iter_mut().map(|b| b.finish()).collect();
        let batch = RecordBatch::try_new(self.schema.arrow_schema(), columns)?;
        self.rows = 0;
        Ok(Some(batch))
    }

    fn commit(&mut self) -> Result<()> {
        let expected = self.schema.len();
        if self.staged.len() != expected {
            return Err(Error::IncompleteRow {
                appended: self.staged.len(),
                expected,
            });
        }

        for (builder, cell) in self.builders.iter_mut().zip(self.staged.drain(..)) {
            match (builder, cell) {
                (b, Cell::Null) => b.append_null(),
                (ColumnBuilder::Utf8(b), Cell::Str(range)) => {
                    b.append_value(&self.staged_text[range])
                }
                (ColumnBuilder::Int64(b), Cell::I64(v)) => b.append_value(v),
                (ColumnBuilder::Float64(b), Cell::F64(v)) => b.append_value(v),
                (ColumnBuilder::Int32(b), Cell::I32(v)) => b.append_value(v),
                (ColumnBuilder::Boolean(b), Cell::Bool(v)) => b.append_value(v),
                // Types are checked on push, and staging only ever holds a full
                // row, so a mismatch here means the builders were corrupted.
                _ => unreachable!("staged cell type diverged from column builder"),
            }
        }

        self.staged_text.clear();
        self.rows += 1;
        Ok(())
    }
}

/// Cursor over the columns of one row.
pub struct RowAppender<'a> {
    set: &'a mut ColumnSet,
}

impl RowAppender<'_> {
    fn next_spec(&self, got: FieldType) -> Result<FieldSpec> {
        let index = self.set.staged.len();
        let fields = self.set.schema.fields();
        let spec = *fields.get(index).ok_or(Error::TooManyValues {
            expected: fields.len(),
        })?;

        if spec.ty != got {
            return Err(Error::SchemaMismatch {
                column: spec.name.to_string(),
                expected: spec.ty,
                got,
            });
        }
        Ok(spec)
    }

    fn stage(&mut self, ty: FieldType, cell: Cell) -> Result<()> {
        let spec = self.next_spec(ty)?;
        if matches!(cell, Cell::Null) && !spec.nullable {
            return Err(Error::NullInRequiredColumn(spec.name.to_string()));
        }
        self.set.staged.push(cell);
        Ok(())
    }

    pub fn push_str(&mut self, value: &str) -> Result<()> {
        self.next_spec(FieldType::Utf8)?;
        let start = self.set.staged_text.len();
        self.set.staged_text.push_str(value);
        let end = self.set.staged_text.len();
        self.set.staged.push(Cell::Str(start..end));
        Ok(())
    }

    pub fn push_opt_str(&mut self, value: Option<&str>) -> Result<()> {
        match value {
            Some(v) => self.push_str(v),
            None => self.stage(FieldType::Utf8, Cell::Null),
        }
    }

    pub fn push_i64(&mut self, value: i64) -> Result<()> {
        self.stage(FieldType::Int64, Cell::I64(value))
    }

    pub fn push_opt_i64(&mut self, value: Option<i64>) -> Result<()> {
        self.stage(FieldType::Int64, value.map_or(Cell::Null, Cell::I64))
    }

    pub fn push_f64(&mut self, value: f64) -> Result<()> {
        self.stage(FieldType::Float64, Cell::F64(value))
    }

    pub fn push_opt_f64(&mut self, value: Option<f64>) -> Result<()> {
        self.stage(FieldType::Float64, value.map_or(Cell::Null, Cell::F64))
    }

    pub fn push_i32(&mut self, value: i32) -> Result<()> {
        self.stage(FieldType::Int32, Cell::I32(value))
    }

    pub fn push_bool(&mut self, value: bool) -> Result<()> {
        self.stage(FieldType::Boolean, Cell::Bool(value))
    }

    /// Commit the staged row into the builders.
    pub fn finish(self) -> Result<()> {
        self.set.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{MarketRecord, RecordHeader, RecordKind, Side, Trade};
    use arrow::array::{Array, Int64Array, StringArray};

    fn trade(id: i64, seq: Option<i64>) -> MarketRecord {
        MarketRecord::from(Trade {
            header: RecordHeader::new("tBTCUSD", "BTCUSD", seq, 1_000 + id),
            trade_id: id,
            exchange_ts_ms: None,
            price: 100.0 + id as f64,
            amount: 0.5,
            side: Side::Buy,
        })
    }

    #[test]
    fn test_append_and_take_batch() {
        let schema = RecordSchema::for_kind(RecordKind::Trade);
        let mut set = ColumnSet::for_schema(schema);

        set.append(&trade(1, Some(10))).unwrap();
        set.append(&trade(2, None)).unwrap();
        assert_eq!(set.rows(), 2);

        let batch = set.take_batch().unwrap().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), schema.len());
        assert_eq!(set.rows(), 0);

        let seq = batch
            .column(schema.index_of("seq").unwrap())
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(seq.value(0), 10);
        assert!(seq.is_null(1));

        let side = batch
            .column(schema.index_of("side").unwrap())
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(side.value(1), "buy");
    }

    #[test]
    fn test_empty_set_yields_no_batch() {
        let mut set = ColumnSet::for_schema(RecordSchema::for_kind(RecordKind::Ticker));
        assert!(set.take_batch().unwrap().is_none());
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let mut set = ColumnSet::for_schema(RecordSchema::for_kind(RecordKind::Trade));
        let mut row = set.row();
        let err = row.push_i64(1).unwrap_err();
        assert!(matches!(
            err,
            Error::SchemaMismatch { expected: FieldType::Utf8, got: FieldType::Int64, .. }
        ));
    }

    #[test]
    fn test_null_into_required_column_is_rejected() {
        let mut set = ColumnSet::for_schema(RecordSchema::for_kind(RecordKind::Trade));
        let mut row = set.row();
        let err = row.push_opt_str(None).unwrap_err();
        assert!(matches!(err, Error::NullInRequiredColumn(ref c) if c == "symbol"));
    }

    #[test]
    fn test_failed_row_leaves_columns_aligned() {
        let schema = RecordSchema::for_kind(RecordKind::Trade);
        let mut set = ColumnSet::for_schema(schema);
        set.append(&trade(1, None)).unwrap();

        {
            let mut row = set.row();
            row.push_str("tBTCUSD").unwrap();
            row.push_str("BTCUSD").unwrap();
            assert!(row.finish().is_err());
        }

        set.append(&trade(2, None)).unwrap();
        let batch = set.take_batch().unwrap().unwrap();
        assert_eq!(batch.num_rows(), 2);
        for column in batch.columns() {
            assert_eq!(column.len(), 2);
        }
    }

    #[test]
    fn test_too_many_values_is_rejected() {
        let schema = RecordSchema::for_kind(RecordKind::Trade);
        let mut set = ColumnSet::for_schema(schema);
        let mut row = set.row();
        trade(1, None).append_row(&mut row).unwrap();
        assert!(matches!(
            row.push_str("extra"),
            Err(Error::TooManyValues { .. })
        ));
    }
}
