//! Cell conversion and size estimation for paging.

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use serde_json::{Map, Number, Value};

/// Estimated bytes for a 64-bit numeric value.
pub const WIDE_VALUE_BYTES: usize = 8;
/// Estimated bytes for a 32-bit value.
pub const NARROW_VALUE_BYTES: usize = 4;
pub const BOOL_VALUE_BYTES: usize = 1;
/// Estimated bytes for nulls and any type without a specific estimate.
pub const DEFAULT_VALUE_BYTES: usize = 16;

/// Heuristic in-memory size of one cell.
pub fn estimate_cell(array: &ArrayRef, row: usize) -> usize {
    if array.is_null(row) {
        return DEFAULT_VALUE_BYTES;
    }
    match array.data_type() {
        DataType::Utf8 => array.as_string::<i32>().value(row).len(),
        DataType::LargeUtf8 => array.as_string::<i64>().value(row).len(),
        DataType::Int64 | DataType::UInt64 | DataType::Float64 => WIDE_VALUE_BYTES,
        DataType::Int32 | DataType::UInt32 | DataType::Float32 => NARROW_VALUE_BYTES,
        DataType::Boolean => BOOL_VALUE_BYTES,
        _ => DEFAULT_VALUE_BYTES,
    }
}

/// Heuristic size of a whole batch, without materializing rows.
pub fn estimate_batch(batch: &RecordBatch) -> usize {
    batch
        .columns()
        .iter()
        .map(|column| (0..batch.num_rows()).map(|row| estimate_cell(column, row)).sum::<usize>())
        .sum()
}

fn float(v: f64) -> Value {
    Number::from_f64(v).map_or(Value::Null, Value::Number)
}

/// One cell as a JSON value. Types without a native JSON form are rendered
/// with arrow's display formatting.
pub fn cell_to_json(array: &ArrayRef, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }
    match array.data_type() {
        DataType::Utf8 => Value::from(array.as_string::<i32>().value(row)),
        DataType::LargeUtf8 => Value::from(array.as_string::<i64>().value(row)),
        DataType::Boolean => Value::from(array.as_boolean().value(row)),
        DataType::Int8 => Value::from(array.as_primitive::<Int8Type>().value(row)),
        DataType::Int16 => Value::from(array.as_primitive::<Int16Type>().value(row)),
        DataType::Int32 => Value::from(array.as_primitive::<Int32Type>().value(row)),
        DataType::Int64 => Value::from(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => Value::from(array.as_primitive::<UInt8Type>().value(row)),
        DataType::UInt16 => Value::from(array.as_primitive::<UInt16Type>().value(row)),
        DataType::UInt32 => Value::from(array.as_primitive::<UInt32Type>().value(row)),
        DataType::UInt64 => Value::from(array.as_primitive::<UInt64Type>().value(row)),
        DataType::Float32 => float(f64::from(array.as_primitive::<Float32Type>().value(row))),
        DataType::Float64 => float(array.as_primitive::<Float64Type>().value(row)),
        _ => array_value_to_string(array.as_ref(), row)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Every row of `batch` as a column-name → value map, plus the estimated size.
pub fn batch_to_rows(batch: &RecordBatch) -> (Vec<Map<String, Value>>, usize) {
    let schema = batch.schema();
    let mut bytes = 0;
    let rows = (0..batch.num_rows())
        .map(|row| {
            let mut map = Map::with_capacity(batch.num_columns());
            for (field, column) in schema.fields().iter().zip(batch.columns()) {
                bytes += estimate_cell(column, row);
                map.insert(field.name().clone(), cell_to_json(column, row));
            }
            map
        })
        .collect();
    (rows, bytes)
}
