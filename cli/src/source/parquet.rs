//! Parquet snapshots.
//!
//! Scalar columns map to native cells, timestamp and date columns to UTC
//! timestamps, and list or struct columns to JSON values so they reach the
//! normalizer the same way nested JSON does.

use super::SourceError;
use arrow_array::cast::AsArray;
use arrow_array::types::{
    ArrowDictionaryKeyType, Date32Type, Date64Type, Float32Type, Float64Type, Int16Type,
    Int32Type, Int64Type, Int8Type, TimestampMicrosecondType, TimestampMillisecondType,
    TimestampNanosecondType, TimestampSecondType, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow_array::Array;
use arrow_schema::{DataType, TimeUnit};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use docsync_engine::{Cell, Snapshot};
use ::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::{Map, Number, Value};

/// Decode a whole parquet file held in memory.
pub fn decode_parquet(bytes: Bytes) -> Result<Snapshot, SourceError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;

    let fields = builder.schema().fields().clone();
    for field in fields.iter().filter(|f| !is_supported(f.data_type())) {
        tracing::warn!(
            column = %field.name(),
            data_type = %field.data_type(),
            "unsupported column type, values read as null"
        );
    }

    let mut snapshot = Snapshot::new(fields.iter().map(|f| f.name().clone()));
    for batch in builder.build()? {
        let batch = batch?;
        let mut columns: Vec<_> = batch
            .columns()
            .iter()
            .map(|array| {
                (0..array.len())
                    .map(|row| cell_at(array.as_ref(), row))
                    .collect::<Vec<_>>()
                    .into_iter()
            })
            .collect();

        for _ in 0..batch.num_rows() {
            let row = columns
                .iter_mut()
                .map(|column| column.next().unwrap_or_default())
                .collect();
            snapshot.push_row(row);
        }
    }
    Ok(snapshot)
}

fn is_supported(data_type: &DataType) -> bool {
    match data_type {
        DataType::Null
        | DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float32
        | DataType::Float64
        | DataType::Utf8
        | DataType::LargeUtf8
        | DataType::Timestamp(_, _)
        | DataType::Date32
        | DataType::Date64 => true,
        DataType::List(field) | DataType::LargeList(field) => is_supported(field.data_type()),
        DataType::Struct(fields) => fields.iter().all(|f| is_supported(f.data_type())),
        DataType::Dictionary(_, values) => is_supported(values),
        _ => false,
    }
}

/// One value of an array as a snapshot cell.
fn cell_at(array: &dyn Array, row: usize) -> Cell {
    if array.is_null(row) {
        return Cell::Null;
    }
    match array.data_type() {
        DataType::Boolean => Cell::Bool(array.as_boolean().value(row)),
        DataType::Int8 => Cell::Int(array.as_primitive::<Int8Type>().value(row).into()),
        DataType::Int16 => Cell::Int(array.as_primitive::<Int16Type>().value(row).into()),
        DataType::Int32 => Cell::Int(array.as_primitive::<Int32Type>().value(row).into()),
        DataType::Int64 => Cell::Int(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => Cell::Int(array.as_primitive::<UInt8Type>().value(row).into()),
        DataType::UInt16 => Cell::Int(array.as_primitive::<UInt16Type>().value(row).into()),
        DataType::UInt32 => Cell::Int(array.as_primitive::<UInt32Type>().value(row).into()),
        DataType::UInt64 => {
            let value = array.as_primitive::<UInt64Type>().value(row);
            i64::try_from(value).map_or(Cell::Float(value as f64), Cell::Int)
        }
        DataType::Float32 => Cell::Float(array.as_primitive::<Float32Type>().value(row).into()),
        DataType::Float64 => Cell::Float(array.as_primitive::<Float64Type>().value(row)),
        DataType::Utf8 => Cell::Text(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Cell::Text(array.as_string::<i64>().value(row).to_string()),
        DataType::Timestamp(unit, _) => timestamp_at(array, unit, row)
            .map(Cell::Timestamp)
            .unwrap_or_default(),
        DataType::Date32 => {
            let days = array.as_primitive::<Date32Type>().value(row);
            from_epoch(i64::from(days) * 86_400, 1)
                .map(Cell::Timestamp)
                .unwrap_or_default()
        }
        DataType::Date64 => {
            let millis = array.as_primitive::<Date64Type>().value(row);
            from_epoch(millis, 1_000)
                .map(Cell::Timestamp)
                .unwrap_or_default()
        }
        DataType::List(_) | DataType::LargeList(_) | DataType::Struct(_) => {
            Cell::from(nested_json(array, row))
        }
        DataType::Dictionary(key, _) => match key.as_ref() {
            DataType::Int8 => dictionary_cell::<Int8Type>(array, row),
            DataType::Int16 => dictionary_cell::<Int16Type>(array, row),
            DataType::Int32 => dictionary_cell::<Int32Type>(array, row),
            DataType::Int64 => dictionary_cell::<Int64Type>(array, row),
            DataType::UInt8 => dictionary_cell::<UInt8Type>(array, row),
            DataType::UInt16 => dictionary_cell::<UInt16Type>(array, row),
            DataType::UInt32 => dictionary_cell::<UInt32Type>(array, row),
            DataType::UInt64 => dictionary_cell::<UInt64Type>(array, row),
            _ => Cell::Null,
        },
        _ => Cell::Null,
    }
}

fn dictionary_cell<K: ArrowDictionaryKeyType>(array: &dyn Array, row: usize) -> Cell {
    let dictionary = array.as_dictionary::<K>();
    dictionary
        .key(row)
        .map(|key| cell_at(dictionary.values().as_ref(), key))
        .unwrap_or_default()
}

fn timestamp_at(array: &dyn Array, unit: &TimeUnit, row: usize) -> Option<DateTime<Utc>> {
    match unit {
        TimeUnit::Second => from_epoch(array.as_primitive::<TimestampSecondType>().value(row), 1),
        TimeUnit::Millisecond => from_epoch(
            array.as_primitive::<TimestampMillisecondType>().value(row),
            1_000,
        ),
        TimeUnit::Microsecond => from_epoch(
            array.as_primitive::<TimestampMicrosecondType>().value(row),
            1_000_000,
        ),
        TimeUnit::Nanosecond => from_epoch(
            array.as_primitive::<TimestampNanosecondType>().value(row),
            1_000_000_000,
        ),
    }
}

/// `value` ticks of `1 / per_second` seconds since the Unix epoch.
fn from_epoch(value: i64, per_second: i64) -> Option<DateTime<Utc>> {
    let secs = value.div_euclid(per_second);
    let nanos = value.rem_euclid(per_second) * (1_000_000_000 / per_second);
    DateTime::from_timestamp(secs, u32::try_from(nanos).ok()?)
}

/// Nested values become plain JSON; timestamps inside them become RFC 3339.
fn nested_json(array: &dyn Array, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }
    match array.data_type() {
        DataType::List(_) => list_json(array.as_list::<i32>().value(row).as_ref()),
        DataType::LargeList(_) => list_json(array.as_list::<i64>().value(row).as_ref()),
        DataType::Struct(fields) => {
            let columns = array.as_struct().columns();
            let map: Map<String, Value> = fields
                .iter()
                .zip(columns)
                .map(|(field, column)| (field.name().clone(), nested_json(column.as_ref(), row)))
                .collect();
            Value::Object(map)
        }
        _ => cell_json(cell_at(array, row)),
    }
}

fn list_json(items: &dyn Array) -> Value {
    Value::Array((0..items.len()).map(|i| nested_json(items, i)).collect())
}

fn cell_json(cell: Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Bool(b) => Value::Bool(b),
        Cell::Int(i) => Value::from(i),
        Cell::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        Cell::Text(s) => Value::String(s),
        Cell::Timestamp(ts) => Value::String(ts.to_rfc3339()),
        Cell::Object(map) => Value::Object(map),
        Cell::List(items) => Value::Array(items),
    }
}
