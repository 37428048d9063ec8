// src/store/arrow.rs

use anyhow::{Context, Result};
use arrow::{
    array::{
        ArrayRef, Date32Array, Float64Array, Int32Array, Int64Array, StringArray, UInt32Array,
        UInt8Array,
    },
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;

/// Days from 0001-01-01 (CE) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// A row type that can be laid out as an Arrow table.
///
/// Dimension and fact rows implement this so the output store can write the
/// same `RecordBatch` as CSV and, optionally, Parquet.
pub trait TableRow: Sized {
    /// File stem of the persisted table, e.g. `dim_produto`.
    const TABLE: &'static str;
    /// Arrow schema; field order is the output column order.
    fn schema() -> Schema;
    /// One array per schema field, each `rows.len()` long.
    fn columns(rows: &[Self]) -> Vec<ArrayRef>;

    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        RecordBatch::try_new(Arc::new(Self::schema()), Self::columns(rows))
            .with_context(|| format!("building record batch for {}", Self::TABLE))
    }
}

pub fn key_field(name: &str) -> Field {
    Field::new(name, DataType::UInt32, false)
}

pub fn nullable_key_field(name: &str) -> Field {
    Field::new(name, DataType::UInt32, true)
}

pub fn text_field(name: &str) -> Field {
    Field::new(name, DataType::Utf8, false)
}

pub fn date_field(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Date32, nullable)
}

pub fn keys<I: IntoIterator<Item = u32>>(values: I) -> ArrayRef {
    Arc::new(UInt32Array::from_iter_values(values))
}

pub fn nullable_keys<I: IntoIterator<Item = Option<u32>>>(values: I) -> ArrayRef {
    Arc::new(values.into_iter().collect::<UInt32Array>())
}

pub fn flags<I: IntoIterator<Item = u8>>(values: I) -> ArrayRef {
    Arc::new(UInt8Array::from_iter_values(values))
}

pub fn texts<'a, I: IntoIterator<Item = &'a str>>(values: I) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(values))
}

pub fn dates<I: IntoIterator<Item = Option<NaiveDate>>>(values: I) -> ArrayRef {
    Arc::new(
        values
            .into_iter()
            .map(|d| d.map(date_to_days))
            .collect::<Date32Array>(),
    )
}

pub fn ints<I: IntoIterator<Item = Option<i32>>>(values: I) -> ArrayRef {
    Arc::new(values.into_iter().collect::<Int32Array>())
}

pub fn counts<I: IntoIterator<Item = i64>>(values: I) -> ArrayRef {
    Arc::new(Int64Array::from_iter_values(values))
}

pub fn floats<I: IntoIterator<Item = Option<f64>>>(values: I) -> ArrayRef {
    Arc::new(values.into_iter().collect::<Float64Array>())
}

pub fn date_to_days(d: NaiveDate) -> i32 {
    d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}
