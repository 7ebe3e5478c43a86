//! Helpers over harmonized `RecordBatch`es.

use arrow::array::{Array, BooleanArray, Float64Array, Int32Array, RecordBatch, StringArray};
use arrow::compute::{concat_batches, filter_record_batch};
use arrow::datatypes::SchemaRef;

use crate::error::{ImportError, Result};

/// Check that a freshly parsed table is usable: required columns present and
/// at least one row.
pub fn validate_table(provider: &'static str, batch: &RecordBatch, required: &[&str]) -> Result<()> {
    let schema = batch.schema();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|c| schema.field_with_name(c).is_err())
        .collect();
    if !missing.is_empty() {
        return Err(ImportError::format(
            provider,
            format!("missing columns {missing:?}"),
        ));
    }
    if batch.num_rows() == 0 {
        return Err(ImportError::format(provider, "table has no rows"));
    }
    Ok(())
}

/// Concatenate batches sharing `schema`, preserving order.
pub fn concat(schema: &SchemaRef, batches: &[RecordBatch]) -> Result<RecordBatch> {
    if batches.is_empty() {
        return Ok(RecordBatch::new_empty(schema.clone()));
    }
    Ok(concat_batches(schema, batches)?)
}

/// Keep rows where `keep(row_index)` is true.
pub fn filter_rows(batch: &RecordBatch, keep: impl Fn(usize) -> bool) -> Result<RecordBatch> {
    let mask: BooleanArray = (0..batch.num_rows()).map(|i| Some(keep(i))).collect();
    Ok(filter_record_batch(batch, &mask)?)
}

pub fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch.column_by_name(name)?.as_any().downcast_ref()
}

pub fn int32_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Int32Array> {
    batch.column_by_name(name)?.as_any().downcast_ref()
}

pub fn float64_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Float64Array> {
    batch.column_by_name(name)?.as_any().downcast_ref()
}

/// Non-null string values of a column, in row order.
pub fn string_values(batch: &RecordBatch, name: &str) -> Vec<String> {
    string_column(batch, name)
        .map(|col| col.iter().flatten().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Distinct non-null values of a string column, sorted.
pub fn distinct_strings(batch: &RecordBatch, name: &str) -> Vec<String> {
    let mut values = string_values(batch, name);
    values.sort_unstable();
    values.dedup();
    values
}
