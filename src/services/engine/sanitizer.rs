// Result Sanitizer
//
// Converts engine record batches into transport-safe rows: every value is
// either null or a display string. Float NaN/infinity sentinels become
// null so serialization never sees a non-finite number, and engine-native
// temporal values are rendered as plain strings.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate};
use datafusion::arrow::array::*;
use datafusion::arrow::datatypes::{
    ArrowPrimitiveType, DataType, Int16Type, Int32Type, Int64Type, Int8Type, TimeUnit, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::arrow::util::display::array_value_to_string;
use serde_json::Value as JsonValue;

use crate::models::dataset::Row;

pub struct ResultSanitizer;

impl ResultSanitizer {
    /// Flatten record batches into rows of `null`-or-string scalars,
    /// keyed by column name in schema order.
    pub fn sanitize_batches(batches: &[RecordBatch]) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        for batch in batches {
            Self::append_rows(batch, &mut rows)?;
        }
        Ok(rows)
    }

    fn append_rows(batch: &RecordBatch, out: &mut Vec<Row>) -> Result<()> {
        let schema = batch.schema();
        for row_idx in 0..batch.num_rows() {
            let mut row = Row::new();
            for (col_idx, field) in schema.fields().iter().enumerate() {
                let value = Self::scalar_to_display(batch.column(col_idx), row_idx)?;
                row.insert(field.name().clone(), value);
            }
            out.push(row);
        }
        Ok(())
    }

    /// Render one cell. Genuine nulls stay null; non-finite floats become
    /// null; everything else becomes its display string.
    fn scalar_to_display(array: &ArrayRef, row_idx: usize) -> Result<JsonValue> {
        if array.is_null(row_idx) {
            return Ok(JsonValue::Null);
        }

        let value = match array.data_type() {
            DataType::Boolean => {
                let array = array
                    .as_any()
                    .downcast_ref::<BooleanArray>()
                    .ok_or_else(|| anyhow!("failed to downcast to BooleanArray"))?;
                JsonValue::String(array.value(row_idx).to_string())
            }

            DataType::Int8 => primitive_string::<Int8Type>(array, row_idx)?,
            DataType::Int16 => primitive_string::<Int16Type>(array, row_idx)?,
            DataType::Int32 => primitive_string::<Int32Type>(array, row_idx)?,
            DataType::Int64 => primitive_string::<Int64Type>(array, row_idx)?,
            DataType::UInt8 => primitive_string::<UInt8Type>(array, row_idx)?,
            DataType::UInt16 => primitive_string::<UInt16Type>(array, row_idx)?,
            DataType::UInt32 => primitive_string::<UInt32Type>(array, row_idx)?,
            DataType::UInt64 => primitive_string::<UInt64Type>(array, row_idx)?,

            DataType::Float32 => {
                let array = array
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| anyhow!("failed to downcast to Float32Array"))?;
                finite_or_null(array.value(row_idx) as f64)
            }
            DataType::Float64 => {
                let array = array
                    .as_any()
                    .downcast_ref::<Float64Array>()
                    .ok_or_else(|| anyhow!("failed to downcast to Float64Array"))?;
                finite_or_null(array.value(row_idx))
            }

            DataType::Decimal128(_, scale) => {
                let array = array
                    .as_any()
                    .downcast_ref::<Decimal128Array>()
                    .ok_or_else(|| anyhow!("failed to downcast to Decimal128Array"))?;
                let scaled = array.value(row_idx) as f64 / 10f64.powi(*scale as i32);
                finite_or_null(scaled)
            }

            DataType::Utf8 => {
                let array = array
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .ok_or_else(|| anyhow!("failed to downcast to StringArray"))?;
                JsonValue::String(array.value(row_idx).to_string())
            }
            DataType::LargeUtf8 => {
                let array = array
                    .as_any()
                    .downcast_ref::<LargeStringArray>()
                    .ok_or_else(|| anyhow!("failed to downcast to LargeStringArray"))?;
                JsonValue::String(array.value(row_idx).to_string())
            }

            DataType::Date32 => {
                let array = array
                    .as_any()
                    .downcast_ref::<Date32Array>()
                    .ok_or_else(|| anyhow!("failed to downcast to Date32Array"))?;
                // Date32 is days since the Unix epoch; 719_163 shifts to CE days
                let date = NaiveDate::from_num_days_from_ce_opt(array.value(row_idx) + 719_163)
                    .ok_or_else(|| anyhow!("invalid date value"))?;
                JsonValue::String(date.format("%Y-%m-%d").to_string())
            }

            DataType::Timestamp(unit, _) => {
                let timestamp = match unit {
                    TimeUnit::Second => {
                        let array = array
                            .as_any()
                            .downcast_ref::<TimestampSecondArray>()
                            .ok_or_else(|| anyhow!("failed to downcast to TimestampSecondArray"))?;
                        DateTime::from_timestamp(array.value(row_idx), 0)
                    }
                    TimeUnit::Millisecond => {
                        let array = array
                            .as_any()
                            .downcast_ref::<TimestampMillisecondArray>()
                            .ok_or_else(|| {
                                anyhow!("failed to downcast to TimestampMillisecondArray")
                            })?;
                        DateTime::from_timestamp_millis(array.value(row_idx))
                    }
                    TimeUnit::Microsecond => {
                        let array = array
                            .as_any()
                            .downcast_ref::<TimestampMicrosecondArray>()
                            .ok_or_else(|| {
                                anyhow!("failed to downcast to TimestampMicrosecondArray")
                            })?;
                        DateTime::from_timestamp_micros(array.value(row_idx))
                    }
                    TimeUnit::Nanosecond => {
                        let array = array
                            .as_any()
                            .downcast_ref::<TimestampNanosecondArray>()
                            .ok_or_else(|| {
                                anyhow!("failed to downcast to TimestampNanosecondArray")
                            })?;
                        Some(DateTime::from_timestamp_nanos(array.value(row_idx)))
                    }
                };
                let dt = timestamp.ok_or_else(|| anyhow!("invalid timestamp value"))?;
                JsonValue::String(dt.format("%Y-%m-%d %H:%M:%S").to_string())
            }

            // anything else renders through arrow's own display path
            _ => JsonValue::String(array_value_to_string(array.as_ref(), row_idx)?),
        };

        Ok(value)
    }
}

fn primitive_string<T>(array: &ArrayRef, row_idx: usize) -> Result<JsonValue>
where
    T: ArrowPrimitiveType,
    T::Native: std::fmt::Display,
{
    let array = array
        .as_any()
        .downcast_ref::<PrimitiveArray<T>>()
        .ok_or_else(|| anyhow!("failed to downcast primitive array"))?;
    Ok(JsonValue::String(array.value(row_idx).to_string()))
}

fn finite_or_null(value: f64) -> JsonValue {
    if value.is_finite() {
        JsonValue::String(value.to_string())
    } else {
        JsonValue::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::datatypes::{Field, Schema};
    use std::sync::Arc;

    #[test]
    fn test_nan_and_infinity_become_null() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "value",
            DataType::Float64,
            true,
        )]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Float64Array::from(vec![
                Some(f64::NAN),
                Some(f64::INFINITY),
                Some(1.5),
                None,
            ]))],
        )
        .unwrap();

        let rows = ResultSanitizer::sanitize_batches(&[batch]).unwrap();
        assert_eq!(rows[0]["value"], JsonValue::Null);
        assert_eq!(rows[1]["value"], JsonValue::Null);
        assert_eq!(rows[2]["value"], JsonValue::String("1.5".to_string()));
        assert_eq!(rows[3]["value"], JsonValue::Null);
    }

    #[test]
    fn test_integers_render_as_decimal_strings() {
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, true)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(vec![Some(100), Some(-3), None]))],
        )
        .unwrap();

        let rows = ResultSanitizer::sanitize_batches(&[batch]).unwrap();
        assert_eq!(rows[0]["n"], JsonValue::String("100".to_string()));
        assert_eq!(rows[1]["n"], JsonValue::String("-3".to_string()));
        assert_eq!(rows[2]["n"], JsonValue::Null);
    }

    #[test]
    fn test_text_passes_through() {
        let schema = Arc::new(Schema::new(vec![Field::new("s", DataType::Utf8, true)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from(vec![Some("hello"), None]))],
        )
        .unwrap();

        let rows = ResultSanitizer::sanitize_batches(&[batch]).unwrap();
        assert_eq!(rows[0]["s"], JsonValue::String("hello".to_string()));
        assert_eq!(rows[1]["s"], JsonValue::Null);
    }

    #[test]
    fn test_timestamp_renders_as_plain_string() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "ts",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        )]));
        // 2023-01-15 00:00:00 UTC
        let micros = 1_673_740_800_000_000i64;
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(TimestampMicrosecondArray::from(vec![Some(micros)]))],
        )
        .unwrap();

        let rows = ResultSanitizer::sanitize_batches(&[batch]).unwrap();
        assert_eq!(
            rows[0]["ts"],
            JsonValue::String("2023-01-15 00:00:00".to_string())
        );
    }

    #[test]
    fn test_row_keys_follow_column_order() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("zeta", DataType::Utf8, true),
            Field::new("alpha", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![Some("1")])),
                Arc::new(StringArray::from(vec![Some("2")])),
            ],
        )
        .unwrap();

        let rows = ResultSanitizer::sanitize_batches(&[batch]).unwrap();
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }
}
