// Tabular engine binding
//
// Wraps DataFusion as the embedded analytical engine: per-dataset
// SessionContext construction, the all-text CSV load, and registration of
// the typed table under the fixed name `data`. Also registers the
// tolerant string-to-temporal parse function the query rewrites target.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use datafusion::arrow::array::{StringArray, TimestampMicrosecondArray};
use datafusion::arrow::compute::concat_batches;
use datafusion::arrow::csv::reader::Format;
use datafusion::arrow::csv::ReaderBuilder;
use datafusion::arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::datasource::MemTable;
use datafusion::error::DataFusionError;
use datafusion::logical_expr::{ColumnarValue, ScalarUDF, Volatility};
use datafusion::prelude::*;

/// Every uploaded file is queryable as this table.
pub const TABLE_NAME: &str = "data";

const CSV_BATCH_SIZE: usize = 8192;

/// Configuration for per-dataset engine sessions.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Batch size for query execution
    pub batch_size: usize,
    /// Number of partitions for parallel execution
    pub target_partitions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 8192,
            target_partitions: num_cpus::get(),
        }
    }
}

/// Create a fresh, isolated SessionContext for one dataset.
///
/// The context carries the `try_to_timestamp` UDF so normalized and
/// repaired queries can rely on it being present.
pub fn create_session_context(config: &EngineConfig) -> SessionContext {
    let session_config = SessionConfig::new()
        .with_batch_size(config.batch_size)
        .with_target_partitions(config.target_partitions);
    let ctx = SessionContext::new_with_config(session_config);
    ctx.register_udf(try_to_timestamp_udf());
    ctx
}

/// Read CSV bytes into a single all-Utf8 record batch. Column names come
/// from the header row; every column starts as nullable text so the
/// engine's own type guessing never gets a say.
pub fn read_all_text(bytes: &[u8]) -> Result<RecordBatch> {
    let format = Format::default().with_header(true);
    let (detected, _) = format
        .infer_schema(Cursor::new(bytes), Some(0))
        .context("failed to read CSV header")?;

    let fields: Vec<Field> = detected
        .fields()
        .iter()
        .map(|f| Field::new(f.name(), DataType::Utf8, true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_batch_size(CSV_BATCH_SIZE)
        .build(Cursor::new(bytes))
        .context("failed to open CSV reader")?;
    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to decode CSV rows")?;

    concat_batches(&schema, &batches).context("failed to assemble CSV batches")
}

/// Register a batch as the session's `data` table.
pub fn register_dataset(ctx: &SessionContext, batch: RecordBatch) -> Result<()> {
    let schema = batch.schema();
    let table = MemTable::try_new(schema, vec![vec![batch]])
        .context("failed to build in-memory table")?;
    ctx.register_table(TABLE_NAME, Arc::new(table))
        .context("failed to register dataset table")?;
    Ok(())
}

/// Tolerant string-to-timestamp parse: `try_to_timestamp(text, format)`
/// yields null on failure instead of raising, which is what the quote and
/// function rewrites depend on.
fn try_to_timestamp_udf() -> ScalarUDF {
    let parse = Arc::new(
        |args: &[ColumnarValue]| -> datafusion::error::Result<ColumnarValue> {
            let arrays = ColumnarValue::values_to_arrays(args)?;
            let values = arrays[0]
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| {
                    DataFusionError::Execution(
                        "try_to_timestamp expects a string expression".to_string(),
                    )
                })?;
            let formats = arrays[1]
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| {
                    DataFusionError::Execution(
                        "try_to_timestamp expects a string format".to_string(),
                    )
                })?;

            let result: TimestampMicrosecondArray = values
                .iter()
                .zip(formats.iter())
                .map(|(value, format)| match (value, format) {
                    (Some(value), Some(format)) => parse_with_format(value.trim(), format),
                    _ => None,
                })
                .collect();
            Ok(ColumnarValue::Array(Arc::new(result)))
        },
    );

    create_udf(
        "try_to_timestamp",
        vec![DataType::Utf8, DataType::Utf8],
        DataType::Timestamp(TimeUnit::Microsecond, None),
        Volatility::Immutable,
        parse,
    )
}

fn parse_with_format(value: &str, format: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(value, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, format)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.naive_utc()))
        .map(|dt| dt.and_utc().timestamp_micros())
}
