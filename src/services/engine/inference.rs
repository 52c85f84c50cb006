// Column Type Inference Engine
//
// Narrows an all-text table to typed columns by probing each column against
// a fixed priority order of candidate types. Probes use tolerant parses
// (absent value on failure, never an error) and a column commits to the
// first candidate whose unparseable fraction stays under the tolerance.
// The component never fails: an undecidable column simply stays text.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use datafusion::arrow::array::{
    ArrayRef, Date32Array, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use datafusion::arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use datafusion::arrow::record_batch::RecordBatch;

use crate::models::dataset::{ColumnInfo, ColumnType};

/// Fraction of non-empty values allowed to fail a candidate's parse.
pub const ERROR_TOLERANCE: f64 = 0.05;

/// One candidate type probe, tried in the order of [`CANDIDATES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCandidate {
    /// Timestamp parsed with one explicit chrono format.
    TimestampFormat(&'static str),
    /// Timestamp parsed generically (RFC 3339 and common ISO shapes).
    TimestampAuto,
    Date,
    Double,
    Integer,
}

/// Fixed candidate priority. Specific date formats come before the generic
/// timestamp parse so locale-ambiguous columns settle on the more specific
/// pattern; temporal candidates come before numeric ones.
pub const CANDIDATES: &[TypeCandidate] = &[
    TypeCandidate::TimestampFormat("%m/%d/%Y"),
    TypeCandidate::TimestampFormat("%Y-%m-%d"),
    TypeCandidate::TimestampFormat("%d/%m/%Y"),
    TypeCandidate::TimestampFormat("%m-%d-%Y"),
    TypeCandidate::TimestampFormat("%Y-%m-%d %H:%M:%S"),
    TypeCandidate::TimestampAuto,
    TypeCandidate::Date,
    TypeCandidate::Double,
    TypeCandidate::Integer,
];

impl TypeCandidate {
    pub fn target_type(&self) -> ColumnType {
        match self {
            TypeCandidate::TimestampFormat(_) | TypeCandidate::TimestampAuto => {
                ColumnType::Timestamp
            }
            TypeCandidate::Date => ColumnType::Date,
            TypeCandidate::Double => ColumnType::Double,
            TypeCandidate::Integer => ColumnType::Integer,
        }
    }

    /// Tolerant probe: does this candidate accept the value?
    fn parses(&self, value: &str) -> bool {
        match self {
            TypeCandidate::TimestampFormat(_) | TypeCandidate::TimestampAuto => {
                self.parse_timestamp(value).is_some()
            }
            TypeCandidate::Date => parse_date_days(value).is_some(),
            TypeCandidate::Double => value.parse::<f64>().is_ok(),
            TypeCandidate::Integer => value.parse::<i64>().is_ok(),
        }
    }

    /// Tolerant timestamp parse for this candidate. Date-only formats land
    /// on midnight.
    fn parse_timestamp(&self, value: &str) -> Option<NaiveDateTime> {
        match self {
            TypeCandidate::TimestampFormat(format) => {
                NaiveDateTime::parse_from_str(value, format)
                    .ok()
                    .or_else(|| {
                        NaiveDate::parse_from_str(value, format)
                            .ok()
                            .map(|d| d.and_time(NaiveTime::MIN))
                    })
            }
            TypeCandidate::TimestampAuto => DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_utc())
                .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok())
                .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").ok()),
            _ => None,
        }
    }
}

fn parse_date_days(value: &str) -> Option<i32> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    Some((date - epoch).num_days() as i32)
}

/// Outcome of probing one column: either a committed candidate or the
/// normal, expected "leave it as text" state. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDecision {
    Committed(TypeCandidate),
    Undetermined,
}

/// A typed rendition of the loaded table plus its display schema.
pub struct InferredTable {
    pub batch: RecordBatch,
    pub schema: Vec<ColumnInfo>,
}

/// Probes text columns and rebuilds them as typed arrays.
pub struct TypeInferenceEngine {
    tolerance: f64,
}

impl TypeInferenceEngine {
    pub fn new() -> Self {
        Self {
            tolerance: ERROR_TOLERANCE,
        }
    }

    /// Narrow every text column that qualifies. Infallible by design:
    /// anything that cannot be confidently typed stays text, and an
    /// internal inconsistency degrades to the original all-text batch.
    pub fn infer_table(&self, batch: &RecordBatch) -> InferredTable {
        let mut fields = Vec::with_capacity(batch.num_columns());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
        let mut columns = Vec::with_capacity(batch.num_columns());

        for (idx, field) in batch.schema().fields().iter().enumerate() {
            let array = batch.column(idx);
            let text = array.as_any().downcast_ref::<StringArray>();
            let decision = text
                .map(|values| self.decide_column(values))
                .unwrap_or(TypeDecision::Undetermined);

            match (text, decision) {
                (Some(values), TypeDecision::Committed(candidate)) => {
                    let column_type = candidate.target_type();
                    tracing::debug!(
                        column = field.name().as_str(),
                        committed = column_type.as_str(),
                        "column type committed"
                    );
                    arrays.push(build_typed_array(candidate, values));
                    fields.push(Field::new(field.name(), arrow_type(column_type), true));
                    columns.push(ColumnInfo::new(field.name().clone(), column_type));
                }
                _ => {
                    arrays.push(array.clone());
                    fields.push(field.as_ref().clone());
                    columns.push(ColumnInfo::new(field.name().clone(), ColumnType::Text));
                }
            }
        }

        let schema = Arc::new(Schema::new(fields));
        match RecordBatch::try_new(schema, arrays) {
            Ok(typed) => InferredTable {
                batch: typed,
                schema: columns,
            },
            Err(e) => {
                tracing::warn!("type narrowing produced an invalid batch, keeping text schema: {e}");
                InferredTable {
                    batch: batch.clone(),
                    schema: batch
                        .schema()
                        .fields()
                        .iter()
                        .map(|f| ColumnInfo::new(f.name().clone(), ColumnType::Text))
                        .collect(),
                }
            }
        }
    }

    /// Probe one column against the candidate priority order.
    pub fn decide_column(&self, values: &StringArray) -> TypeDecision {
        let total = values
            .iter()
            .flatten()
            .filter(|v| !v.trim().is_empty())
            .count();
        if total == 0 {
            return TypeDecision::Undetermined;
        }

        for candidate in CANDIDATES {
            let unparseable = values
                .iter()
                .flatten()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .filter(|v| !candidate.parses(v))
                .count();
            if (unparseable as f64) / (total as f64) < self.tolerance {
                return TypeDecision::Committed(*candidate);
            }
        }
        TypeDecision::Undetermined
    }
}

impl Default for TypeInferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a text column with the committed candidate's own tolerant
/// parse: blank and unparseable cells become null.
fn build_typed_array(candidate: TypeCandidate, values: &StringArray) -> ArrayRef {
    let cells = values
        .iter()
        .map(|v| v.map(str::trim).filter(|v| !v.is_empty()));
    match candidate.target_type() {
        ColumnType::Timestamp => {
            let array: TimestampMicrosecondArray = cells
                .map(|v| {
                    v.and_then(|s| candidate.parse_timestamp(s))
                        .map(|dt| dt.and_utc().timestamp_micros())
                })
                .collect();
            Arc::new(array)
        }
        ColumnType::Date => {
            let array: Date32Array = cells.map(|v| v.and_then(parse_date_days)).collect();
            Arc::new(array)
        }
        ColumnType::Double => {
            let array: Float64Array = cells.map(|v| v.and_then(|s| s.parse::<f64>().ok())).collect();
            Arc::new(array)
        }
        ColumnType::Integer => {
            let array: Int64Array = cells.map(|v| v.and_then(|s| s.parse::<i64>().ok())).collect();
            Arc::new(array)
        }
        ColumnType::Text => Arc::new(values.clone()),
    }
}

fn arrow_type(column_type: ColumnType) -> DataType {
    match column_type {
        ColumnType::Text => DataType::Utf8,
        ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        ColumnType::Date => DataType::Date32,
        ColumnType::Double => DataType::Float64,
        ColumnType::Integer => DataType::Int64,
    }
}
