use serde::{Deserialize, Serialize};

/// Logical column types the inference pass can commit to.
///
/// A freshly loaded dataset is all `Text`; the inference engine narrows
/// individual columns to at most one of the other types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Text,
    Timestamp,
    Date,
    Double,
    Integer,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Date => "DATE",
            ColumnType::Double => "DOUBLE",
            ColumnType::Integer => "INTEGER",
        }
    }
}

/// One column of a loaded dataset: name plus the type the inference pass
/// settled on. Order within a schema follows the source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// A transport-safe result row: column name to `null` or display string.
/// serde_json's preserve_order feature keeps keys in column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Summary returned to the caller after a dataset is loaded and typed.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub session_id: String,
    pub schema: Vec<ColumnInfo>,
    pub sample: Vec<Row>,
    pub row_count: usize,
}
