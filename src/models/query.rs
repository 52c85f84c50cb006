use serde::{Deserialize, Serialize};

use super::dataset::Row;

/// Chart rendering hint attached to a generated query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    #[default]
    None,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
            ChartType::None => "none",
        }
    }

    /// Lenient parse for values read back from storage.
    pub fn parse(value: &str) -> Self {
        match value {
            "bar" => ChartType::Bar,
            "line" => ChartType::Line,
            "pie" => ChartType::Pie,
            _ => ChartType::None,
        }
    }
}

/// Structured suggestion produced by the NL-to-SQL generator.
///
/// Only `sql` is consumed by the query engine; the rest is presentation
/// metadata passed through to the caller. Every field except `sql`
/// defaults, since the generator is untrusted and may omit keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlSuggestion {
    pub sql: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub chart_type: ChartType,
    #[serde(default)]
    pub x_key: Option<String>,
    #[serde(default)]
    pub y_key: Option<String>,
    #[serde(default)]
    pub chart_title: Option<String>,
    #[serde(default)]
    pub suggested_followups: Vec<String>,
}

/// Natural-language query request.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub session_id: String,
    pub question: String,
}

/// Raw SQL request against an existing session.
#[derive(Debug, Deserialize)]
pub struct SqlRequest {
    pub session_id: String,
    pub sql: String,
}

/// Response for a natural-language query.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub sql: String,
    pub explanation: Option<String>,
    pub chart_type: ChartType,
    pub x_key: Option<String>,
    pub y_key: Option<String>,
    pub chart_title: Option<String>,
    pub suggested_followups: Vec<String>,
    pub rows: Vec<Row>,
    pub total_rows: usize,
    pub summary: Option<String>,
}

/// Response for a raw SQL query.
#[derive(Debug, Serialize)]
pub struct SqlResponse {
    pub rows: Vec<Row>,
    pub total_rows: usize,
}

/// Export request: the caller sends back the rows it wants rendered.
#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub format: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub sql: Option<String>,
    pub rows: Vec<Row>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggestion_defaults_missing_fields() {
        let parsed: SqlSuggestion =
            serde_json::from_str(r#"{"sql": "SELECT 1"}"#).unwrap();
        assert_eq!(parsed.sql, "SELECT 1");
        assert_eq!(parsed.chart_type, ChartType::None);
        assert!(parsed.suggested_followups.is_empty());
        assert!(parsed.x_key.is_none());
    }

    #[test]
    fn test_suggestion_full_payload() {
        let parsed: SqlSuggestion = serde_json::from_str(
            r#"{
                "sql": "SELECT region, SUM(sales) AS total FROM data GROUP BY region",
                "explanation": "Totals sales per region",
                "chart_type": "bar",
                "x_key": "region",
                "y_key": "total",
                "chart_title": "Sales by region",
                "suggested_followups": ["Which region grew fastest?"]
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.chart_type, ChartType::Bar);
        assert_eq!(parsed.x_key.as_deref(), Some("region"));
        assert_eq!(parsed.suggested_followups.len(), 1);
    }
}
