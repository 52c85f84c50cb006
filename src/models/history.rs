use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::query::ChartType;

/// One executed natural-language query, as persisted to history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub session_id: String,
    pub question: String,
    pub sql: String,
    pub summary: Option<String>,
    pub row_count: usize,
    pub chart_type: ChartType,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        session_id: String,
        question: String,
        sql: String,
        summary: Option<String>,
        row_count: usize,
        chart_type: ChartType,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id,
            question,
            sql,
            summary,
            row_count,
            chart_type,
            created_at: Utc::now(),
        }
    }
}
