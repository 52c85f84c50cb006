use std::time::Duration;

use axum::{extract::State, Json};

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;
use crate::models::history::HistoryEntry;
use crate::models::query::{QueryRequest, QueryResponse, SqlRequest, SqlResponse};

/// Answer a natural-language question: generate SQL, run it through the
/// normalize/execute/repair pipeline, summarize, and record history.
pub async fn execute_question(
    State(state): State<AppState>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(AppError::Validation("question cannot be empty".to_string()));
    }

    let session = state.registry.get(&payload.session_id).await?;

    let suggestion = state
        .generator
        .suggest_query(question, &session.schema, &session.sample, session.row_count)
        .await?;
    tracing::info!(session_id = %payload.session_id, sql = %suggestion.sql, "generated SQL");

    let timeout = Duration::from_secs(state.config.engine.query_timeout_secs);
    let mut rows = session.run_query(&suggestion.sql, timeout).await?;
    let total_rows = rows.len();

    // Summaries are best-effort decoration on top of the result set.
    let summary = match state
        .generator
        .summarize(question, &suggestion.sql, &rows[..total_rows.min(20)])
        .await
    {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!("result summary unavailable: {}", e);
            None
        }
    };

    let entry = HistoryEntry::new(
        payload.session_id.clone(),
        question.to_string(),
        suggestion.sql.clone(),
        summary.clone(),
        total_rows,
        suggestion.chart_type,
    );
    if let Err(e) = state.history.save(&entry).await {
        tracing::warn!("failed to record query history: {}", e);
    }

    rows.truncate(state.config.engine.max_response_rows);

    Ok(Json(QueryResponse {
        sql: suggestion.sql,
        explanation: suggestion.explanation,
        chart_type: suggestion.chart_type,
        x_key: suggestion.x_key,
        y_key: suggestion.y_key,
        chart_title: suggestion.chart_title,
        suggested_followups: suggestion.suggested_followups,
        rows,
        total_rows,
        summary,
    }))
}

/// Run caller-supplied SQL against an existing session.
pub async fn execute_sql(
    State(state): State<AppState>,
    Json(payload): Json<SqlRequest>,
) -> Result<Json<SqlResponse>, AppError> {
    let sql = payload.sql.trim();
    if sql.is_empty() {
        return Err(AppError::Validation("SQL query cannot be empty".to_string()));
    }

    let session = state.registry.get(&payload.session_id).await?;

    let timeout = Duration::from_secs(state.config.engine.query_timeout_secs);
    let mut rows = session.run_query(sql, timeout).await?;
    let total_rows = rows.len();
    rows.truncate(state.config.engine.max_response_rows);

    Ok(Json(SqlResponse { rows, total_rows }))
}
