use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;

const HISTORY_LIMIT: usize = 20;

/// Latest queries recorded for a session, newest first.
pub async fn list_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let entries = state
        .history
        .list_for_session(&session_id, HISTORY_LIMIT)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(serde_json::json!({ "history": entries })))
}
