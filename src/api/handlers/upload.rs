use axum::{
    extract::{Multipart, State},
    Json,
};

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;

/// Upload a CSV file, load it into a fresh session, and return the typed
/// schema plus starter questions.
pub async fn upload_dataset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart payload: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("upload.csv").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("could not read upload: {}", e)))?;
            upload = Some((filename, bytes.to_vec()));
            break;
        }
    }

    let (filename, bytes) = upload
        .ok_or_else(|| AppError::Validation("multipart field 'file' is required".to_string()))?;
    if bytes.is_empty() {
        return Err(AppError::Validation("uploaded file is empty".to_string()));
    }

    tracing::info!(file = %filename, size = bytes.len(), "loading dataset");
    let summary = state.registry.create(&bytes).await?;

    // Starter questions are best-effort; the upload must not fail because
    // the generator is down.
    let suggestions = match state
        .generator
        .initial_questions(&summary.schema, &summary.sample)
        .await
    {
        Ok(questions) => questions,
        Err(e) => {
            tracing::warn!("initial suggestions unavailable: {}", e);
            Vec::new()
        }
    };

    Ok(Json(serde_json::json!({
        "session_id": summary.session_id,
        "schema": summary.schema,
        "sample": summary.sample,
        "row_count": summary.row_count,
        "suggestions": suggestions,
    })))
}
