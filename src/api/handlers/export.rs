use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;
use crate::models::query::ExportRequest;
use crate::services::export_service::ExportService;

/// Render a result set the caller already holds as a downloadable file.
pub async fn export_results(
    State(_state): State<AppState>,
    Json(payload): Json<ExportRequest>,
) -> Result<Response, AppError> {
    match payload.format.as_str() {
        "csv" => {
            let data = ExportService::to_csv(&payload.rows)
                .map_err(|e| AppError::Internal(format!("csv export failed: {}", e)))?;
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=results.csv",
                    ),
                ],
                data,
            )
                .into_response())
        }
        other => Err(AppError::Validation(format!(
            "unsupported export format: {}",
            other
        ))),
    }
}
