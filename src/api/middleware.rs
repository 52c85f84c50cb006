use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::engine::QueryError;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Unknown or stale session id; the caller must re-upload.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Execution failed in a class known to be unrepairable.
    #[error("Query rejected: {0}")]
    QueryRejected(String),

    /// Execution failed and the single repair retry (where one applied)
    /// also failed; carries the original engine message.
    #[error("Query failed: {0}")]
    QueryRepairExhausted(String),

    #[error("Invalid SQL: {0}")]
    InvalidSql(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("LLM service error: {0}")]
    LlmService(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match self {
            AppError::SessionNotFound(id) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new(
                    "SESSION_NOT_FOUND",
                    format!("Session {} not found. Please re-upload your file.", id),
                ),
            ),
            AppError::QueryRejected(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("QUERY_REJECTED", msg),
            ),
            AppError::QueryRepairExhausted(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("QUERY_FAILED", format!("Query failed: {}", msg)),
            ),
            AppError::InvalidSql(msg) => {
                let enhanced_msg = format!("{} Only SELECT queries are allowed.", msg);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorDetail::new("INVALID_SQL", enhanced_msg),
                )
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg),
            ),
            AppError::Dataset(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("DATASET_ERROR", msg),
            ),
            AppError::LlmService(msg) => {
                let enhanced_msg = if msg.contains("not configured") {
                    format!("{} Please set LLM_API_KEY to use natural language queries.", msg)
                } else {
                    msg
                };
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorDetail::new("LLM_SERVICE_ERROR", enhanced_msg),
                )
            }
            AppError::Database(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", msg),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_detail,
        });

        (status, body).into_response()
    }
}

/// Map terminal engine failures onto the reported taxonomy.
impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Rejected(msg) => AppError::QueryRejected(msg),
            QueryError::RepairExhausted(msg) => AppError::QueryRepairExhausted(msg),
        }
    }
}

/// Convert anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Convert rusqlite::Error to AppError
impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
    }
}
