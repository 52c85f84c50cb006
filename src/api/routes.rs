use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::api::handlers::{export, history, query, upload, AppState};
use crate::config::Config;
use crate::services::llm_service::LlmService;
use crate::services::session_registry::SessionRegistry;
use crate::storage::HistoryStore;

/// Uploads are whole CSV files; allow well past axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Create router with application state
pub fn create_router_with_state(history: Arc<HistoryStore>, config: Config) -> Router {
    let state = AppState {
        registry: Arc::new(SessionRegistry::new()),
        history,
        generator: Arc::new(LlmService::new(&config)),
        config,
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/upload", post(upload::upload_dataset))
        .route("/api/query", post(query::execute_question))
        .route("/api/sql", post(query::execute_sql))
        .route("/api/history/{session_id}", get(history::list_history))
        .route("/api/export", post(export::export_results))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
