pub mod export;
pub mod history;
pub mod query;
pub mod upload;

use std::sync::Arc;

use crate::config::Config;
use crate::services::llm_service::SqlGenerator;
use crate::services::session_registry::SessionRegistry;
use crate::storage::HistoryStore;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub history: Arc<HistoryStore>,
    pub generator: Arc<dyn SqlGenerator>,
    pub config: Config,
}
