// Session Registry
//
// Maps opaque session ids to isolated engine sessions. Each uploaded
// dataset gets its own SessionContext; no two sessions ever share one.
// The map lives for the whole process with no eviction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use datafusion::prelude::SessionContext;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::api::middleware::AppError;
use crate::models::dataset::{ColumnInfo, DatasetSummary, Row};
use crate::services::engine::inference::TypeInferenceEngine;
use crate::services::engine::normalizer::QueryNormalizer;
use crate::services::engine::sanitizer::ResultSanitizer;
use crate::services::engine::{executor, session, EngineConfig};
use crate::validation::SqlValidator;

/// One uploaded dataset bound to one exclusive engine connection.
pub struct DatasetSession {
    pub id: String,
    ctx: SessionContext,
    pub schema: Vec<ColumnInfo>,
    pub sample: Vec<Row>,
    pub row_count: usize,
    /// Serializes queries against this session; one in-flight query at a
    /// time, callers queue here instead of racing the engine.
    query_gate: Mutex<()>,
}

impl std::fmt::Debug for DatasetSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetSession")
            .field("id", &self.id)
            .field("schema", &self.schema)
            .field("sample", &self.sample)
            .field("row_count", &self.row_count)
            .finish()
    }
}

impl DatasetSession {
    /// Normalize, guard, execute with single-shot repair, sanitize.
    pub async fn run_query(
        &self,
        sql: &str,
        query_timeout: Duration,
    ) -> Result<Vec<Row>, AppError> {
        let _guard = self.query_gate.lock().await;

        let normalized = QueryNormalizer::normalize(sql);
        tracing::debug!(session_id = %self.id, sql = %normalized, "normalized query");
        SqlValidator::validate_select_only(&normalized)?;

        let batches = executor::execute_with_repair(&self.ctx, &normalized, query_timeout).await?;
        ResultSanitizer::sanitize_batches(&batches)
            .map_err(|e| AppError::Internal(format!("failed to sanitize result rows: {}", e)))
    }
}

/// Process-wide registry of live dataset sessions.
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<DatasetSession>>>>,
    engine_config: EngineConfig,
    inference: TypeInferenceEngine,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            engine_config: EngineConfig::default(),
            inference: TypeInferenceEngine::new(),
        }
    }

    /// Load raw CSV bytes into a fresh, isolated session: all-text load,
    /// type inference pass, typed table registered as `data`, session
    /// stored under a new unique id.
    pub async fn create(&self, bytes: &[u8]) -> Result<DatasetSummary, AppError> {
        let ctx = session::create_session_context(&self.engine_config);

        let text_batch = session::read_all_text(bytes)
            .map_err(|e| AppError::Dataset(format!("could not read CSV: {}", e)))?;
        let inferred = self.inference.infer_table(&text_batch);

        let row_count = inferred.batch.num_rows();
        let sample_batch = inferred.batch.slice(0, row_count.min(3));
        let sample = ResultSanitizer::sanitize_batches(&[sample_batch])
            .map_err(|e| AppError::Internal(format!("failed to render sample rows: {}", e)))?;

        let schema = inferred.schema;
        session::register_dataset(&ctx, inferred.batch)
            .map_err(|e| AppError::Dataset(format!("could not register dataset: {}", e)))?;

        let id = Uuid::new_v4().to_string();
        let dataset_session = Arc::new(DatasetSession {
            id: id.clone(),
            ctx,
            schema: schema.clone(),
            sample: sample.clone(),
            row_count,
            query_gate: Mutex::new(()),
        });

        self.sessions
            .write()
            .await
            .insert(id.clone(), dataset_session);

        tracing::info!(
            session_id = %id,
            columns = schema.len(),
            rows = row_count,
            "dataset loaded"
        );

        Ok(DatasetSummary {
            session_id: id,
            schema,
            sample,
            row_count,
        })
    }

    /// Look up a live session. Unknown ids are the one caller-recoverable
    /// error in the system: the caller re-uploads.
    pub async fn get(&self, id: &str) -> Result<Arc<DatasetSession>, AppError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))
    }

    /// Number of live sessions. The map is unbounded; this is the only
    /// growth signal exposed.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dataset::ColumnType;
    use serde_json::Value as JsonValue;

    const TIMEOUT: Duration = Duration::from_secs(30);

    const ORDERS_CSV: &[u8] = b"order_date,amount,category\n\
01/15/2023,10.5,widgets\n\
02/20/2023,20,gadgets\n\
03/25/2023,7.25,widgets\n\
04/01/2023,13,gizmos\n";

    #[tokio::test]
    async fn test_create_types_columns_and_samples_rows() {
        let registry = SessionRegistry::new();
        let summary = registry.create(ORDERS_CSV).await.unwrap();

        assert_eq!(summary.row_count, 4);
        assert_eq!(summary.sample.len(), 3);
        let types: Vec<ColumnType> = summary.schema.iter().map(|c| c.column_type).collect();
        assert_eq!(
            types,
            vec![ColumnType::Timestamp, ColumnType::Double, ColumnType::Text]
        );
        assert_eq!(registry.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_session_id_is_session_not_found() {
        let registry = SessionRegistry::new();
        let err = registry.get("no-such-session").await.unwrap_err();
        assert!(matches!(err, AppError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_run_query_counts_rows() {
        let registry = SessionRegistry::new();
        let summary = registry.create(ORDERS_CSV).await.unwrap();
        let session = registry.get(&summary.session_id).await.unwrap();

        let rows = session
            .run_query("SELECT COUNT(*) AS n FROM data", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["n"], JsonValue::String("4".to_string()));
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let registry = SessionRegistry::new();
        let first = registry.create(ORDERS_CSV).await.unwrap();
        let second = registry.create(b"name\nalice\n").await.unwrap();
        assert_ne!(first.session_id, second.session_id);

        let session = registry.get(&second.session_id).await.unwrap();
        let rows = session
            .run_query("SELECT COUNT(*) AS n FROM data", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(rows[0]["n"], JsonValue::String("1".to_string()));
    }

    #[tokio::test]
    async fn test_month_query_against_near_miss_text_column() {
        // One dirty value in ten pushes order_date over the 5% tolerance,
        // so it stays text; the forced temporal cast still lets a MONTH
        // query run.
        let mut csv = String::from("order_date\n");
        for _ in 0..9 {
            csv.push_str("01/15/2023\n");
        }
        csv.push_str("not-a-date\n");

        let registry = SessionRegistry::new();
        let summary = registry.create(csv.as_bytes()).await.unwrap();
        assert_eq!(summary.schema[0].column_type, ColumnType::Text);

        let session = registry.get(&summary.session_id).await.unwrap();
        let rows = session
            .run_query("SELECT MONTH(`order_date`) AS m FROM data LIMIT 1", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_cell_becomes_null_in_timestamp_column() {
        // Nine parseable dates and one blank: the blank is excluded from
        // the probe, the column commits to Timestamp, and the blank cell
        // surfaces as null.
        let mut csv = String::from("order_date,amount\n");
        for _ in 0..9 {
            csv.push_str("01/15/2023,1\n");
        }
        csv.push_str(",2\n");

        let registry = SessionRegistry::new();
        let summary = registry.create(csv.as_bytes()).await.unwrap();
        assert_eq!(summary.schema[0].column_type, ColumnType::Timestamp);

        let session = registry.get(&summary.session_id).await.unwrap();
        let rows = session
            .run_query(
                "SELECT order_date FROM data WHERE order_date IS NULL",
                TIMEOUT,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["order_date"], JsonValue::Null);
    }

    #[tokio::test]
    async fn test_non_select_statements_are_refused() {
        let registry = SessionRegistry::new();
        let summary = registry.create(ORDERS_CSV).await.unwrap();
        let session = registry.get(&summary.session_id).await.unwrap();

        let err = session
            .run_query("DROP TABLE data", TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSql(_)));
    }
}
