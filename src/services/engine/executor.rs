// Execution + Repair Loop
//
// Runs normalized SQL against a session's engine context with a bounded
// timeout, classifies failures from the engine's error message, applies at
// most one corrective rewrite, and maps residual failure to a reported
// error. The attempt state has exactly two variants, so a second retry is
// unrepresentable.

use std::time::Duration;

use datafusion::arrow::record_batch::RecordBatch;
use datafusion::prelude::*;
use thiserror::Error;
use tokio::time::timeout;

use super::normalizer::QueryNormalizer;

/// Terminal failure of a query once the repair loop is done with it.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Execution failed and the single repair retry (where one applied)
    /// also failed; carries the original engine message.
    #[error("query failed: {0}")]
    RepairExhausted(String),
    /// Execution failed in a class known to be unrepairable.
    #[error("query rejected: {0}")]
    Rejected(String),
}

/// How a failure message is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureClass {
    /// Mentions a temporal-extraction construct: rewrite and retry once.
    RepairableTemporal,
    /// Timed out: retry the same text once.
    RetryAsIs,
    /// Function/type resolution failure: report immediately.
    Unresolvable,
    /// Anything else: report immediately.
    Other,
}

const TEMPORAL_CONSTRUCTS: &[&str] = &[
    "date_part",
    "extract",
    "to_char",
    "date_trunc",
    "try_to_timestamp",
];

fn classify(message: &str) -> FailureClass {
    let lower = message.to_lowercase();
    if lower.contains("timed out") {
        return FailureClass::RetryAsIs;
    }
    if TEMPORAL_CONSTRUCTS.iter().any(|f| lower.contains(f)) {
        return FailureClass::RepairableTemporal;
    }
    if lower.contains("no function matches")
        || lower.contains("coercion")
        || lower.contains("invalid function")
    {
        return FailureClass::Unresolvable;
    }
    FailureClass::Other
}

/// One attempt in the repair state machine.
enum Attempt {
    Normalized(String),
    Repaired { sql: String, original_error: String },
}

impl Attempt {
    fn sql(&self) -> &str {
        match self {
            Attempt::Normalized(sql) => sql,
            Attempt::Repaired { sql, .. } => sql,
        }
    }
}

/// Execute `sql`, repairing and retrying at most once. Every failure not
/// resolved by the single retry surfaces as a [`QueryError`]; nothing is
/// swallowed.
pub async fn execute_with_repair(
    ctx: &SessionContext,
    sql: &str,
    query_timeout: Duration,
) -> Result<Vec<RecordBatch>, QueryError> {
    let mut attempt = Attempt::Normalized(sql.to_string());

    loop {
        match run_once(ctx, attempt.sql(), query_timeout).await {
            Ok(batches) => return Ok(batches),
            Err(message) => match attempt {
                Attempt::Normalized(original_sql) => match classify(&message) {
                    FailureClass::RepairableTemporal => {
                        let repaired = QueryNormalizer::repair_temporal_arguments(&original_sql);
                        if repaired == original_sql {
                            // nothing left to rewrite
                            return Err(QueryError::RepairExhausted(message));
                        }
                        tracing::info!(error = %message, "retrying query with forced temporal casts");
                        attempt = Attempt::Repaired {
                            sql: repaired,
                            original_error: message,
                        };
                    }
                    FailureClass::RetryAsIs => {
                        tracing::warn!("query timed out, retrying once");
                        attempt = Attempt::Repaired {
                            sql: original_sql,
                            original_error: message,
                        };
                    }
                    FailureClass::Unresolvable => return Err(QueryError::Rejected(message)),
                    FailureClass::Other => return Err(QueryError::RepairExhausted(message)),
                },
                Attempt::Repaired { original_error, .. } => {
                    return Err(QueryError::RepairExhausted(original_error))
                }
            },
        }
    }
}

async fn run_once(
    ctx: &SessionContext,
    sql: &str,
    query_timeout: Duration,
) -> Result<Vec<RecordBatch>, String> {
    let run = async {
        let df = ctx.sql(sql).await.map_err(|e| e.to_string())?;
        df.collect().await.map_err(|e| e.to_string())
    };
    match timeout(query_timeout, run).await {
        Ok(result) => result,
        Err(_) => Err(format!(
            "query timed out after {}s",
            query_timeout.as_secs()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::engine::session::{
        create_session_context, read_all_text, register_dataset, EngineConfig,
    };
    use datafusion::arrow::array::Array;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn context_with_data() -> SessionContext {
        let ctx = create_session_context(&EngineConfig::default());
        let batch = read_all_text(
            b"order_date,amount,category\n01/15/2023,10.5,widgets\n02/20/2023,20,gadgets\n",
        )
        .unwrap();
        register_dataset(&ctx, batch).unwrap();
        ctx
    }

    #[test]
    fn test_classification_order() {
        assert_eq!(
            classify("Error during planning: Invalid function 'no_such_fn'"),
            FailureClass::Unresolvable
        );
        // temporal mention wins even when the message also talks about
        // function resolution
        assert_eq!(
            classify("No function matches the given name and argument types 'date_part(Utf8, Utf8)'"),
            FailureClass::RepairableTemporal
        );
        assert_eq!(classify("query timed out after 30s"), FailureClass::RetryAsIs);
        assert_eq!(
            classify("Schema error: No field named missing"),
            FailureClass::Other
        );
    }

    #[tokio::test]
    async fn test_successful_query_passes_through() {
        let ctx = context_with_data();
        let batches = execute_with_repair(&ctx, "SELECT COUNT(*) AS n FROM data", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(batches[0].num_rows(), 1);
    }

    #[tokio::test]
    async fn test_unknown_function_is_rejected_without_retry() {
        let ctx = context_with_data();
        let err = execute_with_repair(&ctx, "SELECT uppercasex(category) FROM data", TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_unrepairable_temporal_failure_reports_original_error() {
        // The argument is a numeric literal, so the narrow rewrite has no
        // bare identifier to wrap and the original message is reported.
        let ctx = context_with_data();
        let err = execute_with_repair(&ctx, "SELECT date_part('month', 123) FROM data", TIMEOUT)
            .await
            .unwrap_err();
        match err {
            QueryError::RepairExhausted(message) => {
                assert!(message.to_lowercase().contains("date_part"));
            }
            other => panic!("expected RepairExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_normalized_month_query_runs_against_text_column() {
        // The normalizer's output shape for MONTH(`category`): the column
        // is text, TRY_CAST yields nulls, and the query still succeeds.
        let ctx = context_with_data();
        let sql = QueryNormalizer::normalize("SELECT MONTH(`category`) AS m FROM data");
        let batches = execute_with_repair(&ctx, &sql, TIMEOUT).await.unwrap();
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 2);
        assert!(batch.column(0).is_null(0));
    }
}
