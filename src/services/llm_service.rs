use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::json;

use crate::api::middleware::AppError;
use crate::config::Config;
use crate::models::dataset::{ColumnInfo, Row};
use crate::models::query::SqlSuggestion;

/// Boundary to the untrusted NL-to-SQL generator.
///
/// The query engine consumes only the `sql` field of a suggestion; the
/// rest of the trait covers the conversational extras around it.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    /// Turn a natural-language question into a structured SQL suggestion.
    async fn suggest_query(
        &self,
        question: &str,
        schema: &[ColumnInfo],
        sample: &[Row],
        row_count: usize,
    ) -> Result<SqlSuggestion, AppError>;

    /// Plain-English summary of a result set.
    async fn summarize(
        &self,
        question: &str,
        sql: &str,
        rows: &[Row],
    ) -> Result<String, AppError>;

    /// Starter questions offered right after upload.
    async fn initial_questions(
        &self,
        schema: &[ColumnInfo],
        sample: &[Row],
    ) -> Result<Vec<String>, AppError>;
}

/// LLM-backed generator speaking the OpenAI-compatible chat completions
/// protocol.
pub struct LlmService {
    api_url: String,
    model: String,
    api_key: Option<String>,
    http_client: HttpClient,
}

impl LlmService {
    pub fn new(config: &Config) -> Self {
        Self {
            api_url: config.llm.api_url.clone(),
            model: config.llm.model.clone(),
            api_key: config.llm.api_key.clone(),
            http_client: HttpClient::new(),
        }
    }

    fn build_system_prompt(schema: &[ColumnInfo], sample: &[Row], row_count: usize) -> String {
        let schema_json =
            serde_json::to_string_pretty(schema).unwrap_or_else(|_| "[]".to_string());
        let sample_json =
            serde_json::to_string_pretty(sample).unwrap_or_else(|_| "[]".to_string());

        format!(
            r#"You are a SQL analyst. The user uploaded a CSV available as a table called 'data'.

Schema: {schema_json}
Sample (first rows): {sample_json}
Total rows: {row_count}

Respond ONLY with this JSON and nothing else - no extra text, no markdown backticks:
{{
  "sql": "SELECT ...",
  "explanation": "one sentence",
  "chart_type": "bar or line or pie or none",
  "x_key": "column name or null",
  "y_key": "column name or null",
  "chart_title": "short title",
  "suggested_followups": ["q1", "q2", "q3"]
}}

Rules:
- Always query the table named 'data'
- Use standard SQL with double-quoted identifiers
- Alias all aggregated columns clearly (e.g. AS total_revenue)
- suggested_followups must be 3 natural follow-up questions"#
        )
    }

    /// Single chat-completions round trip; returns the assistant content.
    async fn chat(&self, messages: serde_json::Value, temperature: f64) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.api_url.trim_end_matches('/'));
        let mut request = self.http_client.post(&url).json(&json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
        }));

        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        } else {
            return Err(AppError::LlmService(
                "LLM API key not configured".to_string(),
            ));
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::LlmService(format!("failed to call LLM service: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AppError::LlmService(format!(
                "LLM service returned error {}: {}",
                status, error_text
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::LlmService(format!("failed to parse LLM response: {}", e)))?;

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                AppError::LlmService("LLM response contains no message content".to_string())
            })?;

        Ok(content.to_string())
    }

    /// Strip markdown code fences the model sometimes wraps around JSON.
    fn strip_markdown_fences(raw: &str) -> &str {
        raw.trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    }

    fn parse_suggestion(raw: &str) -> Result<SqlSuggestion, AppError> {
        serde_json::from_str(Self::strip_markdown_fences(raw)).map_err(|e| {
            AppError::LlmService(format!("generator returned malformed suggestion JSON: {}", e))
        })
    }

    /// Flatten the question list, tolerating models that return objects
    /// instead of plain strings.
    fn parse_question_list(raw: &str) -> Result<Vec<String>, AppError> {
        let items: Vec<serde_json::Value> =
            serde_json::from_str(Self::strip_markdown_fences(raw)).map_err(|e| {
                AppError::LlmService(format!("generator returned malformed question list: {}", e))
            })?;

        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Object(map) => map
                    .into_iter()
                    .next()
                    .map(|(_, v)| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())),
                other => Some(other.to_string()),
            })
            .collect())
    }
}

#[async_trait]
impl SqlGenerator for LlmService {
    async fn suggest_query(
        &self,
        question: &str,
        schema: &[ColumnInfo],
        sample: &[Row],
        row_count: usize,
    ) -> Result<SqlSuggestion, AppError> {
        let messages = json!([
            {"role": "system", "content": Self::build_system_prompt(schema, sample, row_count)},
            {"role": "user", "content": question},
        ]);
        let raw = self.chat(messages, 0.0).await?;
        Self::parse_suggestion(&raw)
    }

    async fn summarize(
        &self,
        question: &str,
        sql: &str,
        rows: &[Row],
    ) -> Result<String, AppError> {
        let rows_json = serde_json::to_string(rows).unwrap_or_else(|_| "[]".to_string());
        let prompt = format!(
            "Question: {question}\nSQL: {sql}\nResults: {rows_json}\n\
             Write a 2-3 sentence plain-English business insight. Be specific with numbers."
        );
        let messages = json!([{"role": "user", "content": prompt}]);
        let raw = self.chat(messages, 1.0).await?;
        Ok(raw.trim().to_string())
    }

    async fn initial_questions(
        &self,
        schema: &[ColumnInfo],
        sample: &[Row],
    ) -> Result<Vec<String>, AppError> {
        let schema_json = serde_json::to_string(schema).unwrap_or_else(|_| "[]".to_string());
        let sample_json = serde_json::to_string(&sample.iter().take(2).collect::<Vec<_>>())
            .unwrap_or_else(|_| "[]".to_string());
        let prompt = format!(
            "Schema: {schema_json}\nSample: {sample_json}\n\
             Return ONLY a JSON array of 6 strings. Each string is a question a business user \
             would ask about this data. No markdown, no extra text, just a flat JSON array."
        );
        let messages = json!([{"role": "user", "content": prompt}]);
        let raw = self.chat(messages, 1.0).await?;
        Self::parse_question_list(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markdown_fences() {
        assert_eq!(
            LlmService::strip_markdown_fences("```json\n{\"sql\": \"SELECT 1\"}\n```"),
            "{\"sql\": \"SELECT 1\"}"
        );
        assert_eq!(LlmService::strip_markdown_fences("plain"), "plain");
    }

    #[test]
    fn test_parse_suggestion_with_fences() {
        let raw = "```json\n{\"sql\": \"SELECT COUNT(*) FROM data\", \"chart_type\": \"pie\"}\n```";
        let suggestion = LlmService::parse_suggestion(raw).unwrap();
        assert_eq!(suggestion.sql, "SELECT COUNT(*) FROM data");
    }

    #[test]
    fn test_parse_suggestion_rejects_garbage() {
        assert!(LlmService::parse_suggestion("not json at all").is_err());
    }

    #[test]
    fn test_parse_question_list_flattens_objects() {
        let raw = r#"["How many rows?", {"question": "What is the total?"}, 42]"#;
        let questions = LlmService::parse_question_list(raw).unwrap();
        assert_eq!(
            questions,
            vec!["How many rows?", "What is the total?", "42"]
        );
    }

    #[test]
    fn test_system_prompt_mentions_table_and_rows() {
        let schema = vec![ColumnInfo::new(
            "amount",
            crate::models::dataset::ColumnType::Double,
        )];
        let prompt = LlmService::build_system_prompt(&schema, &[], 10);
        assert!(prompt.contains("'data'"));
        assert!(prompt.contains("Total rows: 10"));
        assert!(prompt.contains("amount"));
    }
}
