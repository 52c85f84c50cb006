use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Result as SqliteResult};
use tokio::sync::Mutex;

use crate::models::history::HistoryEntry;
use crate::models::query::ChartType;

/// SQLite storage for query history
/// Uses tokio::Mutex for async-friendly locking
pub struct HistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl HistoryStore {
    /// Create a new history store instance
    pub async fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        // Handle SQLite URL format (sqlite:./path or sqlite://path)
        let path_str = db_path.as_ref().to_string_lossy();
        let clean_path: &str = if path_str.starts_with("sqlite:") {
            let mut cleaned = path_str.trim_start_matches("sqlite:");
            cleaned = cleaned.trim_start_matches("//");
            cleaned
        } else {
            path_str.as_ref()
        };

        let conn = Connection::open(clean_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Initialize database schema
    async fn init_schema(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS query_history (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                question TEXT NOT NULL,
                sql TEXT NOT NULL,
                summary TEXT,
                row_count INTEGER NOT NULL,
                chart_type TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_query_history_session
             ON query_history(session_id, created_at DESC)",
            [],
        )?;

        Ok(())
    }

    /// Persist one executed query.
    pub async fn save(&self, entry: &HistoryEntry) -> SqliteResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO query_history
                (id, session_id, question, sql, summary, row_count, chart_type, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            rusqlite::params![
                entry.id,
                entry.session_id,
                entry.question,
                entry.sql,
                entry.summary,
                entry.row_count as i64,
                entry.chart_type.as_str(),
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Latest entries for one session, newest first.
    pub async fn list_for_session(
        &self,
        session_id: &str,
        limit: usize,
    ) -> SqliteResult<Vec<HistoryEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, session_id, question, sql, summary, row_count, chart_type, created_at
            FROM query_history
            WHERE session_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(
            rusqlite::params![session_id, limit as i64],
            |row| {
                let chart_type: String = row.get(6)?;
                let created_at: String = row.get(7)?;
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    question: row.get(2)?,
                    sql: row.get(3)?,
                    summary: row.get(4)?,
                    row_count: row.get::<_, i64>(5)? as usize,
                    chart_type: ChartType::parse(&chart_type),
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            },
        )?;

        rows.collect()
    }
}
