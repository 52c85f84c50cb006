use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub history: HistoryConfig,
    pub llm: LlmConfig,
    pub engine: EngineSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    pub database_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// Per-query execution bound in seconds.
    pub query_timeout_secs: u64,
    /// Cap on rows returned in one response body.
    pub max_response_rows: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("history.database_url", "./history.db")?
            .set_default("llm.api_url", "https://api.groq.com/openai/v1")?
            .set_default("llm.model", "llama-3.3-70b-versatile")?
            .set_default("engine.query_timeout_secs", 30)?
            .set_default("engine.max_response_rows", 500)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?;

        // Load from environment variables
        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(3000))?;
        }

        if let Ok(database_url) = env::var("HISTORY_DATABASE_URL") {
            builder = builder.set_override("history.database_url", database_url)?;
        }

        if let Ok(api_url) = env::var("LLM_API_URL") {
            builder = builder.set_override("llm.api_url", api_url)?;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY").or_else(|_| env::var("GROQ_API_KEY")) {
            builder = builder.set_override("llm.api_key", Some(api_key))?;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            builder = builder.set_override("llm.model", model)?;
        }

        if let Ok(timeout) = env::var("QUERY_TIMEOUT_SECS") {
            builder = builder
                .set_override("engine.query_timeout_secs", timeout.parse::<u64>().unwrap_or(30))?;
        }

        if let Ok(max_rows) = env::var("MAX_RESPONSE_ROWS") {
            builder = builder
                .set_override("engine.max_response_rows", max_rows.parse::<u64>().unwrap_or(500))?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Ok(log_style) = env::var("RUST_LOG_STYLE") {
            builder = builder.set_override("logging.style", log_style)?;
        }

        // Try to load from .env file
        let _ = dotenv::dotenv();

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
