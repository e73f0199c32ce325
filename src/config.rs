//! Process configuration from the environment
//!
//! `.env` is loaded first; real environment variables win.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::OrchestrationError;
use crate::notify::EmailConfig;
use crate::provider::OpenAiConfig;
use crate::render::GraphConfig;
use crate::retry::RetryConfig;
use crate::Result;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai: OpenAiConfig,
    pub retry: RetryConfig,
    /// Vector store attached as a file-search tool when set.
    pub vector_store_id: Option<String>,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub port: u16,
    pub graph: GraphConfig,
    /// `None` selects the log-only notifier.
    pub email: Option<EmailConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut openai = OpenAiConfig::new(get("OPENAI_API_KEY").unwrap_or_default());
        if let Some(model) = get("OPENAI_MODEL") {
            openai = openai.with_model(model);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            openai = openai.with_base_url(url);
        }
        openai = openai.with_timeout(Duration::from_secs(parse_or(
            get("OPENAI_TIMEOUT_SECS"),
            "OPENAI_TIMEOUT_SECS",
            60,
        )?));

        let retry = RetryConfig {
            max_retries: parse_or(get("OPENAI_MAX_RETRIES"), "OPENAI_MAX_RETRIES", 3)?,
            ..RetryConfig::default()
        };

        let jwt_secret = get("JWT_SECRET")
            .ok_or_else(|| OrchestrationError::Config("JWT_SECRET must be set".to_string()))?;

        let port = parse_or(get("PORT").or_else(|| get("API_PORT")), "PORT", 8000)?;

        let defaults = GraphConfig::default();
        let graph = GraphConfig {
            output_dir: get("GRAPH_OUTPUT_DIR").map(PathBuf::from).unwrap_or(defaults.output_dir),
            url_prefix: get("GRAPH_URL_PREFIX").unwrap_or(defaults.url_prefix),
            dot_binary: get("DOT_BINARY").unwrap_or(defaults.dot_binary),
            timeout: defaults.timeout,
        };

        let email = match (get("EMAIL_API_URL"), get("EMAIL_API_KEY"), get("EMAIL_FROM")) {
            (Some(api_url), Some(api_key), Some(from)) => Some(EmailConfig { api_url, api_key, from }),
            (None, None, None) => None,
            _ => {
                return Err(OrchestrationError::Config(
                    "EMAIL_API_URL, EMAIL_API_KEY and EMAIL_FROM must be set together".to_string(),
                ))
            }
        };

        Ok(Self {
            openai,
            retry,
            vector_store_id: get("OPENAI_VECTOR_STORE_ID"),
            database_url: get("DATABASE_URL").or_else(|| get("POSTGRES_URL")),
            jwt_secret,
            port,
            graph,
            email,
        })
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| OrchestrationError::Config(format!("{} has invalid value '{}'", key, value))),
    }
}
