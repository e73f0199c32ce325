//! OpenAI Responses API client
//!
//! Sends prompts under a server-side conversation and requests strict
//! JSON-schema structured output. Uses a long-lived reqwest::Client for
//! connection pooling.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{error, info};

use super::{ConversationFactory, ModelProvider, ProviderRequest};
use crate::error::InvocationError;
use crate::Result;

/// Provider configuration, constructed explicitly and injected.
#[derive(Clone)]
pub struct OpenAiConfig {
    api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Reusable OpenAI client (connection-pooled)
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    fn ensure_key(&self) -> std::result::Result<(), InvocationError> {
        if self.config.has_api_key() {
            Ok(())
        } else {
            Err(InvocationError::Auth("OPENAI_API_KEY not configured".to_string()))
        }
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<String, InvocationError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!("OpenAI request to {} failed: {}", path, e);
                InvocationError::Transport(e.to_string())
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| InvocationError::Transport(e.to_string()))?;

        if !status.is_success() {
            error!("OpenAI error response ({}): {}", status, text);
            return Err(classify_status(status, error_message(&text)));
        }

        Ok(text)
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn respond(
        &self,
        request: &ProviderRequest<'_>,
    ) -> std::result::Result<Value, InvocationError> {
        self.ensure_key()?;

        let body = ResponsesRequest {
            model: &self.config.model,
            input: request.input,
            instructions: request.instructions,
            conversation: request.conversation_ref,
            text: request.schema.map(|kind| TextOptions {
                format: ResponseFormat {
                    kind: "json_schema",
                    name: kind.as_str(),
                    schema: kind.json_schema(),
                    strict: true,
                },
            }),
            tools: request
                .knowledge_base
                .map(|id| {
                    vec![Tool::FileSearch {
                        vector_store_ids: vec![id],
                    }]
                })
                .unwrap_or_default(),
        };

        info!(
            model = %self.config.model,
            schema = ?request.schema,
            "Calling OpenAI Responses API"
        );

        let raw = self.post("responses", &body).await?;
        let text = extract_output_text(&raw)?;

        info!("OpenAI response received ({} chars)", text.len());

        match request.schema {
            Some(kind) => serde_json::from_str(&text).map_err(|e| {
                InvocationError::SchemaMismatch(format!("{} output is not JSON: {}", kind, e))
            }),
            None => Ok(Value::String(text)),
        }
    }
}

#[async_trait]
impl ConversationFactory for OpenAiProvider {
    async fn create_conversation(&self) -> std::result::Result<String, InvocationError> {
        self.ensure_key()?;

        let raw = self.post("conversations", &serde_json::json!({})).await?;
        let created: ConversationCreated = serde_json::from_str(&raw)
            .map_err(|e| InvocationError::Provider(format!("Unexpected conversation payload: {}", e)))?;

        info!(conversation = %created.id, "Created provider conversation");
        Ok(created.id)
    }
}

/// Map a non-success status onto the invocation error taxonomy.
fn classify_status(status: StatusCode, message: String) -> InvocationError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => InvocationError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => InvocationError::RateLimit(message),
        StatusCode::REQUEST_TIMEOUT => InvocationError::Transport(message),
        s if s.is_server_error() => InvocationError::Transport(format!("{}: {}", s, message)),
        _ => InvocationError::Provider(message),
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|env| env.error)
        .map(|err| err.message)
        .unwrap_or_else(|| body.to_string())
}

/// Pull the first `output_text` out of a Responses API payload.
fn extract_output_text(raw: &str) -> std::result::Result<String, InvocationError> {
    let response: ResponsesResponse = serde_json::from_str(raw)
        .map_err(|e| InvocationError::Provider(format!("OpenAI parse error: {}", e)))?;

    if let Some(err) = response.error {
        return Err(InvocationError::Provider(err.message));
    }

    for item in response.output {
        let OutputItem::Message { content } = item else {
            continue;
        };
        for part in content {
            match part {
                OutputContent::OutputText { text } => return Ok(text),
                OutputContent::Refusal { refusal } => {
                    return Err(InvocationError::Provider(format!("Model refused: {}", refusal)))
                }
                OutputContent::Other => {}
            }
        }
    }

    Err(InvocationError::Provider("Empty response from OpenAI".to_string()))
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
    conversation: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<TextOptions<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool<'a>>,
}

#[derive(Debug, Serialize)]
struct TextOptions<'a> {
    format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    name: &'a str,
    schema: Value,
    strict: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Tool<'a> {
    FileSearch { vector_store_ids: Vec<&'a str> },
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<OutputContent>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputContent {
    OutputText { text: String },
    Refusal { refusal: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ConversationCreated {
    id: String,
}
