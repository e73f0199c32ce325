//! Model provider boundary
//!
//! Provider-specific request shaping lives behind `ModelProvider`.
//! The orchestration core only sees parsed JSON or an `InvocationError`.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::InvocationError;
use crate::models::SchemaKind;

pub mod openai;
pub use openai::{OpenAiConfig, OpenAiProvider};

/// One call to the provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    pub instructions: Option<&'a str>,
    pub input: &'a str,
    /// Continuity token; the provider keeps multi-turn context under it.
    pub conversation_ref: &'a str,
    /// When set, the provider must parse its own output into this shape.
    pub schema: Option<SchemaKind>,
    /// Optional knowledge-base reference (vector store id).
    pub knowledge_base: Option<&'a str>,
}

/// Trait for the external LLM provider
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Returns the structured JSON object when a schema was requested,
    /// otherwise the raw text as a JSON string.
    async fn respond(&self, request: &ProviderRequest<'_>) -> Result<Value, InvocationError>;
}

/// Creates conversation continuity tokens for new users.
#[async_trait]
pub trait ConversationFactory: Send + Sync {
    async fn create_conversation(&self) -> Result<String, InvocationError>;
}
