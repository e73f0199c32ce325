//! Model invocation
//!
//! Sends a prompt under the user's conversation, asks the provider for the
//! shape implied by the schema and returns the typed response. Never touches
//! persisted state.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::InvocationError;
use crate::models::{SchemaKind, StructuredResponse};
use crate::provider::{ModelProvider, ProviderRequest};
use crate::retry::{with_retry, RetryConfig};

#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(
        &self,
        prompt: &str,
        conversation_ref: &str,
        schema: SchemaKind,
    ) -> Result<StructuredResponse, InvocationError>;
}

/// Invoker backed by a `ModelProvider`, retrying transient failures.
pub struct ProviderInvoker {
    provider: Arc<dyn ModelProvider>,
    retry: RetryConfig,
    knowledge_base: Option<String>,
}

impl ProviderInvoker {
    pub fn new(provider: Arc<dyn ModelProvider>, retry: RetryConfig) -> Self {
        Self {
            provider,
            retry,
            knowledge_base: None,
        }
    }

    pub fn with_knowledge_base(mut self, knowledge_base: Option<String>) -> Self {
        self.knowledge_base = knowledge_base.filter(|id| !id.trim().is_empty());
        self
    }
}

#[async_trait]
impl ModelInvoker for ProviderInvoker {
    async fn invoke(
        &self,
        prompt: &str,
        conversation_ref: &str,
        schema: SchemaKind,
    ) -> Result<StructuredResponse, InvocationError> {
        let request = ProviderRequest {
            instructions: None,
            input: prompt,
            conversation_ref,
            schema: Some(schema),
            knowledge_base: self.knowledge_base.as_deref(),
        };

        debug!(schema = %schema, conversation = conversation_ref, "Invoking model");

        let value = with_retry("model invocation", &self.retry, || {
            self.provider.respond(&request)
        })
        .await?;

        let response = schema.parse(value)?;
        info!(schema = %schema, "Model invocation succeeded");

        Ok(response)
    }
}
