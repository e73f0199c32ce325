//! Chat service
//!
//! Wires the collaborators for one request: guard, prompt, invoke, interpret,
//! render, persist, notify.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::OrchestrationError;
use crate::interpreter::{interpret, RenderResult, UserContext};
use crate::interview::ensure_open;
use crate::invoker::ModelInvoker;
use crate::models::{
    ArtifactRefs, ChatPayload, ConversationTurn, CurrentUser, Decision, Outcome, Role, SchemaKind,
    UserRecord,
};
use crate::notify::{dispatch, Notifier};
use crate::prompt::{build_prompt, combine_upload, greeting};
use crate::provider::ConversationFactory;
use crate::render::GraphRenderer;
use crate::schema::select_schema;
use crate::store::{ConversationStore, DecisionWrite, UserStore};
use crate::Result;

/// One entry of `GET /history`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// `None` only for the synthetic welcome entry.
    pub message: Option<String>,
    pub response: String,
    pub kind: SchemaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfg_image_url: Option<ArtifactRefs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dfg_image_url: Option<ArtifactRefs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    fn welcome(role: Role) -> Self {
        Self {
            message: None,
            response: greeting(role).to_string(),
            kind: SchemaKind::PlainText,
            decision: None,
            python_code: None,
            reasoning: None,
            cfg_image_url: None,
            dfg_image_url: None,
            created_at: None,
        }
    }
}

impl From<ConversationTurn> for HistoryEntry {
    fn from(turn: ConversationTurn) -> Self {
        Self {
            message: Some(turn.message),
            response: turn.response,
            kind: turn.kind,
            decision: turn.decision,
            python_code: turn.python_code,
            reasoning: turn.reasoning,
            cfg_image_url: turn.cfg_artifacts,
            dfg_image_url: turn.dfg_artifacts,
            created_at: Some(turn.created_at),
        }
    }
}

/// `GET /me`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub username: String,
    pub email: String,
    pub role: String,
    /// `"1"` / `"0"` once concluded, otherwise null.
    pub decision: Option<String>,
}

pub struct ChatService {
    invoker: Arc<dyn ModelInvoker>,
    store: Arc<dyn ConversationStore>,
    renderer: Arc<dyn GraphRenderer>,
    notifier: Arc<dyn Notifier>,
}

impl ChatService {
    pub fn new(
        invoker: Arc<dyn ModelInvoker>,
        store: Arc<dyn ConversationStore>,
        renderer: Arc<dyn GraphRenderer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            invoker,
            store,
            renderer,
            notifier,
        }
    }

    /// Handle one chat message for `user`.
    pub async fn chat(&self, user: &CurrentUser, query: &str) -> Result<ChatPayload> {
        ensure_open(user.state)?;

        let role: Role = user.role.parse()?;
        if query.trim().is_empty() {
            return Err(OrchestrationError::InvalidRequest("Query must not be empty".to_string()));
        }

        info!(user_id = %user.id, role = %role, "Handling chat request");

        let prompt = build_prompt(query, role);
        let schema = select_schema(role);
        let response = self
            .invoker
            .invoke(&prompt, &user.conversation_ref, schema)
            .await?;

        let ctx = UserContext {
            user_id: user.id,
            conversation_ref: &user.conversation_ref,
            state: user.state,
            query,
        };
        let mut interpretation = interpret(response, role, &ctx)?;

        let mut results = Vec::with_capacity(interpretation.side_effects.renders.len());
        for request in interpretation.side_effects.renders.clone() {
            let outcome = self
                .renderer
                .render(&request.dot_source, &request.namespace, &request.name)
                .await;
            results.push(RenderResult { request, outcome });
        }
        interpretation.attach_renders(results);

        let plan = &interpretation.persistence;
        let write = self
            .store
            .commit_turn(user.id, &plan.turn, plan.decision)
            .await
            .map_err(|e| {
                error!(user_id = %user.id, "Failed to persist chat turn: {}", e);
                e
            })?;

        if let Some(outcome) = interpretation.side_effects.notify {
            self.notify_if_recorded(user, outcome, write);
        }

        Ok(interpretation.payload)
    }

    /// Combine an uploaded file with the optional query and chat with it.
    pub async fn upload(
        &self,
        user: &CurrentUser,
        query: Option<&str>,
        file: &[u8],
    ) -> Result<ChatPayload> {
        let file_text = std::str::from_utf8(file).map_err(|_| {
            OrchestrationError::InvalidRequest("Uploaded file must be UTF-8 text".to_string())
        })?;

        if file_text.trim().is_empty() {
            return Err(OrchestrationError::InvalidRequest("Uploaded file is empty".to_string()));
        }

        let combined = combine_upload(query, file_text);
        self.chat(user, &combined).await
    }

    /// Stored turns oldest first, or the role greeting when there are none.
    pub async fn history(&self, user: &CurrentUser) -> Result<Vec<HistoryEntry>> {
        let turns = self.store.get_history(user.id).await?;

        if turns.is_empty() {
            let role: Role = user.role.parse()?;
            return Ok(vec![HistoryEntry::welcome(role)]);
        }

        Ok(turns.into_iter().map(HistoryEntry::from).collect())
    }

    pub fn me(&self, user: &CurrentUser) -> Profile {
        Profile {
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            decision: user.state.outcome().map(|o| o.code().to_string()),
        }
    }

    /// Record an outcome outside the chat path. Safe to repeat.
    pub async fn conclude_interview(
        &self,
        user: &CurrentUser,
        outcome: Outcome,
    ) -> Result<DecisionWrite> {
        let write = self.store.set_decision(user.id, outcome).await?;
        self.notify_if_recorded(user, outcome, write);
        Ok(write)
    }

    fn notify_if_recorded(&self, user: &CurrentUser, outcome: Outcome, write: DecisionWrite) {
        if write.should_notify() {
            info!(user_id = %user.id, %outcome, "Interview concluded");
            dispatch(
                self.notifier.clone(),
                user.email.clone(),
                outcome,
                user.username.clone(),
            );
        } else {
            warn!(user_id = %user.id, %outcome, "Decision already on record, skipping notification");
        }
    }
}

/// Create a user bound to a fresh provider conversation.
pub async fn provision_user(
    users: &dyn UserStore,
    conversations: &dyn ConversationFactory,
    username: &str,
    email: &str,
    role: Role,
) -> Result<UserRecord> {
    if users.find_by_username(username).await?.is_some() {
        return Err(OrchestrationError::InvalidRequest(format!(
            "User {} already exists",
            username
        )));
    }

    let conversation_ref = conversations.create_conversation().await?;

    let record = UserRecord {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: email.to_string(),
        role: role.as_str().to_string(),
        decision: None,
        conversation_ref,
        created_at: Utc::now(),
    };
    users.insert_user(&record).await?;

    info!(user = %record.username, role = %role, "User provisioned");
    Ok(record)
}
