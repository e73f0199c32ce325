//! Core data models for the chat orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::OrchestrationError;

//
// ================= Enums =================
//

/// Role assigned to a user account. Selects prompt framing and response shape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    #[serde(rename = "interviewer")]
    Interviewer,
    #[serde(rename = "generate code")]
    GenerateCode,
    #[serde(rename = "optimize code")]
    OptimizeCode,
    #[serde(rename = "assistant")]
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Interviewer => "interviewer",
            Role::GenerateCode => "generate code",
            Role::OptimizeCode => "optimize code",
            Role::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = OrchestrationError;

    /// Blank means "unspecified" and maps to the plain assistant.
    /// Anything else that is not a known role is rejected.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "" | "assistant" | "default" => Ok(Role::Assistant),
            "interviewer" => Ok(Role::Interviewer),
            "generate code" => Ok(Role::GenerateCode),
            "optimize code" => Ok(Role::OptimizeCode),
            _ => Err(OrchestrationError::UnknownRole(raw.to_string())),
        }
    }
}

/// Decision field as returned by the model for the interviewer role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Decision {
    #[serde(rename = "N/A", alias = "pending")]
    Pending,
    #[serde(rename = "1", alias = "accept")]
    Accept,
    #[serde(rename = "0", alias = "reject")]
    Reject,
}

impl Decision {
    pub fn code(&self) -> &'static str {
        match self {
            Decision::Pending => "N/A",
            Decision::Accept => "1",
            Decision::Reject => "0",
        }
    }
}

/// Terminal result of an interview.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Outcome {
    #[serde(rename = "1")]
    Accepted,
    #[serde(rename = "0")]
    Rejected,
}

impl Outcome {
    pub fn code(&self) -> &'static str {
        match self {
            Outcome::Accepted => "1",
            Outcome::Rejected => "0",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "1" => Some(Outcome::Accepted),
            "0" => Some(Outcome::Rejected),
            _ => None,
        }
    }
}

/// Interview lifecycle: `Open` until the model concludes, then terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InterviewState {
    Open,
    Accepted,
    Rejected,
}

/// Structured response shape requested from the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    PlainText,
    InterviewDecision,
    CodeWithGraphs,
    Optimization,
}

impl SchemaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::PlainText => "plain_text",
            SchemaKind::InterviewDecision => "interview_decision",
            SchemaKind::CodeWithGraphs => "code_with_graphs",
            SchemaKind::Optimization => "optimization",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "plain_text" => Some(SchemaKind::PlainText),
            "interview_decision" => Some(SchemaKind::InterviewDecision),
            "code_with_graphs" => Some(SchemaKind::CodeWithGraphs),
            "optimization" => Some(SchemaKind::Optimization),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum GraphKind {
    Cfg,
    Dfg,
}

impl GraphKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphKind::Cfg => "cfg",
            GraphKind::Dfg => "dfg",
        }
    }
}

//
// ================= Structured Response =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphSpec {
    pub function_name: String,
    pub dot_source: String,
}

/// Older provider responses carried one CFG and one DFG per turn instead of
/// one per function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphLayout {
    #[default]
    PerFunction,
    Single,
}

/// Parsed provider output, one variant per schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredResponse {
    PlainText {
        response: String,
    },
    InterviewDecision {
        decision: Decision,
        response: String,
    },
    CodeWithGraphs {
        python_code: String,
        reasoning: String,
        cfg_graphs: Vec<GraphSpec>,
        dfg_graphs: Vec<GraphSpec>,
        layout: GraphLayout,
    },
    Optimization {
        python_code: String,
        reasoning: String,
    },
}

impl StructuredResponse {
    pub fn kind(&self) -> SchemaKind {
        match self {
            StructuredResponse::PlainText { .. } => SchemaKind::PlainText,
            StructuredResponse::InterviewDecision { .. } => SchemaKind::InterviewDecision,
            StructuredResponse::CodeWithGraphs { .. } => SchemaKind::CodeWithGraphs,
            StructuredResponse::Optimization { .. } => SchemaKind::Optimization,
        }
    }
}

//
// ================= Conversation =================
//

/// Rendered graph references attached to a turn.
///
/// `Single` is the legacy one-graph-per-turn shape; new turns are keyed by
/// function name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ArtifactRefs {
    Single(String),
    PerFunction(BTreeMap<String, String>),
}

impl ArtifactRefs {
    pub fn get(&self, function_name: &str) -> Option<&str> {
        match self {
            ArtifactRefs::Single(path) => Some(path.as_str()),
            ArtifactRefs::PerFunction(map) => map.get(function_name).map(String::as_str),
        }
    }
}

/// One persisted exchange. Append-only, ordered by `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub turn_id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    pub response: String,
    /// Shape the turn was produced under; later role changes do not reinterpret it.
    pub kind: SchemaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfg_artifacts: Option<ArtifactRefs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dfg_artifacts: Option<ArtifactRefs>,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(user_id: Uuid, message: String, response: String, kind: SchemaKind) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            user_id,
            message,
            response,
            kind,
            decision: None,
            python_code: None,
            reasoning: None,
            cfg_artifacts: None,
            dfg_artifacts: None,
            created_at: Utc::now(),
        }
    }
}

//
// ================= Users =================
//

/// Stored user account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Free-form role string as stored; validated per request.
    pub role: String,
    /// `"1"` / `"0"` once the interview concluded.
    pub decision: Option<String>,
    /// Provider conversation continuity token. Never regenerated.
    pub conversation_ref: String,
    pub created_at: DateTime<Utc>,
}

/// Authenticated caller, as seen by the orchestration core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    pub state: InterviewState,
    pub conversation_ref: String,
}

impl From<UserRecord> for CurrentUser {
    fn from(record: UserRecord) -> Self {
        Self {
            state: InterviewState::from_decision_code(record.decision.as_deref()),
            id: record.id,
            username: record.username,
            email: record.email,
            role: record.role,
            conversation_ref: record.conversation_ref,
        }
    }
}

//
// ================= HTTP Payload =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Code {
        language: String,
        code: String,
    },
    Image {
        url: String,
        function_name: String,
        graph: GraphKind,
    },
}

/// Client-facing result of one chat request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatPayload {
    pub role: Role,
    pub kind: SchemaKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    pub content: Vec<ContentBlock>,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Accepted => "accepted",
            Outcome::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}
