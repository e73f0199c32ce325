//! Role Chat Orchestrator
//!
//! Routes authenticated chat messages to an LLM provider and branches on the
//! user's role:
//! - interviewer: structured accept/reject decision, emailed once concluded
//! - generate code: Python code plus per-function CFG/DFG graphs
//! - optimize code: rewritten code with reasoning
//! - assistant: plain text
//!
//! REQUEST LOOP:
//! GUARD → PROMPT → INVOKE → INTERPRET → RENDER → PERSIST → NOTIFY

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod interview;
pub mod invoker;
pub mod models;
pub mod notify;
pub mod prompt;
pub mod provider;
pub mod render;
pub mod retry;
pub mod schema;
pub mod service;
pub mod store;

pub use error::{OrchestrationError, Result};

// Re-export common types
pub use models::*;
pub use service::ChatService;
