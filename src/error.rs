//! Error types for the chat orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Request Boundary Errors
    // =============================

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("This interview has already been concluded")]
    AlreadyConcluded,

    #[error("Unknown role: {0:?}")]
    UnknownRole(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =============================
    // Collaborator Errors
    // =============================

    #[error("Model invocation failed: {0}")]
    Invocation(#[from] InvocationError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single call to the model provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    /// Connection, timeout or provider-side 5xx.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider rejected credentials: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    /// The provider answered but the payload does not match the requested schema.
    #[error("response did not match schema: {0}")]
    SchemaMismatch(String),

    /// Raw error text reported by the provider.
    #[error("provider error: {0}")]
    Provider(String),
}

impl InvocationError {
    /// Transient failures are worth another attempt; everything else fails fast.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RateLimit(_))
    }
}

/// Graph rendering failure. Recovered locally, never fails a turn.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("invalid DOT source: {0}")]
    InvalidSource(String),

    #[error("renderer unavailable: {0}")]
    Unavailable(String),

    #[error("render failed: {0}")]
    Failed(String),

    #[error("render timed out after {0}s")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
}
