//! Persistence layer
//!
//! Conversation turns, user accounts and interview decisions.
//! In-memory for development and tests; Postgres in production.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{ConversationTurn, Outcome, UserRecord};
use crate::Result;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Result of writing a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionWrite {
    /// No decision was part of the write.
    Unchanged,
    /// The decision was recorded by this write.
    Recorded,
    /// The same decision was already on record; nothing changed.
    AlreadyRecorded,
}

impl DecisionWrite {
    /// Only a fresh record triggers the notification.
    pub fn should_notify(&self) -> bool {
        matches!(self, DecisionWrite::Recorded)
    }
}

/// Trait for conversation persistence
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append_turn(&self, user_id: Uuid, turn: &ConversationTurn) -> Result<()>;

    /// Turns for a user, oldest first.
    async fn get_history(&self, user_id: Uuid) -> Result<Vec<ConversationTurn>>;

    /// Record a terminal decision. Repeating the same decision is a no-op;
    /// a conflicting one fails with `AlreadyConcluded`.
    async fn set_decision(&self, user_id: Uuid, outcome: Outcome) -> Result<DecisionWrite>;

    /// Append the turn and record the decision as one atomic unit.
    async fn commit_turn(
        &self,
        user_id: Uuid,
        turn: &ConversationTurn,
        decision: Option<Outcome>,
    ) -> Result<DecisionWrite>;
}

/// Trait for user account lookup
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>>;
    async fn insert_user(&self, user: &UserRecord) -> Result<()>;
}

/// Both store handles, backed by one backend.
#[derive(Clone)]
pub struct Stores {
    pub conversations: Arc<dyn ConversationStore>,
    pub users: Arc<dyn UserStore>,
}

/// Postgres when a URL is given and the pool can be built, otherwise in-memory.
pub fn open(database_url: Option<&str>) -> Stores {
    if let Some(url) = database_url {
        match PgStore::connect_lazy(url, 5) {
            Ok(store) => {
                let store = Arc::new(store);
                return Stores {
                    conversations: store.clone(),
                    users: store,
                };
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Store backend: in-memory");
    let store = Arc::new(InMemoryStore::new());
    Stores {
        conversations: store.clone(),
        users: store,
    }
}
