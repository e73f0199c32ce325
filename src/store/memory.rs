//! In-memory store for development and tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ConversationStore, DecisionWrite, UserStore};
use crate::error::OrchestrationError;
use crate::models::{ConversationTurn, Outcome, UserRecord};
use crate::Result;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserRecord>,
    turns_by_user: HashMap<Uuid, Vec<ConversationTurn>>,
}

/// Both tables sit behind one lock so `commit_turn` is atomic.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user(&self, user_id: Uuid) -> Option<UserRecord> {
        self.tables.read().await.users.get(&user_id).cloned()
    }
}

/// Decide what recording `outcome` over `current` does, without mutating.
pub(crate) fn decision_effect(current: Option<&str>, outcome: Outcome) -> Result<DecisionWrite> {
    match current.and_then(Outcome::from_code) {
        None => Ok(DecisionWrite::Recorded),
        Some(existing) if existing == outcome => Ok(DecisionWrite::AlreadyRecorded),
        Some(_) => Err(OrchestrationError::AlreadyConcluded),
    }
}

/// Chat turns may only be appended while no terminal decision is stored.
pub(crate) fn ensure_stored_open(current: Option<&str>) -> Result<()> {
    match current.and_then(Outcome::from_code) {
        Some(_) => Err(OrchestrationError::AlreadyConcluded),
        None => Ok(()),
    }
}

impl Tables {
    fn check_turn(&self, user_id: Uuid, turn: &ConversationTurn) -> Result<()> {
        if !self.users.contains_key(&user_id) {
            return Err(OrchestrationError::Persistence(format!("Unknown user {}", user_id)));
        }

        let duplicate = self
            .turns_by_user
            .get(&user_id)
            .is_some_and(|turns| turns.iter().any(|t| t.turn_id == turn.turn_id));
        if duplicate {
            return Err(OrchestrationError::Persistence(format!(
                "Turn {} already exists",
                turn.turn_id
            )));
        }

        Ok(())
    }

    fn check_decision(&self, user_id: Uuid, outcome: Outcome) -> Result<DecisionWrite> {
        let user = self
            .users
            .get(&user_id)
            .ok_or_else(|| OrchestrationError::Persistence(format!("Unknown user {}", user_id)))?;
        decision_effect(user.decision.as_deref(), outcome)
    }

    /// The stored decision, not the caller's snapshot, decides whether the interview is over.
    fn check_open(&self, user_id: Uuid) -> Result<()> {
        let user = self
            .users
            .get(&user_id)
            .ok_or_else(|| OrchestrationError::Persistence(format!("Unknown user {}", user_id)))?;
        ensure_stored_open(user.decision.as_deref())
    }

    fn push_turn(&mut self, user_id: Uuid, turn: &ConversationTurn) {
        self.turns_by_user
            .entry(user_id)
            .or_insert_with(Vec::new)
            .push(turn.clone());
    }

    fn record_decision(&mut self, user_id: Uuid, outcome: Outcome) {
        if let Some(user) = self.users.get_mut(&user_id) {
            user.decision = Some(outcome.code().to_string());
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn append_turn(&self, user_id: Uuid, turn: &ConversationTurn) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check_turn(user_id, turn)?;
        tables.push_turn(user_id, turn);
        Ok(())
    }

    async fn get_history(&self, user_id: Uuid) -> Result<Vec<ConversationTurn>> {
        let tables = self.tables.read().await;

        let mut turns = tables
            .turns_by_user
            .get(&user_id)
            .cloned()
            .unwrap_or_default();

        // Stable: equal timestamps keep insertion order
        turns.sort_by_key(|t| t.created_at);
        Ok(turns)
    }

    async fn set_decision(&self, user_id: Uuid, outcome: Outcome) -> Result<DecisionWrite> {
        let mut tables = self.tables.write().await;
        let effect = tables.check_decision(user_id, outcome)?;
        if effect == DecisionWrite::Recorded {
            tables.record_decision(user_id, outcome);
        }
        Ok(effect)
    }

    async fn commit_turn(
        &self,
        user_id: Uuid,
        turn: &ConversationTurn,
        decision: Option<Outcome>,
    ) -> Result<DecisionWrite> {
        let mut tables = self.tables.write().await;

        tables.check_turn(user_id, turn)?;
        tables.check_open(user_id)?;
        let effect = match decision {
            Some(_) => DecisionWrite::Recorded,
            None => DecisionWrite::Unchanged,
        };

        tables.push_turn(user_id, turn);
        if let (Some(outcome), DecisionWrite::Recorded) = (decision, effect) {
            tables.record_decision(user_id, outcome);
        }

        Ok(effect)
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn insert_user(&self, user: &UserRecord) -> Result<()> {
        let mut tables = self.tables.write().await;

        let conflict = tables.users.values().any(|u| {
            u.id == user.id
                || u.username == user.username
                || u.email == user.email
                || u.conversation_ref == user.conversation_ref
        });
        if conflict {
            return Err(OrchestrationError::Persistence(format!(
                "User {} or email {} already exists",
                user.username, user.email
            )));
        }

        tables.users.insert(user.id, user.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArtifactRefs, Decision, SchemaKind};
    use chrono::{Duration, Utc};
    use std::collections::BTreeMap;

    fn user(name: &str) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            username: name.to_string(),
            email: format!("{}@example.com", name),
            role: "interviewer".to_string(),
            decision: None,
            conversation_ref: format!("conv_{}", name),
            created_at: Utc::now(),
        }
    }

    async fn store_with(user: &UserRecord) -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert_user(user).await.unwrap();
        store
    }

    fn turns_for_every_variant(user_id: Uuid) -> Vec<ConversationTurn> {
        let start = Utc::now();

        let plain = ConversationTurn::new(user_id, "hi".into(), "hello".into(), SchemaKind::PlainText);

        let mut interview =
            ConversationTurn::new(user_id, "ready".into(), "Great".into(), SchemaKind::InterviewDecision);
        interview.decision = Some(Decision::Pending);

        let mut code =
            ConversationTurn::new(user_id, "add".into(), "adds".into(), SchemaKind::CodeWithGraphs);
        code.python_code = Some("def add(a,b): return a+b".into());
        code.reasoning = Some("adds".into());
        code.cfg_artifacts = Some(ArtifactRefs::PerFunction(BTreeMap::from([(
            "add".to_string(),
            "/graphs/add_cfg.png".to_string(),
        )])));
        code.dfg_artifacts = Some(ArtifactRefs::Single("/graphs/dfg.png".into()));

        let mut optimization =
            ConversationTurn::new(user_id, "opt".into(), "renamed".into(), SchemaKind::Optimization);
        optimization.python_code = Some("intVar_1 = 1".into());
        optimization.reasoning = Some("renamed".into());

        let mut turns = vec![plain, interview, code, optimization];
        for (i, turn) in turns.iter_mut().enumerate() {
            turn.created_at = start + Duration::milliseconds(i as i64);
        }
        turns
    }

    #[tokio::test]
    async fn test_history_round_trip_preserves_order_and_fields() {
        let u = user("ada");
        let store = store_with(&u).await;
        let turns = turns_for_every_variant(u.id);

        for turn in &turns {
            store.append_turn(u.id, turn).await.unwrap();
        }

        let history = store.get_history(u.id).await.unwrap();
        assert_eq!(history, turns);
    }

    #[tokio::test]
    async fn test_duplicate_turn_is_rejected() {
        let u = user("bob");
        let store = store_with(&u).await;
        let turn = ConversationTurn::new(u.id, "q".into(), "a".into(), SchemaKind::PlainText);

        store.append_turn(u.id, &turn).await.unwrap();
        let err = store.append_turn(u.id, &turn).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Persistence(_)));
        assert_eq!(store.get_history(u.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_decision_is_idempotent_and_final() {
        let u = user("cy");
        let store = store_with(&u).await;

        assert_eq!(store.set_decision(u.id, Outcome::Accepted).await.unwrap(), DecisionWrite::Recorded);
        assert_eq!(
            store.set_decision(u.id, Outcome::Accepted).await.unwrap(),
            DecisionWrite::AlreadyRecorded
        );
        assert!(matches!(
            store.set_decision(u.id, Outcome::Rejected).await,
            Err(OrchestrationError::AlreadyConcluded)
        ));
        assert_eq!(store.user(u.id).await.unwrap().decision.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_commit_turn_is_all_or_nothing() {
        let u = user("dee");
        let store = store_with(&u).await;
        let turn = ConversationTurn::new(u.id, "q".into(), "a".into(), SchemaKind::InterviewDecision);
        store.append_turn(u.id, &turn).await.unwrap();

        // Same turn again: the decision must not be written either
        let result = store.commit_turn(u.id, &turn, Some(Outcome::Rejected)).await;
        assert!(result.is_err());
        assert_eq!(store.user(u.id).await.unwrap().decision, None);

        let fresh = ConversationTurn::new(u.id, "q2".into(), "bye".into(), SchemaKind::InterviewDecision);
        let effect = store.commit_turn(u.id, &fresh, Some(Outcome::Rejected)).await.unwrap();
        assert_eq!(effect, DecisionWrite::Recorded);
        assert_eq!(store.get_history(u.id).await.unwrap().len(), 2);
        assert_eq!(store.user(u.id).await.unwrap().decision.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_commit_turn_refuses_concluded_interview() {
        let u = user("fay");
        let store = store_with(&u).await;
        store.set_decision(u.id, Outcome::Rejected).await.unwrap();

        // Caller still believes the interview is open
        for decision in [None, Some(Outcome::Rejected), Some(Outcome::Accepted)] {
            let turn = ConversationTurn::new(u.id, "late".into(), "hm".into(), SchemaKind::InterviewDecision);
            assert!(matches!(
                store.commit_turn(u.id, &turn, decision).await,
                Err(OrchestrationError::AlreadyConcluded)
            ));
        }

        assert!(store.get_history(u.id).await.unwrap().is_empty());
        assert_eq!(store.user(u.id).await.unwrap().decision.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_non_terminal_stored_code_is_overwritten() {
        let mut u = user("gus");
        u.decision = Some("N/A".into());
        let store = store_with(&u).await;

        let turn = ConversationTurn::new(u.id, "q".into(), "done".into(), SchemaKind::InterviewDecision);
        let effect = store.commit_turn(u.id, &turn, Some(Outcome::Accepted)).await.unwrap();
        assert_eq!(effect, DecisionWrite::Recorded);
        assert_eq!(store.user(u.id).await.unwrap().decision.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_insert_user_rejects_duplicates() {
        let u = user("eve");
        let store = store_with(&u).await;

        let mut clash = user("eve2");
        clash.email = u.email.clone();
        assert!(store.insert_user(&clash).await.is_err());
        assert_eq!(store.find_by_username("eve").await.unwrap().unwrap().id, u.id);
        assert!(store.find_by_username("nobody").await.unwrap().is_none());
    }
}
