//! Bearer-token authentication
//!
//! Resolves a token to the current user, including the stored interview state.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::OrchestrationError;
use crate::models::CurrentUser;
use crate::store::UserStore;
use crate::Result;

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve a bearer token to the user it was issued for.
    async fn current_user(&self, token: &str) -> Result<CurrentUser>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// HS256 JWTs whose subject is the username.
pub struct JwtAuthenticator {
    users: Arc<dyn UserStore>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtAuthenticator {
    pub fn new(secret: &str, users: Arc<dyn UserStore>) -> Self {
        Self {
            users,
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(24),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Issue a token for `username`.
    pub fn issue(&self, username: &str) -> Result<String> {
        let claims = Claims {
            sub: username.to_string(),
            exp: (Utc::now() + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| OrchestrationError::Auth(format!("Failed to issue token: {}", e)))
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn current_user(&self, token: &str) -> Result<CurrentUser> {
        let token = token.trim();
        if token.is_empty() {
            return Err(OrchestrationError::Auth("Missing bearer token".to_string()));
        }

        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| OrchestrationError::Auth(format!("Invalid token: {}", e)))?;

        let user = self
            .users
            .find_by_username(&data.claims.sub)
            .await?
            .ok_or_else(|| OrchestrationError::Auth("User not found".to_string()))?;

        debug!(user = %user.username, "Authenticated request");
        Ok(user.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InterviewState, UserRecord};
    use crate::store::InMemoryStore;
    use uuid::Uuid;

    async fn setup(decision: Option<&str>) -> JwtAuthenticator {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_user(&UserRecord {
                id: Uuid::new_v4(),
                username: "ada".into(),
                email: "ada@example.com".into(),
                role: "interviewer".into(),
                decision: decision.map(str::to_string),
                conversation_ref: "conv_ada".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        JwtAuthenticator::new("test-secret", store)
    }

    #[tokio::test]
    async fn test_issued_token_resolves_user_and_state() {
        let auth = setup(Some("0")).await;
        let token = auth.issue("ada").unwrap();

        let user = auth.current_user(&token).await.unwrap();
        assert_eq!(user.username, "ada");
        assert_eq!(user.conversation_ref, "conv_ada");
        assert_eq!(user.state, InterviewState::Rejected);
    }

    #[tokio::test]
    async fn test_rejects_bad_tokens() {
        let auth = setup(None).await;

        assert!(matches!(auth.current_user("").await, Err(OrchestrationError::Auth(_))));
        assert!(matches!(auth.current_user("garbage").await, Err(OrchestrationError::Auth(_))));

        let other = JwtAuthenticator::new("other-secret", Arc::new(InMemoryStore::new()));
        let forged = other.issue("ada").unwrap();
        assert!(matches!(auth.current_user(&forged).await, Err(OrchestrationError::Auth(_))));

        let expired = setup(None).await.with_ttl(Duration::hours(-2)).issue("ada").unwrap();
        assert!(matches!(auth.current_user(&expired).await, Err(OrchestrationError::Auth(_))));
    }

    #[tokio::test]
    async fn test_unknown_subject_is_unauthorized() {
        let auth = setup(None).await;
        let token = auth.issue("ghost").unwrap();
        assert!(matches!(auth.current_user(&token).await, Err(OrchestrationError::Auth(_))));
    }
}
