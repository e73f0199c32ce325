//! Decision notifications
//!
//! Emails the interview outcome to the candidate. Dispatch is fire-and-forget;
//! the chat response never waits on it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::NotifyError;
use crate::models::Outcome;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, email: &str, outcome: Outcome, name: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}

/// Outcome email addressed to `name`.
pub fn compose(outcome: Outcome, name: &str) -> EmailMessage {
    let subject = "Application Update – Interview Outcome".to_string();

    let body = match outcome {
        Outcome::Accepted => format!(
            r#"Dear {name},

Thank you for participating in our HR Chat-Bot interview.

We are pleased to inform you that you have successfully passed the evaluation.
Our team was impressed with your responses and believes you may be a strong fit
for the available role.

You will receive a follow-up email shortly with details about the next steps
in the recruitment process.

Best regards,
HR Department
"#
        ),
        Outcome::Rejected => format!(
            r#"Dear {name},

Thank you for taking the time to complete our HR Chat-Bot interview.

After reviewing your responses, we regret to inform you that you were not
selected to proceed to the next stage of the recruitment process.

We appreciate your interest in the position and encourage you to apply again
in the future.

Kind regards,
HR Department
"#
        ),
    };

    EmailMessage { subject, body }
}

/// Stable key so the email API drops duplicate sends for the same decision.
pub fn idempotency_key(email: &str, outcome: Outcome) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    hasher.update(b":");
    hasher.update(outcome.code().as_bytes());
    hex::encode(hasher.finalize())
}

/// Email API configuration
#[derive(Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

/// Sends mail through an HTTP email API (`POST <api_url>` with bearer auth).
pub struct EmailApiNotifier {
    client: Client,
    config: EmailConfig,
}

impl EmailApiNotifier {
    pub fn new(config: EmailConfig) -> crate::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Notifier for EmailApiNotifier {
    async fn notify(&self, email: &str, outcome: Outcome, name: &str) -> Result<(), NotifyError> {
        let message = compose(outcome, name);

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .header("Idempotency-Key", idempotency_key(email, outcome))
            .json(&SendEmailRequest {
                from: &self.config.from,
                to: [email],
                subject: &message.subject,
                text: &message.body,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Used when no email API is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, email: &str, outcome: Outcome, name: &str) -> Result<(), NotifyError> {
        let message = compose(outcome, name);
        info!(to = email, %outcome, subject = %message.subject, "Email delivery not configured; logging notification");
        Ok(())
    }
}

/// Spawn the notification without blocking the caller. Failures are logged.
pub fn dispatch(
    notifier: Arc<dyn Notifier>,
    email: String,
    outcome: Outcome,
    name: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match notifier.notify(&email, outcome, &name).await {
            Ok(()) => info!(to = %email, %outcome, "Decision notification sent"),
            Err(e) => warn!(to = %email, %outcome, "Decision notification failed: {}", e),
        }
    })
}
