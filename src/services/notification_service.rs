use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::dto::webhook_dto::{QuizCompletedWebhook, WebhookCandidate};
use crate::error::{Error, Result};
use crate::models::session::CandidateSession;
use crate::utils::time::deadline_label;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionNotice {
    pub candidate_id: Uuid,
    pub name: String,
    pub email: String,
    pub deadline_label: Option<String>,
    /// Candidate id followed by the invite token, as in the invite link.
    pub attempt_token: String,
    pub score: f64,
    pub completed_at: DateTime<Utc>,
}

impl CompletionNotice {
    pub fn for_session(session: &CandidateSession, score: f64, completed_at: DateTime<Utc>) -> Self {
        Self {
            candidate_id: session.candidate_id,
            name: session.contact.name.clone(),
            email: session.contact.email.clone(),
            deadline_label: session.contact.validity.map(deadline_label),
            attempt_token: format!("{}{}", session.candidate_id, session.contact.token),
            score,
            completed_at,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_completion(&self, notice: &CompletionNotice) -> Result<()>;
}

/// Posts a `quiz_completed` event to the mail relay.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    target_url: String,
    secret: String,
}

impl WebhookNotifier {
    pub fn new(client: Client, target_url: String, secret: String) -> Self {
        Self {
            client,
            target_url,
            secret,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_completion(&self, notice: &CompletionNotice) -> Result<()> {
        let payload = QuizCompletedWebhook {
            event: "quiz_completed".to_string(),
            candidate_id: notice.candidate_id,
            candidate: WebhookCandidate {
                name: notice.name.clone(),
                email: notice.email.clone(),
            },
            deadline_label: notice.deadline_label.clone(),
            attempt_token: notice.attempt_token.clone(),
            score: notice.score,
            completed_at: notice.completed_at,
        };

        let resp = self
            .client
            .post(&self.target_url)
            .header("X-Webhook-Secret", &self.secret)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::DeliveryFailed(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Error::DeliveryFailed(format!(
            "{} responded {}: {}",
            self.target_url, status, body
        )))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt after `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Sends completion notices in the background with bounded retries. The
/// caller decides *whether* to notify (under the session lock); this only
/// decides how hard to try.
#[derive(Clone)]
pub struct NotificationService {
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
    pending: Arc<Mutex<HashSet<Uuid>>>,
    tracker: TaskTracker,
}

impl NotificationService {
    pub fn new(notifier: Arc<dyn Notifier>, policy: RetryPolicy) -> Self {
        Self {
            notifier,
            policy,
            pending: Arc::new(Mutex::new(HashSet::new())),
            tracker: TaskTracker::new(),
        }
    }

    pub fn dispatch(&self, notice: CompletionNotice) {
        let candidate_id = notice.candidate_id;
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(candidate_id);

        let this = self.clone();
        self.tracker.spawn(async move {
            this.deliver(&notice).await;
            this.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&candidate_id);
        });
    }

    /// Returns whether the notice was delivered within the retry budget.
    pub async fn deliver(&self, notice: &CompletionNotice) -> bool {
        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.notifier.send_completion(notice).await {
                Ok(()) => {
                    tracing::info!(
                        candidate_id = %notice.candidate_id,
                        attempt,
                        "Completion notice delivered"
                    );
                    return true;
                }
                Err(e) if attempt < max_attempts => {
                    let wait = self.policy.delay_after(attempt);
                    tracing::warn!(
                        candidate_id = %notice.candidate_id,
                        attempt,
                        retry_in_ms = wait.as_millis() as u64,
                        error = ?e,
                        "Completion notice failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    tracing::error!(
                        candidate_id = %notice.candidate_id,
                        attempts = max_attempts,
                        notice = %serde_json::to_string(notice).unwrap_or_default(),
                        error = ?e,
                        "Completion notice dead-lettered"
                    );
                }
            }
        }
        false
    }

    pub fn is_pending(&self, candidate_id: Uuid) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&candidate_id)
    }

    /// Waits for every dispatched notice to finish delivering or give up.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    fn notice() -> CompletionNotice {
        CompletionNotice {
            candidate_id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            deadline_label: Some("Mon Jan 2 2006".into()),
            attempt_token: "abc".into(),
            score: 2.5,
            completed_at: Utc::now(),
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(30));
        assert_eq!(policy.delay_after(2), Duration::from_secs(60));
        assert_eq!(policy.delay_after(3), Duration::from_secs(120));
        assert_eq!(policy.delay_after(20), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn delivers_once_on_success() {
        let n = notice();
        let id = n.candidate_id;
        let mut mock = MockNotifier::new();
        mock.expect_send_completion()
            .withf(move |got| got.candidate_id == id)
            .times(1)
            .returning(|_| Ok(()));

        let service = NotificationService::new(Arc::new(mock), fast_policy(3));
        service.dispatch(n);
        service.drain().await;
        assert!(!service.is_pending(id));
    }

    #[tokio::test]
    async fn retries_until_delivered() {
        let mut seq = Sequence::new();
        let mut mock = MockNotifier::new();
        mock.expect_send_completion()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(Error::DeliveryFailed("relay down".into())));
        mock.expect_send_completion()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let service = NotificationService::new(Arc::new(mock), fast_policy(3));
        assert!(service.deliver(&notice()).await);
    }

    #[tokio::test]
    async fn gives_up_after_the_retry_budget() {
        let mut mock = MockNotifier::new();
        mock.expect_send_completion()
            .times(3)
            .returning(|_| Err(Error::DeliveryFailed("relay down".into())));

        let service = NotificationService::new(Arc::new(mock), fast_policy(3));
        let n = notice();
        let id = n.candidate_id;
        service.dispatch(n);
        assert!(service.is_pending(id));
        service.drain().await;
        assert!(!service.is_pending(id));
    }
}
