use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizCompletedWebhook {
    pub event: String,
    pub candidate_id: uuid::Uuid,
    pub candidate: WebhookCandidate,
    pub deadline_label: Option<String>,
    pub attempt_token: String,
    pub score: f64,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookCandidate {
    pub name: String,
    pub email: String,
}
