use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::question::Question;

/// Everything the durable store knows about one candidate's attempt, as
/// returned by `DurableStore::query_candidate`.
#[derive(Debug, Clone)]
pub struct CandidateRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub token: String,
    pub validity: Option<NaiveDate>,
    pub quiz: QuizInfo,
    pub questions: Vec<Question>,
    pub asked: Vec<AskedQuestion>,
    pub quiz_start: Option<DateTime<Utc>>,
    pub complete: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct QuizInfo {
    pub id: Uuid,
    pub duration: Duration,
    pub threshold: f64,
}

/// An attempt record: one question handed to the candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskedQuestion {
    pub attempt_id: Uuid,
    pub question_id: Uuid,
    pub asked_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
}
