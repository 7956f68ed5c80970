use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::models::candidate::CandidateRecord;

/// A single fact about one candidate. The adapter owns how each fact is
/// serialized; callers never format timestamps or scores for storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Fact {
    /// First question fetched. Never moves an already stored start.
    QuizStart(DateTime<Utc>),
    /// complete=true, completed_at and the final score, always together.
    Completed { at: DateTime<Utc>, score: f64 },
    /// Creates an attempt record; its id comes back under `label`.
    QuestionAsked {
        label: String,
        question_id: Uuid,
        asked_at: DateTime<Utc>,
    },
    AnswerRecorded {
        attempt_id: Uuid,
        option_ids: Vec<Uuid>,
        score: f64,
        answered_at: DateTime<Utc>,
    },
    /// Running total after an answer was scored.
    Score(f64),
}

/// Facts applied atomically for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub candidate_id: Uuid,
    pub facts: Vec<Fact>,
}

impl Mutation {
    pub fn new(candidate_id: Uuid) -> Self {
        Self {
            candidate_id,
            facts: Vec::new(),
        }
    }

    pub fn with(mut self, fact: Fact) -> Self {
        self.facts.push(fact);
        self
    }

    pub fn completes(&self) -> bool {
        self.facts
            .iter()
            .any(|f| matches!(f, Fact::Completed { .. }))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MutationOutcome {
    pub assigned_ids: HashMap<String, Uuid>,
}

#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Loads the candidate with their quiz, question bank and attempt records.
    async fn query_candidate(&self, candidate_id: Uuid) -> Result<CandidateRecord>;

    async fn mutate(&self, mutation: Mutation) -> Result<MutationOutcome>;
}
