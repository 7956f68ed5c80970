use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::database::store::{DurableStore, Fact, Mutation, MutationOutcome};
use crate::error::{Error, Result};
use crate::models::candidate::{AskedQuestion, CandidateRecord};

#[derive(Default)]
struct Inner {
    candidates: HashMap<Uuid, CandidateRecord>,
    applied: Vec<Mutation>,
    queries: usize,
    fail_mutations: usize,
    omit_assigned_ids: bool,
}

/// In-process [`DurableStore`] that keeps a log of applied mutations.
/// Cloning shares the underlying state, so a new engine built on a clone sees
/// what a previous one persisted.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_candidate(&self, record: CandidateRecord) {
        self.inner.lock().await.candidates.insert(record.id, record);
    }

    pub async fn candidate(&self, candidate_id: Uuid) -> Option<CandidateRecord> {
        self.inner.lock().await.candidates.get(&candidate_id).cloned()
    }

    /// Every mutation applied so far, in order.
    pub async fn mutations(&self) -> Vec<Mutation> {
        self.inner.lock().await.applied.clone()
    }

    pub async fn completion_writes(&self) -> usize {
        self.inner
            .lock()
            .await
            .applied
            .iter()
            .filter(|m| m.completes())
            .count()
    }

    pub async fn query_count(&self) -> usize {
        self.inner.lock().await.queries
    }

    /// Makes the next `count` mutations fail without touching any state.
    pub async fn fail_next_mutations(&self, count: usize) {
        self.inner.lock().await.fail_mutations = count;
    }

    /// Simulates a store that accepts attempt records but returns no id for them.
    pub async fn omit_assigned_ids(&self, omit: bool) {
        self.inner.lock().await.omit_assigned_ids = omit;
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn query_candidate(&self, candidate_id: Uuid) -> Result<CandidateRecord> {
        let mut inner = self.inner.lock().await;
        inner.queries += 1;
        inner
            .candidates
            .get(&candidate_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Candidate {} not found", candidate_id)))
    }

    async fn mutate(&self, mutation: Mutation) -> Result<MutationOutcome> {
        let mut inner = self.inner.lock().await;
        if inner.fail_mutations > 0 {
            inner.fail_mutations -= 1;
            return Err(Error::MutationFailed("injected failure".to_string()));
        }

        let omit_ids = inner.omit_assigned_ids;
        let mut record = inner
            .candidates
            .get(&mutation.candidate_id)
            .cloned()
            .ok_or_else(|| {
                Error::MutationFailed(format!("Candidate {} not found", mutation.candidate_id))
            })?;

        let mut outcome = MutationOutcome::default();
        for fact in &mutation.facts {
            match fact {
                Fact::QuizStart(at) => {
                    record.quiz_start.get_or_insert(*at);
                }
                Fact::Completed { at, score } => {
                    record.complete = true;
                    record.completed_at = Some(*at);
                    record.score = *score;
                }
                Fact::QuestionAsked {
                    label,
                    question_id,
                    asked_at,
                } => {
                    let attempt_id = Uuid::new_v4();
                    record.asked.push(AskedQuestion {
                        attempt_id,
                        question_id: *question_id,
                        asked_at: *asked_at,
                        answered_at: None,
                    });
                    if !omit_ids {
                        outcome.assigned_ids.insert(label.clone(), attempt_id);
                    }
                }
                Fact::AnswerRecorded {
                    attempt_id,
                    answered_at,
                    ..
                } => {
                    let asked = record
                        .asked
                        .iter_mut()
                        .find(|a| a.attempt_id == *attempt_id)
                        .ok_or_else(|| {
                            Error::MutationFailed(format!("Attempt {} not found", attempt_id))
                        })?;
                    asked.answered_at = Some(*answered_at);
                }
                Fact::Score(total) => record.score = *total,
            }
        }

        inner.candidates.insert(record.id, record);
        inner.applied.push(mutation);
        Ok(outcome)
    }
}
