use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::{BTreeMap, HashSet, VecDeque};
use uuid::Uuid;

use crate::models::candidate::CandidateRecord;
use crate::models::question::Question;
use crate::utils::time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Running,
    Complete,
}

/// The question most recently handed out and its attempt record. Kept as one
/// value so the pair is always set or cleared together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastQuestion {
    pub question_id: Uuid,
    pub attempt_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct CandidateContact {
    pub name: String,
    pub email: String,
    pub token: String,
    pub validity: Option<NaiveDate>,
}

/// Live, in-memory state of one candidate's quiz attempt.
#[derive(Debug, Clone)]
pub struct CandidateSession {
    pub candidate_id: Uuid,
    pub contact: CandidateContact,
    pub state: SessionState,
    pub quiz_start: Option<DateTime<Utc>>,
    pub quiz_duration: Duration,
    pub quiz_threshold: f64,
    /// Index into `qns`; only moves forward.
    pub level: usize,
    pub qns: Vec<VecDeque<Question>>,
    pub score: f64,
    /// Answers scored so far, including ones recovered from the store.
    pub answered: usize,
    pub qn_idx: usize,
    pub num_questions: usize,
    pub last_question: Option<LastQuestion>,
    pub last_qn_asked: Option<DateTime<Utc>>,
    pub last_exchange: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notification_sent: bool,
    /// Set by the reaper right before the entry leaves the session store.
    pub retired: bool,
}

impl CandidateSession {
    /// Rebuilds a session from durable facts. Answered questions are dropped,
    /// and an issued-but-unanswered question keeps its attempt id so a
    /// re-fetch after a restart does not create a second attempt record.
    pub fn hydrate(record: CandidateRecord, now: DateTime<Utc>) -> Self {
        let answered_ids: HashSet<Uuid> = record
            .asked
            .iter()
            .filter(|a| a.answered_at.is_some())
            .map(|a| a.question_id)
            .collect();

        let pending = record
            .asked
            .iter()
            .max_by_key(|a| a.asked_at)
            .filter(|a| a.answered_at.is_none());

        let num_questions = record.questions.len();
        let mut questions = record.questions;
        questions.sort_by_key(|q| (q.level, q.position));

        let mut by_level: BTreeMap<i32, VecDeque<Question>> = BTreeMap::new();
        for q in questions {
            if answered_ids.contains(&q.id) {
                continue;
            }
            by_level.entry(q.level).or_default().push_back(q);
        }

        let state = if record.complete {
            SessionState::Complete
        } else if record.quiz_start.is_some() {
            SessionState::Running
        } else {
            SessionState::NotStarted
        };

        Self {
            candidate_id: record.id,
            contact: CandidateContact {
                name: record.name,
                email: record.email,
                token: record.token,
                validity: record.validity,
            },
            state,
            quiz_start: record.quiz_start,
            quiz_duration: record.quiz.duration,
            quiz_threshold: record.quiz.threshold,
            level: 0,
            qns: by_level.into_values().collect(),
            score: record.score,
            answered: answered_ids.len(),
            qn_idx: record.asked.len(),
            num_questions,
            last_question: pending.map(|a| LastQuestion {
                question_id: a.question_id,
                attempt_id: a.attempt_id,
            }),
            last_qn_asked: pending.map(|a| a.asked_at),
            last_exchange: now,
            completed_at: record.completed_at,
            notification_sent: record.complete,
            retired: false,
        }
    }

    /// `None` until the first question has been fetched.
    pub fn time_left(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.quiz_start
            .map(|start| time::time_left(start, self.quiz_duration, now))
    }

    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    /// Dequeues the head of the current level once it has been answered and
    /// moves on to the next level that still has questions.
    pub fn retire_current(&mut self) {
        if let Some(queue) = self.qns.get_mut(self.level) {
            queue.pop_front();
        }
        self.last_question = None;
        while self.level + 1 < self.qns.len()
            && self.qns.get(self.level).map_or(true, |q| q.is_empty())
        {
            self.level += 1;
        }
    }
}
