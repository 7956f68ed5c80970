//! Drives a candidate's quiz: heartbeat pings, question delivery, answers and
//! the one-time completion.
//!
//! Every entry point takes the candidate's session lock for its whole
//! read-modify-write, so ping, fetch and answer for one candidate are
//! serialized while other candidates proceed independently. In-memory state
//! only moves after the durable write it depends on has succeeded; a failed
//! store call leaves the session exactly as it was, which makes a client
//! retry safe.

use chrono::Duration;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::config::Config;
use crate::database::store::{DurableStore, Fact, Mutation};
use crate::dto::quiz_dto::{AnswerRequest, AnswerResponse, QuestionResponse, ServedQuestion};
use crate::error::{Error, Result};
use crate::models::question::Question;
use crate::models::session::{CandidateSession, LastQuestion, SessionState};
use crate::services::grading_service::{round2, GradingService};
use crate::services::notification_service::{CompletionNotice, NotificationService};
use crate::services::question_selector::QuestionSelector;
use crate::services::session_store::{SessionHandle, SessionStore};
use crate::utils::time::{self, Clock};

/// Label under which the store returns the id of a new attempt record.
const ATTEMPT_LABEL: &str = "qn";

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub store_timeout: std::time::Duration,
    /// How long a finished or abandoned session stays in memory.
    pub session_grace: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            store_timeout: std::time::Duration::from_secs(10),
            session_grace: Duration::minutes(30),
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            store_timeout: std::time::Duration::from_secs(config.store_timeout_secs),
            session_grace: Duration::minutes(config.session_grace_minutes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    NotStarted,
    Running(Duration),
    /// Zero or negative time left; the quiz is over.
    Finished(Duration),
}

impl PingOutcome {
    pub fn time_left_label(&self) -> String {
        match self {
            PingOutcome::NotStarted => "-1".to_string(),
            PingOutcome::Running(left) | PingOutcome::Finished(left) => time::format_duration(*left),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub finalized: usize,
    pub evicted: usize,
}

#[derive(Clone)]
pub struct SessionEngine {
    store: Arc<dyn DurableStore>,
    sessions: SessionStore,
    notifications: NotificationService,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl SessionEngine {
    pub fn new(
        store: Arc<dyn DurableStore>,
        notifications: NotificationService,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            sessions: SessionStore::new(),
            notifications,
            clock,
            settings,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn notifications(&self) -> &NotificationService {
        &self.notifications
    }

    pub async fn ping(&self, candidate_id: Uuid) -> Result<PingOutcome> {
        let mut session = self.lock_session(candidate_id).await?;
        let now = self.clock.now();
        session.last_exchange = now;

        match (session.state, session.time_left(now)) {
            (SessionState::Complete, left) => {
                let left = left.unwrap_or_else(Duration::zero).min(Duration::zero());
                Ok(PingOutcome::Finished(left))
            }
            (_, None) => Ok(PingOutcome::NotStarted),
            (_, Some(left)) if left > Duration::zero() => Ok(PingOutcome::Running(left)),
            (_, Some(left)) => {
                self.finalize(&mut session, "ping").await?;
                Ok(PingOutcome::Finished(left))
            }
        }
    }

    pub async fn next_question(&self, candidate_id: Uuid) -> Result<QuestionResponse> {
        let mut session = self.lock_session(candidate_id).await?;
        let now = self.clock.now();

        if session.time_left(now).is_some_and(|left| left < Duration::zero()) {
            return Err(Error::QuizExpired("Your quiz has already finished.".to_string()));
        }
        if session.is_complete() {
            return Ok(QuestionResponse::end(round2(session.score)));
        }

        if session.quiz_start.is_none() {
            self.apply(Mutation::new(candidate_id).with(Fact::QuizStart(now)))
                .await?;
            session.quiz_start = Some(now);
            session.state = SessionState::Running;
            tracing::info!(candidate_id = %candidate_id, quiz_start = %now, "Quiz started");
        }

        if QuestionSelector::should_finish(&session) {
            let score = round2(session.score);
            self.finalize(&mut session, "question").await?;
            return Ok(QuestionResponse::end(score));
        }
        let question = QuestionSelector::current(&session)
            .cloned()
            .ok_or_else(|| Error::Internal("Question queue emptied under lock".to_string()))?;

        let time_taken = session
            .last_qn_asked
            .map_or_else(Duration::zero, |asked| time::elapsed(asked, now));

        if let Some(last) = session
            .last_question
            .filter(|last| last.question_id == question.id)
        {
            session.last_qn_asked.get_or_insert(now);
            tracing::debug!(candidate_id = %candidate_id, question_id = %question.id, "Re-serving current question");
            let served = present(&question, &session, time_taken, last.attempt_id, session.qn_idx);
            return Ok(QuestionResponse::Question(served));
        }

        let outcome = self
            .apply(Mutation::new(candidate_id).with(Fact::QuestionAsked {
                label: ATTEMPT_LABEL.to_string(),
                question_id: question.id,
                asked_at: now,
            }))
            .await?;
        let attempt_id = outcome
            .assigned_ids
            .get(ATTEMPT_LABEL)
            .copied()
            .ok_or_else(|| {
                Error::MutationFailed("Store did not return an id for the new attempt".to_string())
            })?;

        session.last_question = Some(LastQuestion {
            question_id: question.id,
            attempt_id,
        });
        session.last_qn_asked = Some(now);
        session.qn_idx += 1;
        tracing::info!(
            candidate_id = %candidate_id,
            question_id = %question.id,
            attempt_id = %attempt_id,
            idx = session.qn_idx,
            "Question served"
        );

        let served = present(&question, &session, time_taken, attempt_id, session.qn_idx);
        Ok(QuestionResponse::Question(served))
    }

    pub async fn submit_answer(&self, candidate_id: Uuid, req: &AnswerRequest) -> Result<AnswerResponse> {
        let mut session = self.lock_session(candidate_id).await?;
        let now = self.clock.now();

        if session.time_left(now).is_some_and(|left| left < Duration::zero()) {
            return Err(Error::QuizExpired("Your quiz has already finished.".to_string()));
        }
        if session.state != SessionState::Running {
            return Err(Error::BadRequest("Quiz is not in progress".to_string()));
        }

        let mismatch = || Error::BadRequest("Answer does not match the current question".to_string());
        let last = session
            .last_question
            .filter(|last| last.question_id == req.qid && last.attempt_id == req.cuid)
            .ok_or_else(mismatch)?;
        let question = QuestionSelector::current(&session)
            .filter(|q| q.id == last.question_id)
            .cloned()
            .ok_or_else(mismatch)?;

        let delta = GradingService::grade_answer(&question, &req.aids)?;
        let total = session.score + delta;

        self.apply(
            Mutation::new(candidate_id)
                .with(Fact::AnswerRecorded {
                    attempt_id: last.attempt_id,
                    option_ids: req.aids.clone(),
                    score: delta,
                    answered_at: now,
                })
                .with(Fact::Score(round2(total))),
        )
        .await?;

        session.score = total;
        session.answered += 1;
        session.retire_current();
        tracing::info!(
            candidate_id = %candidate_id,
            question_id = %question.id,
            delta,
            score = total,
            "Answer recorded"
        );

        Ok(AnswerResponse {
            recorded: true,
            score: round2(total),
        })
    }

    /// Finalizes sessions whose deadline passed without a ping and drops
    /// sessions that are finished or abandoned. The store stays the source of
    /// truth; an evicted candidate is rehydrated on their next request.
    pub async fn reap_sessions(&self) -> ReapReport {
        let mut report = ReapReport::default();

        for (candidate_id, handle) in self.sessions.handles().await {
            let mut session = handle.clone().lock_owned().await;
            if session.retired {
                continue;
            }
            let now = self.clock.now();

            let overdue = session.state == SessionState::Running
                && session.time_left(now).is_some_and(|left| left <= Duration::zero());
            if overdue {
                match self.finalize(&mut session, "reaper").await {
                    Ok(true) => report.finalized += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(candidate_id = %candidate_id, error = ?e, "Reaper could not finalize session");
                    }
                }
            }

            if self.is_evictable(&session, now) {
                session.retired = true;
                self.evict(candidate_id, &handle).await;
                report.evicted += 1;
            }
        }

        report
    }

    async fn evict(&self, candidate_id: Uuid, handle: &SessionHandle) {
        if self.sessions.remove(candidate_id, handle).await {
            tracing::info!(candidate_id = %candidate_id, "Session evicted");
        }
    }

    fn is_evictable(&self, session: &CandidateSession, now: chrono::DateTime<chrono::Utc>) -> bool {
        let grace = self.settings.session_grace;
        match session.state {
            SessionState::Complete => {
                let idle_since = session
                    .completed_at
                    .map_or(session.last_exchange, |at| at.max(session.last_exchange));
                now - idle_since >= grace && !self.notifications.is_pending(session.candidate_id)
            }
            SessionState::NotStarted => now - session.last_exchange >= grace,
            // Overdue here only if finalizing failed above.
            SessionState::Running => session
                .time_left(now)
                .is_some_and(|left| left <= -grace),
        }
    }

    /// Check-and-set on the complete transition. Only the caller that sees a
    /// not-yet-complete session writes the completion and dispatches the
    /// notice; everyone after that gets `false`.
    async fn finalize(&self, session: &mut CandidateSession, trigger: &'static str) -> Result<bool> {
        if session.is_complete() {
            return Ok(false);
        }
        let now = self.clock.now();
        let score = round2(session.score);

        self.apply(Mutation::new(session.candidate_id).with(Fact::Completed { at: now, score }))
            .await?;

        session.state = SessionState::Complete;
        session.completed_at = Some(now);
        session.notification_sent = true;
        tracing::info!(
            candidate_id = %session.candidate_id,
            score,
            trigger,
            "Quiz completed"
        );

        self.notifications
            .dispatch(CompletionNotice::for_session(session, score, now));
        Ok(true)
    }

    /// Locks the candidate's session, hydrating it from the store on first
    /// use. A handle retired by the reaper while we waited is skipped.
    async fn lock_session(&self, candidate_id: Uuid) -> Result<OwnedMutexGuard<CandidateSession>> {
        loop {
            let handle = match self.sessions.handle(candidate_id).await {
                Some(handle) => handle,
                None => self.hydrate(candidate_id).await?,
            };
            let guard = handle.lock_owned().await;
            if !guard.retired {
                return Ok(guard);
            }
        }
    }

    async fn hydrate(&self, candidate_id: Uuid) -> Result<SessionHandle> {
        let record = self
            .bounded(self.store.query_candidate(candidate_id))
            .await?;
        let session = CandidateSession::hydrate(record, self.clock.now());
        tracing::info!(
            candidate_id = %candidate_id,
            state = ?session.state,
            remaining = session.qns.iter().map(|q| q.len()).sum::<usize>(),
            "Session hydrated"
        );
        Ok(self.sessions.insert_if_absent(candidate_id, session).await)
    }

    async fn apply(&self, mutation: Mutation) -> Result<crate::database::store::MutationOutcome> {
        let candidate_id = mutation.candidate_id;
        self.bounded(self.store.mutate(mutation)).await.map_err(|e| {
            tracing::error!(candidate_id = %candidate_id, error = ?e, "Durable write failed");
            e
        })
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let limit = self.settings.store_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = limit.as_millis() as u64, "Store call timed out");
                Err(Error::StoreTimeout(limit))
            }
        }
    }
}

fn present(
    question: &Question,
    session: &CandidateSession,
    time_taken: Duration,
    attempt_id: Uuid,
    idx: usize,
) -> ServedQuestion {
    ServedQuestion {
        id: question.id,
        cuid: attempt_id,
        text: question.text.clone(),
        options: QuestionSelector::presented_options(question),
        tags: question.tags.clone(),
        multiple: question.multiple,
        positive: question.positive,
        negative: question.negative,
        score: round2(session.score),
        time_taken: time::format_duration(time_taken),
        idx,
        num_qns: session.num_questions,
    }
}
