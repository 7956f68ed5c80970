use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::dto::quiz_dto::OptionView;
use crate::models::question::Question;
use crate::models::session::CandidateSession;

/// Reads the session's level queues; it never moves `level` or dequeues.
pub struct QuestionSelector;

impl QuestionSelector {
    /// Head of the current level's queue, or `None` when there is nothing
    /// left to ask.
    pub fn current(session: &CandidateSession) -> Option<&Question> {
        session.qns.get(session.level).and_then(|queue| queue.front())
    }

    /// The threshold only applies once at least one answer has been scored.
    pub fn below_threshold(session: &CandidateSession) -> bool {
        session.answered > 0 && session.score <= session.quiz_threshold
    }

    pub fn should_finish(session: &CandidateSession) -> bool {
        Self::current(session).is_none() || Self::below_threshold(session)
    }

    /// Options in a fresh random order on every serve. Only the order
    /// changes; grading goes by option id.
    pub fn presented_options(question: &Question) -> Vec<OptionView> {
        let mut options: Vec<OptionView> = question.options.iter().map(OptionView::from).collect();
        shuffle_options(&mut options);
        options
    }
}

pub fn shuffle_options<T>(options: &mut [T]) {
    options.shuffle(&mut thread_rng());
}
