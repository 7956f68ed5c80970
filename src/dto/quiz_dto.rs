use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::question::{QuestionOption, Tag};

pub const END_QUESTION_ID: &str = "END";

/// `"-1"` before the first question; a positive duration while running;
/// zero or negative once the quiz is over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub time_left: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionView {
    pub id: Uuid,
    pub text: String,
}

impl From<&QuestionOption> for OptionView {
    fn from(option: &QuestionOption) -> Self {
        Self {
            id: option.id,
            text: option.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServedQuestion {
    pub id: Uuid,
    /// Attempt record for this serve, linked to the question `id`.
    pub cuid: Uuid,
    pub text: String,
    pub options: Vec<OptionView>,
    pub tags: Vec<Tag>,
    pub multiple: bool,
    pub positive: f64,
    pub negative: f64,
    pub score: f64,
    pub time_taken: String,
    pub idx: usize,
    pub num_qns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndOfQuiz {
    pub id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestionResponse {
    Question(ServedQuestion),
    End(EndOfQuiz),
}

impl QuestionResponse {
    pub fn end(score: f64) -> Self {
        QuestionResponse::End(EndOfQuiz {
            id: END_QUESTION_ID.to_string(),
            score,
        })
    }

    pub fn is_end(&self) -> bool {
        matches!(self, QuestionResponse::End(_))
    }

    pub fn question(&self) -> Option<&ServedQuestion> {
        match self {
            QuestionResponse::Question(q) => Some(q),
            QuestionResponse::End(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AnswerRequest {
    pub cuid: Uuid,
    pub qid: Uuid,
    #[serde(default)]
    #[validate(length(max = 32))]
    pub aids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub recorded: bool,
    pub score: f64,
}
