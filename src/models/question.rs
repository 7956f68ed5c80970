use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    #[serde(default)]
    pub level: i32,
    #[serde(default)]
    pub position: i32,
    pub text: String,
    pub options: Vec<QuestionOption>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default = "default_positive")]
    pub positive: f64,
    #[serde(default)]
    pub negative: f64,
}

fn default_positive() -> f64 {
    1.0
}

impl Question {
    pub fn correct_option_count(&self) -> usize {
        self.options.iter().filter(|o| o.is_correct).count()
    }
}

/// An answer option as stored. `is_correct` never leaves the server; see
/// [`crate::dto::quiz_dto::OptionView`] for the served shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: Uuid,
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
}
