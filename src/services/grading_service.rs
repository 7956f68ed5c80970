use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::question::Question;

pub struct GradingService;

impl GradingService {
    /// Score delta for one answer.
    ///
    /// No selection is a skip and scores 0. Any wrong option costs the
    /// question's `negative`. Otherwise the candidate earns `positive` in
    /// proportion to the correct options picked.
    pub fn grade_answer(question: &Question, selected: &[Uuid]) -> Result<f64> {
        let picked: HashSet<Uuid> = selected.iter().copied().collect();
        if picked.len() != selected.len() {
            return Err(Error::BadRequest("Duplicate option in answer".to_string()));
        }
        if !question.multiple && picked.len() > 1 {
            return Err(Error::BadRequest(
                "Only one option may be chosen for this question".to_string(),
            ));
        }

        let mut correct_picked = 0usize;
        let mut wrong_picked = 0usize;
        for id in &picked {
            match question.options.iter().find(|o| o.id == *id) {
                Some(option) if option.is_correct => correct_picked += 1,
                Some(_) => wrong_picked += 1,
                None => {
                    return Err(Error::BadRequest(format!(
                        "Option {} does not belong to question {}",
                        id, question.id
                    )))
                }
            }
        }

        if picked.is_empty() {
            return Ok(0.0);
        }
        if wrong_picked > 0 {
            return Ok(-question.negative);
        }

        let total_correct = question.correct_option_count().max(1);
        Ok(question.positive * correct_picked as f64 / total_correct as f64)
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionOption;

    fn option(correct: bool) -> QuestionOption {
        QuestionOption {
            id: Uuid::new_v4(),
            text: "o".into(),
            is_correct: correct,
        }
    }

    fn question(multiple: bool, options: Vec<QuestionOption>) -> Question {
        Question {
            id: Uuid::new_v4(),
            level: 0,
            position: 0,
            text: "q".into(),
            options,
            tags: vec![],
            multiple,
            positive: 3.0,
            negative: 1.5,
        }
    }

    #[test]
    fn single_choice() {
        let q = question(false, vec![option(true), option(false)]);
        assert_eq!(GradingService::grade_answer(&q, &[q.options[0].id]).unwrap(), 3.0);
        assert_eq!(GradingService::grade_answer(&q, &[q.options[1].id]).unwrap(), -1.5);
        assert_eq!(GradingService::grade_answer(&q, &[]).unwrap(), 0.0);
        assert!(GradingService::grade_answer(&q, &[q.options[0].id, q.options[1].id]).is_err());
    }

    #[test]
    fn multiple_choice_is_proportional_unless_a_wrong_option_is_picked() {
        let q = question(true, vec![option(true), option(true), option(false)]);
        let partial = GradingService::grade_answer(&q, &[q.options[0].id]).unwrap();
        assert_eq!(partial, 1.5);
        let full = GradingService::grade_answer(&q, &[q.options[0].id, q.options[1].id]).unwrap();
        assert_eq!(full, 3.0);
        let mixed = GradingService::grade_answer(&q, &[q.options[0].id, q.options[2].id]).unwrap();
        assert_eq!(mixed, -1.5);
    }

    #[test]
    fn rejects_foreign_and_duplicate_options() {
        let q = question(true, vec![option(true)]);
        assert!(matches!(
            GradingService::grade_answer(&q, &[Uuid::new_v4()]),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            GradingService::grade_answer(&q, &[q.options[0].id, q.options[0].id]),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn rounds_to_two_places() {
        assert_eq!(round2(1.005 + 0.001), 1.01);
        assert_eq!(round2(-0.333333), -0.33);
        assert_eq!(round2(2.0), 2.0);
    }
}
