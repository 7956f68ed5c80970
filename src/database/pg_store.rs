use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::database::store::{DurableStore, Fact, Mutation, MutationOutcome};
use crate::error::{Error, Result};
use crate::models::candidate::{AskedQuestion, CandidateRecord, QuizInfo};
use crate::models::question::{Question, QuestionOption, Tag};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_questions(&self, quiz_id: Uuid) -> Result<Vec<Question>> {
        let rows = sqlx::query(
            r#"
            SELECT id, level, position, text, options, tags, multiple, positive, negative
            FROM questions
            WHERE quiz_id = $1
            ORDER BY level, position
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        rows.iter()
            .map(|row| {
                let options: Json<Vec<QuestionOption>> = row.try_get("options")?;
                let tags: Json<Vec<Tag>> = row.try_get("tags")?;
                Ok(Question {
                    id: row.try_get("id")?,
                    level: row.try_get("level")?,
                    position: row.try_get("position")?,
                    text: row.try_get("text")?,
                    options: options.0,
                    tags: tags.0,
                    multiple: row.try_get("multiple")?,
                    positive: to_f64(row.try_get("positive")?),
                    negative: to_f64(row.try_get("negative")?),
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(query_failed)
    }

    async fn load_asked(&self, candidate_id: Uuid) -> Result<Vec<AskedQuestion>> {
        let rows = sqlx::query(
            r#"
            SELECT id, question_id, asked_at, answered_at
            FROM candidate_questions
            WHERE candidate_id = $1
            ORDER BY asked_at ASC
            "#,
        )
        .bind(candidate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        rows.iter()
            .map(|row| {
                Ok(AskedQuestion {
                    attempt_id: row.try_get("id")?,
                    question_id: row.try_get("question_id")?,
                    asked_at: row.try_get("asked_at")?,
                    answered_at: row.try_get("answered_at")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(query_failed)
    }

    async fn apply(
        tx: &mut Transaction<'_, Postgres>,
        candidate_id: Uuid,
        fact: &Fact,
        outcome: &mut MutationOutcome,
    ) -> std::result::Result<(), sqlx::Error> {
        let touched = match fact {
            Fact::QuizStart(at) => sqlx::query(
                r#"UPDATE candidates SET quiz_start = COALESCE(quiz_start, $1), updated_at = NOW() WHERE id = $2"#,
            )
            .bind(at)
            .bind(candidate_id)
            .execute(&mut **tx)
            .await?
            .rows_affected(),
            Fact::Completed { at, score } => sqlx::query(
                r#"
                UPDATE candidates
                SET complete = TRUE, completed_at = $1, score = $2, updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(at)
            .bind(to_decimal(*score))
            .bind(candidate_id)
            .execute(&mut **tx)
            .await?
            .rows_affected(),
            Fact::QuestionAsked {
                label,
                question_id,
                asked_at,
            } => {
                let row = sqlx::query(
                    r#"
                    INSERT INTO candidate_questions (candidate_id, question_id, asked_at)
                    VALUES ($1, $2, $3)
                    RETURNING id
                    "#,
                )
                .bind(candidate_id)
                .bind(question_id)
                .bind(asked_at)
                .fetch_one(&mut **tx)
                .await?;
                let attempt_id: Uuid = row.try_get("id")?;
                outcome.assigned_ids.insert(label.clone(), attempt_id);

                sqlx::query(
                    r#"UPDATE candidates SET last_question_id = $1, updated_at = NOW() WHERE id = $2"#,
                )
                .bind(question_id)
                .bind(candidate_id)
                .execute(&mut **tx)
                .await?
                .rows_affected()
            }
            Fact::AnswerRecorded {
                attempt_id,
                option_ids,
                score,
                answered_at,
            } => sqlx::query(
                r#"
                UPDATE candidate_questions
                SET answered_at = $1, selected_options = $2, score = $3
                WHERE id = $4 AND candidate_id = $5
                "#,
            )
            .bind(answered_at)
            .bind(Json(option_ids))
            .bind(to_decimal(*score))
            .bind(attempt_id)
            .bind(candidate_id)
            .execute(&mut **tx)
            .await?
            .rows_affected(),
            Fact::Score(total) => sqlx::query(
                r#"UPDATE candidates SET score = $1, updated_at = NOW() WHERE id = $2"#,
            )
            .bind(to_decimal(*total))
            .bind(candidate_id)
            .execute(&mut **tx)
            .await?
            .rows_affected(),
        };

        if touched == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl DurableStore for PgStore {
    async fn query_candidate(&self, candidate_id: Uuid) -> Result<CandidateRecord> {
        let row = sqlx::query(
            r#"
            SELECT c.id, c.name, c.email, c.token, c.validity, c.quiz_start,
                   c.complete, c.completed_at, c.score,
                   q.id AS quiz_id, q.duration_seconds, q.threshold
            FROM candidates c
            JOIN quizzes q ON q.id = c.quiz_id
            WHERE c.id = $1 AND c.deleted = FALSE
            "#,
        )
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?
        .ok_or_else(|| Error::NotFound(format!("Candidate {} not found", candidate_id)))?;

        let quiz_id: Uuid = row.try_get("quiz_id").map_err(query_failed)?;
        let duration_seconds: i32 = row.try_get("duration_seconds").map_err(query_failed)?;
        let threshold: Decimal = row.try_get("threshold").map_err(query_failed)?;
        let score: Decimal = row.try_get("score").map_err(query_failed)?;
        let validity: Option<NaiveDate> = row.try_get("validity").map_err(query_failed)?;
        let quiz_start: Option<DateTime<Utc>> = row.try_get("quiz_start").map_err(query_failed)?;
        let completed_at: Option<DateTime<Utc>> =
            row.try_get("completed_at").map_err(query_failed)?;

        let questions = self.load_questions(quiz_id).await?;
        let asked = self.load_asked(candidate_id).await?;

        Ok(CandidateRecord {
            id: candidate_id,
            name: row.try_get("name").map_err(query_failed)?,
            email: row.try_get("email").map_err(query_failed)?,
            token: row.try_get("token").map_err(query_failed)?,
            validity,
            quiz: QuizInfo {
                id: quiz_id,
                duration: Duration::seconds(i64::from(duration_seconds)),
                threshold: to_f64(threshold),
            },
            questions,
            asked,
            quiz_start,
            complete: row.try_get("complete").map_err(query_failed)?,
            completed_at,
            score: to_f64(score),
        })
    }

    async fn mutate(&self, mutation: Mutation) -> Result<MutationOutcome> {
        let mut tx = self.pool.begin().await.map_err(mutation_failed)?;
        let mut outcome = MutationOutcome::default();
        for fact in &mutation.facts {
            Self::apply(&mut tx, mutation.candidate_id, fact, &mut outcome)
                .await
                .map_err(mutation_failed)?;
        }
        tx.commit().await.map_err(mutation_failed)?;
        Ok(outcome)
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default().round_dp(2)
}

fn query_failed(err: sqlx::Error) -> Error {
    Error::QueryFailed(err.to_string())
}

fn mutation_failed(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::RowNotFound => {
            Error::MutationFailed("Mutation did not match a stored candidate or attempt".to_string())
        }
        other => Error::MutationFailed(other.to_string()),
    }
}
