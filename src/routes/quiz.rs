use axum::{
    extract::{Extension, State},
    response::Json,
};
use validator::Validate;

use crate::dto::quiz_dto::{AnswerRequest, AnswerResponse, PingResponse, QuestionResponse};
use crate::middleware::auth::CandidateId;
use crate::AppState;

#[axum::debug_handler]
pub async fn ping(
    State(state): State<AppState>,
    Extension(CandidateId(candidate_id)): Extension<CandidateId>,
) -> crate::error::Result<Json<PingResponse>> {
    let outcome = state.engine.ping(candidate_id).await?;
    Ok(Json(PingResponse {
        time_left: outcome.time_left_label(),
    }))
}

#[axum::debug_handler]
pub async fn next_question(
    State(state): State<AppState>,
    Extension(CandidateId(candidate_id)): Extension<CandidateId>,
) -> crate::error::Result<Json<QuestionResponse>> {
    let response = state.engine.next_question(candidate_id).await?;
    Ok(Json(response))
}

#[axum::debug_handler]
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(CandidateId(candidate_id)): Extension<CandidateId>,
    Json(req): Json<AnswerRequest>,
) -> crate::error::Result<Json<AnswerResponse>> {
    req.validate()?;
    let response = state.engine.submit_answer(candidate_id, &req).await?;
    Ok(Json(response))
}
