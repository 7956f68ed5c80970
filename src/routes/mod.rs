pub mod health;
pub mod quiz;

use axum::{
    routing::{get, post},
    Router,
};

use crate::middleware::auth::require_candidate;
use crate::AppState;

/// Every quiz route resolves the candidate from the bearer token first.
pub fn router(state: AppState) -> Router {
    let quiz_api = Router::new()
        .route("/api/quiz/ping", get(quiz::ping).post(quiz::ping))
        .route(
            "/api/quiz/question",
            get(quiz::next_question).post(quiz::next_question),
        )
        .route("/api/quiz/answer", post(quiz::submit_answer))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_candidate,
        ));

    Router::new()
        .route("/health", get(health::health))
        .merge(quiz_api)
        .with_state(state)
}
