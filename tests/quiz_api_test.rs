use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use quiz_backend::database::MemoryStore;
use quiz_backend::error::Result;
use quiz_backend::middleware::auth::{CandidateAuth, Claims};
use quiz_backend::models::candidate::{CandidateRecord, QuizInfo};
use quiz_backend::models::question::{Question, QuestionOption};
use quiz_backend::routes;
use quiz_backend::services::notification_service::{
    CompletionNotice, NotificationService, Notifier, RetryPolicy,
};
use quiz_backend::services::session_engine::{EngineSettings, SessionEngine};
use quiz_backend::utils::time::ManualClock;
use quiz_backend::AppState;
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test_secret_key";

struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_completion(&self, _notice: &CompletionNotice) -> Result<()> {
        Ok(())
    }
}

struct TestApp {
    app: Router,
    clock: ManualClock,
    candidate_id: Uuid,
    question: Question,
}

async fn test_app() -> TestApp {
    let candidate_id = Uuid::new_v4();
    let question = Question {
        id: Uuid::new_v4(),
        level: 0,
        position: 0,
        text: "2+2?".into(),
        options: vec![
            QuestionOption {
                id: Uuid::new_v4(),
                text: "4".into(),
                is_correct: true,
            },
            QuestionOption {
                id: Uuid::new_v4(),
                text: "5".into(),
                is_correct: false,
            },
        ],
        tags: vec![],
        multiple: false,
        positive: 2.0,
        negative: 1.0,
    };

    let store = MemoryStore::new();
    store
        .insert_candidate(CandidateRecord {
            id: candidate_id,
            name: "Pub User".into(),
            email: "pub@example.com".into(),
            token: "tok".into(),
            validity: None,
            quiz: QuizInfo {
                id: Uuid::new_v4(),
                duration: Duration::minutes(10),
                threshold: -100.0,
            },
            questions: vec![question.clone()],
            asked: vec![],
            quiz_start: None,
            complete: false,
            completed_at: None,
            score: 0.0,
        })
        .await;

    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap());
    let engine = SessionEngine::new(
        Arc::new(store),
        NotificationService::new(
            Arc::new(NoopNotifier),
            RetryPolicy {
                max_attempts: 1,
                base_delay: StdDuration::from_millis(1),
                max_delay: StdDuration::from_millis(1),
            },
        ),
        Arc::new(clock.clone()),
        EngineSettings::default(),
    );
    let state = AppState::with_engine(engine, CandidateAuth::new(SECRET));

    TestApp {
        app: routes::router(state),
        clock,
        candidate_id,
        question,
    }
}

fn bearer(candidate_id: Uuid) -> String {
    let claims = Claims {
        sub: candidate_id.to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes()))
        .expect("encode token");
    format!("Bearer {}", token)
}

async fn call(app: &Router, method: Method, uri: &str, auth: Option<String>, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn health_reports_live_sessions() {
    let t = test_app().await;
    let (status, body) = call(&t.app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["live_sessions"], 0);

    call(&t.app, Method::GET, "/api/quiz/ping", Some(bearer(t.candidate_id)), None).await;
    let (_, body) = call(&t.app, Method::GET, "/health", None, None).await;
    assert_eq!(body["live_sessions"], 1);
}

#[tokio::test]
async fn quiz_routes_require_a_candidate_token() {
    let t = test_app().await;

    let (status, body) = call(&t.app, Method::GET, "/api/quiz/ping", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing_authorization");

    let (status, body) = call(
        &t.app,
        Method::POST,
        "/api/quiz/question",
        Some("Bearer not.a.jwt".into()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn unknown_candidate_gets_not_found() {
    let t = test_app().await;
    let (status, _) = call(&t.app, Method::GET, "/api/quiz/ping", Some(bearer(Uuid::new_v4())), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn quiz_flow_over_http() {
    let t = test_app().await;
    let auth = Some(bearer(t.candidate_id));

    let (status, body) = call(&t.app, Method::POST, "/api/quiz/ping", auth.clone(), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "time_left": "-1" }));

    let (status, q) = call(&t.app, Method::GET, "/api/quiz/question", auth.clone(), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(q["id"], t.question.id.to_string());
    assert_eq!(q["idx"], 1);
    assert_eq!(q["num_qns"], 1);
    assert_eq!(q["time_taken"], "0s");
    let options = q["options"].as_array().unwrap();
    assert_eq!(options.len(), 2);
    assert!(options.iter().all(|o| o.get("is_correct").is_none()));

    t.clock.advance(Duration::seconds(10));
    let (_, body) = call(&t.app, Method::GET, "/api/quiz/ping", auth.clone(), None).await;
    assert_eq!(body["time_left"], "9m50s");

    let (status, body) = call(
        &t.app,
        Method::POST,
        "/api/quiz/answer",
        auth.clone(),
        Some(json!({ "cuid": Uuid::new_v4(), "qid": q["id"], "aids": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = call(
        &t.app,
        Method::POST,
        "/api/quiz/answer",
        auth.clone(),
        Some(json!({
            "cuid": q["cuid"],
            "qid": q["id"],
            "aids": [t.question.options[0].id],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "recorded": true, "score": 2.0 }));

    let (status, end) = call(&t.app, Method::POST, "/api/quiz/question", auth.clone(), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(end, json!({ "id": "END", "score": 2.0 }));

    let (_, body) = call(&t.app, Method::GET, "/api/quiz/ping", auth, None).await;
    assert_eq!(body["time_left"], "0s");
}

#[tokio::test]
async fn expired_quiz_is_forbidden() {
    let t = test_app().await;
    let auth = Some(bearer(t.candidate_id));

    call(&t.app, Method::GET, "/api/quiz/question", auth.clone(), None).await;
    t.clock.advance(Duration::minutes(11));

    let (status, body) = call(&t.app, Method::GET, "/api/quiz/question", auth.clone(), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Your quiz has already finished.");

    let (status, body) = call(&t.app, Method::GET, "/api/quiz/ping", auth, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["time_left"], "-1m0s");
}
