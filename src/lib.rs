pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::config::Config;
use crate::database::PgStore;
use crate::middleware::auth::CandidateAuth;
use crate::services::{
    notification_service::{NotificationService, RetryPolicy, WebhookNotifier},
    session_engine::{EngineSettings, SessionEngine},
};
use crate::utils::time::SystemClock;
use reqwest::Client;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub engine: SessionEngine,
    pub auth: CandidateAuth,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config) -> error::Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let notifier = WebhookNotifier::new(
            http_client,
            config.completion_webhook_url.clone(),
            config.webhook_secret.clone(),
        );
        let notifications = NotificationService::new(
            Arc::new(notifier),
            RetryPolicy {
                max_attempts: config.notify_max_attempts,
                base_delay: Duration::from_secs(config.notify_backoff_secs),
                ..RetryPolicy::default()
            },
        );
        let engine = SessionEngine::new(
            Arc::new(PgStore::new(pool)),
            notifications,
            Arc::new(SystemClock),
            EngineSettings::from(config),
        );

        Ok(Self::with_engine(engine, CandidateAuth::new(&config.jwt_secret)))
    }

    pub fn with_engine(engine: SessionEngine, auth: CandidateAuth) -> Self {
        Self { engine, auth }
    }
}
