use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub webhook_secret: String,
    pub completion_webhook_url: String,
    pub store_timeout_secs: u64,
    pub notify_max_attempts: u32,
    pub notify_backoff_secs: u64,
    pub session_grace_minutes: i64,
    pub reaper_interval_secs: u64,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            jwt_secret: get_env("JWT_SECRET")?,
            webhook_secret: get_env("WEBHOOK_SECRET")?,
            completion_webhook_url: get_env_url("COMPLETION_WEBHOOK_URL")?,
            store_timeout_secs: get_env_parse_or("STORE_TIMEOUT_SECS", 10)?,
            notify_max_attempts: get_env_parse_or("NOTIFY_MAX_ATTEMPTS", 3)?,
            notify_backoff_secs: get_env_parse_or("NOTIFY_BACKOFF_SECS", 30)?,
            session_grace_minutes: get_env_parse_or("SESSION_GRACE_MINUTES", 30)?,
            reaper_interval_secs: get_env_parse_or("REAPER_INTERVAL_SECS", 60)?,
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

fn get_env_url(name: &str) -> Result<String> {
    let raw = get_env(name)?;
    let url = Url::parse(&raw)
        .map_err(|e| Error::Config(format!("Invalid URL in {}: {}", name, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::Config(format!(
            "{} must be an http or https URL",
            name
        )));
    }
    Ok(raw)
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}
