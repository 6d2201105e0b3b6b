use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;

/// Client configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: Url,
    pub poll_interval: Duration,
    /// `None` polls until the task reaches a terminal state.
    pub poll_timeout: Option<Duration>,
    pub request_timeout: Duration,
    pub credentials: Option<Credentials>,
    pub rust_log: String,
}

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let credentials = match (
            std::env::var("STUDIO_EMAIL").ok(),
            std::env::var("STUDIO_PASSWORD").ok(),
        ) {
            (Some(email), Some(password)) => Some(Credentials { email, password }),
            _ => None,
        };

        Ok(Config {
            api_base_url: parse_base_url(&require_env("API_BASE_URL")?)?,
            poll_interval: Duration::from_millis(
                optional_env("POLL_INTERVAL_MS")?.unwrap_or(5000),
            ),
            poll_timeout: optional_env("POLL_TIMEOUT_SECS")?.map(Duration::from_secs),
            request_timeout: Duration::from_secs(
                optional_env("REQUEST_TIMEOUT_SECS")?.unwrap_or(120),
            ),
            credentials,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Relative endpoint paths are joined onto the base, so it must end in `/`.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).with_context(|| format!("API_BASE_URL '{raw}' is not a valid URL"))
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{key} must be a non-negative integer")),
        Err(_) => Ok(None),
    }
}
