//! Worker configuration

use anyhow::Context;

/// Resend's send endpoint, used when `MAIL_API_URL` is unset
pub const DEFAULT_MAIL_API_URL: &str = "https://api.resend.com/emails";

pub const DEFAULT_MAIL_FROM: &str = "Bookly <noreply@bookly.dev>";

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis_url: String,
    /// Without a key the worker logs mail instead of sending it
    pub resend_api_key: Option<String>,
    pub mail_from: String,
    pub mail_api_url: String,
}

impl WorkerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL must be set")?;

        let resend_api_key = std::env::var("RESEND_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        Ok(Self {
            redis_url,
            resend_api_key,
            mail_from: std::env::var("MAIL_FROM")
                .unwrap_or_else(|_| DEFAULT_MAIL_FROM.to_string()),
            mail_api_url: std::env::var("MAIL_API_URL")
                .unwrap_or_else(|_| DEFAULT_MAIL_API_URL.to_string()),
        })
    }
}
