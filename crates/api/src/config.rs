//! Server configuration loaded from the environment

use anyhow::Context;
use time::Duration;

/// Runtime configuration for the API server
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Empty means no Redis: revocations stay in process and mail is only logged
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_algorithm: String,
    pub safe_token_secret: String,
    pub safe_token_max_age_secs: i64,
    /// Public host used in emailed links, e.g. `bookly.example.com`
    pub domain: String,
    pub root_route: String,
    pub api_version: String,
    pub bind_address: String,
    pub allowed_origins: Vec<String>,
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: std::env::var("REDIS_URL").unwrap_or_default(),
            jwt_secret: required("JWT_SECRET")?,
            jwt_algorithm: env_or("JWT_ALGORITHM", "HS256"),
            safe_token_secret: required("SAFE_TOKEN_SECRET")?,
            safe_token_max_age_secs: env_parse("SAFE_TOKEN_MAX_AGE_SECS", 86_400)?,
            domain: env_or("DOMAIN", "localhost:8000"),
            root_route: env_or("ROOT_ROUTE", "api"),
            api_version: env_or("API_VERSION", "v1"),
            bind_address: env_or("BIND_ADDRESS", "0.0.0.0:8000"),
            allowed_origins: env_or(
                "ALLOWED_ORIGINS",
                "http://localhost:3000,http://127.0.0.1:3000",
            )
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
            run_migrations: env_bool("RUN_MIGRATIONS", true),
        })
    }

    /// Path prefix every API route is mounted under, e.g. `/api/v1`
    pub fn api_prefix(&self) -> String {
        format!("/{}/{}", self.root_route, self.api_version)
    }

    /// Absolute base URL for links sent by email
    pub fn link_base(&self) -> String {
        format!("https://{}{}", self.domain, self.api_prefix())
    }

    pub fn safe_token_max_age(&self) -> Duration {
        Duration::seconds(self.safe_token_max_age_secs)
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).with_context(|| format!("{} must be set", key))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}
