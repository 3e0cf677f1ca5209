//! Application state

use sqlx::PgPool;
use std::sync::Arc;

use crate::{
    auth::{
        AuthState, InMemoryRevocationStore, JwtManager, RedisRevocationStore, RevocationStore,
        TokenManager,
    },
    config::Config,
    email::{LoggingOutbox, MailOutbox, RedisMailOutbox},
    services::{BookService, PgUserStore, ReviewService, TagService, UserStore},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub jwt_manager: JwtManager,
    pub token_manager: TokenManager,
    pub revocation: Arc<dyn RevocationStore>,
    pub users: Arc<dyn UserStore>,
    pub outbox: Arc<dyn MailOutbox>,
    pub books: BookService,
    pub reviews: ReviewService,
    pub tags: TagService,
}

impl AppState {
    /// Build the production state. Redis backs revocation and the mail queue
    /// when `REDIS_URL` is set; otherwise both fall back to in-process versions.
    pub async fn new(pool: PgPool, config: Config) -> anyhow::Result<Self> {
        let (revocation, outbox): (Arc<dyn RevocationStore>, Arc<dyn MailOutbox>) =
            if config.redis_url.is_empty() {
                tracing::warn!(
                    "REDIS_URL not set - token revocation is process-local and mail is only logged"
                );
                (
                    Arc::new(InMemoryRevocationStore::new()),
                    Arc::new(LoggingOutbox),
                )
            } else {
                let client = redis::Client::open(config.redis_url.as_str())?;
                let conn = redis::aio::ConnectionManager::new(client).await?;
                tracing::info!("Redis connection established");
                (
                    Arc::new(RedisRevocationStore::new(conn.clone())),
                    Arc::new(RedisMailOutbox::new(conn)),
                )
            };

        let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone()));

        Self::with_collaborators(pool, config, revocation, users, outbox)
    }

    /// Build state around explicitly supplied collaborators
    pub fn with_collaborators(
        pool: PgPool,
        config: Config,
        revocation: Arc<dyn RevocationStore>,
        users: Arc<dyn UserStore>,
        outbox: Arc<dyn MailOutbox>,
    ) -> anyhow::Result<Self> {
        let jwt_manager = JwtManager::from_algorithm_name(&config.jwt_secret, &config.jwt_algorithm)?;
        tracing::info!(algorithm = ?jwt_manager.algorithm(), "Bearer token signing configured");

        let token_manager = TokenManager::new(&config.safe_token_secret, config.safe_token_max_age());

        Ok(Self {
            books: BookService::new(pool.clone()),
            reviews: ReviewService::new(pool.clone()),
            tags: TagService::new(pool.clone()),
            pool,
            config,
            jwt_manager,
            token_manager,
            revocation,
            users,
            outbox,
        })
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
            revocation: self.revocation.clone(),
            users: self.users.clone(),
        }
    }
}
