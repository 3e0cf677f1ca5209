//! Revoked bearer token ids
//!
//! Logout records the access token's `jti` here. Entries are write-once and
//! expire after [`JTI_EXPIRY`], which matches the longest possible access
//! token lifetime, so an entry never outlives the token it blocks.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// How long a revoked `jti` is remembered
pub const JTI_EXPIRY: Duration = Duration::from_secs(3600);

#[derive(Debug, thiserror::Error)]
pub enum RevocationError {
    #[error("Revocation store unavailable: {0}")]
    Redis(#[from] redis::RedisError),
}

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Mark a token id as revoked for [`JTI_EXPIRY`]
    async fn revoke(&self, jti: &str) -> Result<(), RevocationError>;

    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError>;
}

/// Redis-backed store: `SET jti jti EX 3600` / `EXISTS jti`
#[derive(Clone)]
pub struct RedisRevocationStore {
    conn: ConnectionManager,
}

impl RedisRevocationStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn revoke(&self, jti: &str) -> Result<(), RevocationError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(jti, jti, JTI_EXPIRY.as_secs()).await?;
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(jti).await?;
        Ok(exists)
    }
}

/// Process-local store for single-node development and tests
#[derive(Clone)]
pub struct InMemoryRevocationStore {
    entries: Arc<RwLock<HashMap<String, Instant>>>,
    ttl: Duration,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::with_ttl(JTI_EXPIRY)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|expires_at| **expires_at > now)
            .count()
    }
}

impl Default for InMemoryRevocationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn revoke(&self, jti: &str) -> Result<(), RevocationError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        entries.retain(|_, expires_at| *expires_at > now);
        entries.insert(jti.to_string(), now + self.ttl);
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(jti)
            .is_some_and(|expires_at| *expires_at > Instant::now()))
    }
}
