//! User accounts

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Role given to every self-registered account
pub const DEFAULT_ROLE: &str = "user";

/// Database row for an account. The password hash never leaves the server.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub uid: Uuid,
    pub username: String,
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub is_verified: bool,
    pub role: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Fields needed to register an account. There is no role field: new
/// accounts always start as [`DEFAULT_ROLE`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub password_hash: String,
}

/// Account persistence used by the auth routes and the role guard
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> ApiResult<Option<User>>;

    /// Insert a new account. Duplicate username or email is a `Conflict`.
    async fn create(&self, new_user: NewUser) -> ApiResult<User>;

    /// Set the verified flag. Returns `None` when no account has this email.
    async fn mark_verified(&self, email: &str) -> ApiResult<Option<User>>;

    /// Replace the password hash. Returns `false` when no account has this email.
    async fn update_password(&self, email: &str, password_hash: &str) -> ApiResult<bool>;

    async fn exists(&self, email: &str) -> ApiResult<bool> {
        Ok(self.find_by_email(email).await?.is_some())
    }
}

const USER_COLUMNS: &str = "uid, username, email, firstname, lastname, is_verified, role, \
                            password_hash, created_at, updated_at";

/// PostgreSQL-backed account store
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        let user: Option<User> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> ApiResult<User> {
        let user: User = sqlx::query_as(&format!(
            r#"
            INSERT INTO users (uid, username, email, firstname, lastname, role, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.firstname)
        .bind(&new_user.lastname)
        .bind(DEFAULT_ROLE)
        .bind(&new_user.password_hash)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_uid = %user.uid, "User created");
        Ok(user)
    }

    async fn mark_verified(&self, email: &str) -> ApiResult<Option<User>> {
        let user: Option<User> = sqlx::query_as(&format!(
            r#"
            UPDATE users
            SET is_verified = TRUE, updated_at = NOW()
            WHERE email = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_password(&self, email: &str, password_hash: &str) -> ApiResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE email = $1
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Basic `local@domain.tld` shape check used at signup
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

/// Map a missing account to `NotFound`
pub fn require_user(user: Option<User>) -> ApiResult<User> {
    user.ok_or(ApiError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+c@mail.example.org"));

        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("alice@"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("alice@@example.com"));
        assert!(!is_valid_email("al ice@example.com"));
        assert!(!is_valid_email("alice@.com"));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User {
            uid: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            firstname: "Alice".to_string(),
            lastname: String::new(),
            is_verified: false,
            role: DEFAULT_ROLE.to_string(),
            password_hash: "$argon2id$secret".to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        };

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "user");
    }
}
