//! Tags and the book/tag link table

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

pub const MAX_TAG_LENGTH: usize = 240;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Tag {
    pub uid: Uuid,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagCreate {
    pub name: String,
}

/// Body for attaching tags to a book
#[derive(Debug, Clone, Deserialize)]
pub struct TagAdd {
    pub tags: Vec<TagCreate>,
}

/// Trim and validate a tag name
pub fn normalize_tag_name(raw: &str) -> ApiResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("tag name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_TAG_LENGTH {
        return Err(ApiError::Validation(format!(
            "tag name must be at most {} characters",
            MAX_TAG_LENGTH
        )));
    }
    Ok(name.to_string())
}

#[derive(Clone)]
pub struct TagService {
    pool: PgPool,
}

impl TagService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> ApiResult<Vec<Tag>> {
        let tags: Vec<Tag> =
            sqlx::query_as("SELECT uid, name, created_at FROM tags ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(tags)
    }

    pub async fn list_for_book(&self, book_uid: Uuid) -> ApiResult<Vec<Tag>> {
        let tags: Vec<Tag> = sqlx::query_as(
            r#"
            SELECT t.uid, t.name, t.created_at
            FROM tags t
            JOIN book_tags bt ON bt.tag_uid = t.uid
            WHERE bt.book_uid = $1
            ORDER BY t.name
            "#,
        )
        .bind(book_uid)
        .fetch_all(&self.pool)
        .await?;
        Ok(tags)
    }

    pub async fn create(&self, data: TagCreate) -> ApiResult<Tag> {
        let name = normalize_tag_name(&data.name)?;

        let existing: Option<(Uuid,)> = sqlx::query_as("SELECT uid FROM tags WHERE name = $1")
            .bind(&name)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(ApiError::Conflict(format!("Tag with name {} already exists", name)));
        }

        let tag: Tag = sqlx::query_as(
            "INSERT INTO tags (uid, name) VALUES ($1, $2) RETURNING uid, name, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&name)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(tag_uid = %tag.uid, name = %tag.name, "Tag created");
        Ok(tag)
    }

    /// Link tags to a book by name, creating tags that do not exist yet.
    /// Returns `false` when the book does not exist.
    pub async fn attach_to_book(&self, book_uid: Uuid, data: TagAdd) -> ApiResult<bool> {
        let names = data
            .tags
            .iter()
            .map(|t| normalize_tag_name(&t.name))
            .collect::<ApiResult<Vec<_>>>()?;

        let mut tx = self.pool.begin().await?;

        let book_exists: Option<(bool,)> = sqlx::query_as("SELECT TRUE FROM books WHERE uid = $1")
            .bind(book_uid)
            .fetch_optional(&mut *tx)
            .await?;
        if book_exists.is_none() {
            return Ok(false);
        }

        for name in names {
            let (tag_uid,): (Uuid,) = sqlx::query_as(
                r#"
                INSERT INTO tags (uid, name)
                VALUES ($1, $2)
                ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                RETURNING uid
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&name)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO book_tags (book_uid, tag_uid)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(book_uid)
            .bind(tag_uid)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(book_uid = %book_uid, "Tags attached to book");
        Ok(true)
    }

    /// Rename a tag. Returns `None` when it does not exist.
    pub async fn rename(&self, tag_uid: Uuid, data: TagCreate) -> ApiResult<Option<Tag>> {
        let name = normalize_tag_name(&data.name)?;

        let tag: Option<Tag> = sqlx::query_as(
            "UPDATE tags SET name = $2 WHERE uid = $1 RETURNING uid, name, created_at",
        )
        .bind(tag_uid)
        .bind(&name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tag)
    }

    pub async fn delete(&self, tag_uid: Uuid) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE uid = $1")
            .bind(tag_uid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_names_are_trimmed() {
        assert_eq!(normalize_tag_name("  fantasy ").unwrap(), "fantasy");
    }

    #[test]
    fn test_tag_name_limits() {
        assert!(normalize_tag_name("").is_err());
        assert!(normalize_tag_name("   ").is_err());
        assert!(normalize_tag_name(&"x".repeat(MAX_TAG_LENGTH)).is_ok());
        assert!(normalize_tag_name(&"x".repeat(MAX_TAG_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_tag_add_body_shape() {
        let body: TagAdd =
            serde_json::from_str(r#"{"tags":[{"name":"classic"},{"name":"sci-fi"}]}"#).unwrap();
        assert_eq!(body.tags.len(), 2);
        assert_eq!(body.tags[1].name, "sci-fi");
    }
}
