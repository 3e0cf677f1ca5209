//! Book reviews

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;
pub const MIN_REVIEW_LENGTH: usize = 5;
pub const MAX_REVIEW_LENGTH: usize = 250;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Review {
    pub uid: Uuid,
    pub rating: i32,
    pub review_text: String,
    pub user_uid: Uuid,
    pub book_uid: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewCreate {
    pub rating: i32,
    pub review_text: String,
}

fn validate_rating(rating: i32) -> ApiResult<()> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(ApiError::Validation(format!(
            "rating must be between {} and {}",
            MIN_RATING, MAX_RATING
        )));
    }
    Ok(())
}

fn validate_text(text: &str) -> ApiResult<()> {
    let len = text.chars().count();
    if !(MIN_REVIEW_LENGTH..=MAX_REVIEW_LENGTH).contains(&len) {
        return Err(ApiError::Validation(format!(
            "review_text must be between {} and {} characters",
            MIN_REVIEW_LENGTH, MAX_REVIEW_LENGTH
        )));
    }
    Ok(())
}

impl ReviewCreate {
    pub fn validate(&self) -> ApiResult<()> {
        validate_rating(self.rating)?;
        validate_text(&self.review_text)
    }
}

/// Whitelisted partial update of a review: `rating` and `review_text` only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewPatch {
    pub rating: Option<i32>,
    pub review_text: Option<String>,
}

impl ReviewPatch {
    pub fn from_json(fields: Map<String, Value>) -> ApiResult<Self> {
        let mut patch = ReviewPatch::default();

        for (key, value) in fields {
            match key.as_str() {
                "rating" | "review_text" if value.is_null() => {}
                "rating" => {
                    let rating = value
                        .as_i64()
                        .and_then(|r| i32::try_from(r).ok())
                        .ok_or_else(|| ApiError::Validation("rating must be an integer".to_string()))?;
                    validate_rating(rating)?;
                    patch.rating = Some(rating);
                }
                "review_text" => {
                    let Value::String(text) = value else {
                        return Err(ApiError::Validation(
                            "review_text must be a string".to_string(),
                        ));
                    };
                    validate_text(&text)?;
                    patch.review_text = Some(text);
                }
                _ => return Err(ApiError::InvalidField(key)),
            }
        }

        Ok(patch)
    }
}

/// Only the author may change or delete a review
pub fn ensure_author(review: &Review, user_uid: Uuid) -> ApiResult<()> {
    if review.user_uid != user_uid {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

const REVIEW_COLUMNS: &str =
    "uid, rating, review_text, user_uid, book_uid, created_at, updated_at";

#[derive(Clone)]
pub struct ReviewService {
    pool: PgPool,
}

impl ReviewService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn add(&self, user_uid: Uuid, book_uid: Uuid, data: ReviewCreate) -> ApiResult<Review> {
        data.validate()?;

        let book_exists: Option<(bool,)> = sqlx::query_as("SELECT TRUE FROM books WHERE uid = $1")
            .bind(book_uid)
            .fetch_optional(&self.pool)
            .await?;
        if book_exists.is_none() {
            return Err(ApiError::NotFound);
        }

        let review: Review = sqlx::query_as(&format!(
            r#"
            INSERT INTO reviews (uid, rating, review_text, user_uid, book_uid)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            REVIEW_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(data.rating)
        .bind(&data.review_text)
        .bind(user_uid)
        .bind(book_uid)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(review_uid = %review.uid, book_uid = %book_uid, "Review added");
        Ok(review)
    }

    pub async fn get(&self, review_uid: Uuid) -> ApiResult<Option<Review>> {
        let review: Option<Review> = sqlx::query_as(&format!(
            "SELECT {} FROM reviews WHERE uid = $1",
            REVIEW_COLUMNS
        ))
        .bind(review_uid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(review)
    }

    pub async fn list_all(&self) -> ApiResult<Vec<Review>> {
        let reviews: Vec<Review> = sqlx::query_as(&format!(
            "SELECT {} FROM reviews ORDER BY created_at DESC",
            REVIEW_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(reviews)
    }

    pub async fn list_for_book(&self, book_uid: Uuid) -> ApiResult<Vec<Review>> {
        let reviews: Vec<Review> = sqlx::query_as(&format!(
            "SELECT {} FROM reviews WHERE book_uid = $1 ORDER BY created_at DESC",
            REVIEW_COLUMNS
        ))
        .bind(book_uid)
        .fetch_all(&self.pool)
        .await?;
        Ok(reviews)
    }

    pub async fn update(&self, review_uid: Uuid, patch: ReviewPatch) -> ApiResult<Option<Review>> {
        let review: Option<Review> = sqlx::query_as(&format!(
            r#"
            UPDATE reviews
            SET rating = COALESCE($2, rating),
                review_text = COALESCE($3, review_text),
                updated_at = NOW()
            WHERE uid = $1
            RETURNING {}
            "#,
            REVIEW_COLUMNS
        ))
        .bind(review_uid)
        .bind(patch.rating)
        .bind(patch.review_text)
        .fetch_optional(&self.pool)
        .await?;
        Ok(review)
    }

    pub async fn delete(&self, review_uid: Uuid) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM reviews WHERE uid = $1")
            .bind(review_uid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
