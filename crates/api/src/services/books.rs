//! Books

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{FromRow, PgPool};
use time::{macros::format_description, Date, OffsetDateTime};
use uuid::Uuid;

use super::{reviews::Review, tags::Tag};
use crate::error::{ApiError, ApiResult};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Book {
    pub uid: Uuid,
    pub title: String,
    pub author: String,
    #[serde(with = "iso_date")]
    pub publication_year: Date,
    pub genre: Vec<String>,
    pub user_uid: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A book with its reviews and tags
#[derive(Debug, Clone, Serialize)]
pub struct BookDetail {
    #[serde(flatten)]
    pub book: Book,
    pub reviews: Vec<Review>,
    pub tags: Vec<Tag>,
}

/// Request body for adding a book
#[derive(Debug, Clone, Deserialize)]
pub struct BookCreate {
    pub title: String,
    pub author: String,
    /// `YYYY-MM-DD`
    pub publication_year: String,
    #[serde(default)]
    pub genre: Vec<String>,
}

/// Parse a `YYYY-MM-DD` publication date
pub fn parse_publication_date(raw: &str) -> ApiResult<Date> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]")).map_err(|_| {
        ApiError::Validation(format!(
            "publication_year must be a date in YYYY-MM-DD format, got {:?}",
            raw
        ))
    })
}

fn non_empty(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Whitelisted partial update of a book.
///
/// Only `title`, `author`, `publication_year` and `genre` may be changed.
/// A `null` value leaves the field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub publication_year: Option<Date>,
    pub genre: Option<Vec<String>>,
}

impl BookPatch {
    pub fn from_json(fields: Map<String, Value>) -> ApiResult<Self> {
        let mut patch = BookPatch::default();

        for (key, value) in fields {
            if value.is_null() {
                match key.as_str() {
                    "title" | "author" | "publication_year" | "genre" => continue,
                    _ => return Err(ApiError::InvalidField(key)),
                }
            }

            match key.as_str() {
                "title" => {
                    let title = expect_string(&key, value)?;
                    non_empty("title", &title)?;
                    patch.title = Some(title.trim().to_string());
                }
                "author" => {
                    let author = expect_string(&key, value)?;
                    non_empty("author", &author)?;
                    patch.author = Some(author.trim().to_string());
                }
                "publication_year" => {
                    let raw = expect_string(&key, value)?;
                    patch.publication_year = Some(parse_publication_date(&raw)?);
                }
                "genre" => {
                    let genre: Vec<String> = serde_json::from_value(value).map_err(|_| {
                        ApiError::Validation("genre must be a list of strings".to_string())
                    })?;
                    patch.genre = Some(genre);
                }
                _ => return Err(ApiError::InvalidField(key)),
            }
        }

        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        self == &BookPatch::default()
    }
}

fn expect_string(field: &str, value: Value) -> ApiResult<String> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(ApiError::Validation(format!("{} must be a string", field))),
    }
}

/// Only the owner may change or delete a book
pub fn ensure_owner(book: &Book, user_uid: Uuid) -> ApiResult<()> {
    if book.user_uid != user_uid {
        tracing::warn!(book_uid = %book.uid, user_uid = %user_uid, "Book modification by non-owner");
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

const BOOK_COLUMNS: &str =
    "uid, title, author, publication_year, genre, user_uid, created_at, updated_at";

#[derive(Clone)]
pub struct BookService {
    pool: PgPool,
}

impl BookService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_all(&self) -> ApiResult<Vec<Book>> {
        let books: Vec<Book> = sqlx::query_as(&format!(
            "SELECT {} FROM books ORDER BY created_at DESC",
            BOOK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    pub async fn list_for_user(&self, user_uid: Uuid) -> ApiResult<Vec<Book>> {
        let books: Vec<Book> = sqlx::query_as(&format!(
            "SELECT {} FROM books WHERE user_uid = $1 ORDER BY created_at DESC",
            BOOK_COLUMNS
        ))
        .bind(user_uid)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    pub async fn get(&self, book_uid: Uuid) -> ApiResult<Option<Book>> {
        let book: Option<Book> =
            sqlx::query_as(&format!("SELECT {} FROM books WHERE uid = $1", BOOK_COLUMNS))
                .bind(book_uid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(book)
    }

    pub async fn get_detail(&self, book_uid: Uuid) -> ApiResult<Option<BookDetail>> {
        let Some(book) = self.get(book_uid).await? else {
            return Ok(None);
        };

        let reviews = super::reviews::ReviewService::new(self.pool.clone())
            .list_for_book(book_uid)
            .await?;
        let tags = super::tags::TagService::new(self.pool.clone())
            .list_for_book(book_uid)
            .await?;

        Ok(Some(BookDetail {
            book,
            reviews,
            tags,
        }))
    }

    pub async fn create(&self, user_uid: Uuid, data: BookCreate) -> ApiResult<Book> {
        non_empty("title", &data.title)?;
        non_empty("author", &data.author)?;
        let publication_year = parse_publication_date(&data.publication_year)?;

        let book: Book = sqlx::query_as(&format!(
            r#"
            INSERT INTO books (uid, title, author, publication_year, genre, user_uid)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(data.title.trim())
        .bind(data.author.trim())
        .bind(publication_year)
        .bind(&data.genre)
        .bind(user_uid)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(book_uid = %book.uid, user_uid = %user_uid, "Book created");
        Ok(book)
    }

    /// Apply a patch. Returns `None` when the book does not exist.
    pub async fn update(&self, book_uid: Uuid, patch: BookPatch) -> ApiResult<Option<Book>> {
        let book: Option<Book> = sqlx::query_as(&format!(
            r#"
            UPDATE books
            SET title = COALESCE($2, title),
                author = COALESCE($3, author),
                publication_year = COALESCE($4, publication_year),
                genre = COALESCE($5, genre),
                updated_at = NOW()
            WHERE uid = $1
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(book_uid)
        .bind(patch.title)
        .bind(patch.author)
        .bind(patch.publication_year)
        .bind(patch.genre)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    pub async fn delete(&self, book_uid: Uuid) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM books WHERE uid = $1")
            .bind(book_uid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
