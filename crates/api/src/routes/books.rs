//! Book routes

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    services::{books::ensure_owner, Book, BookCreate, BookDetail, BookPatch},
    state::AppState,
};

/// GET /books (admin)
pub async fn list_books(State(state): State<AppState>) -> ApiResult<Json<Vec<Book>>> {
    Ok(Json(state.books.list_all().await?))
}

/// GET /book/{book_uid}
pub async fn get_book(
    State(state): State<AppState>,
    Path(book_uid): Path<Uuid>,
) -> ApiResult<Json<BookDetail>> {
    let detail = state
        .books
        .get_detail(book_uid)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(detail))
}

/// GET /user/all_books
pub async fn list_user_books(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Book>>> {
    Ok(Json(state.books.list_for_user(auth_user.user_uid).await?))
}

/// POST /book/add_book
pub async fn add_book(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<BookCreate>,
) -> ApiResult<(StatusCode, Json<Book>)> {
    let book = state.books.create(auth_user.user_uid, body).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// PATCH /book/update_book/{book_uid}
pub async fn update_book(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(book_uid): Path<Uuid>,
    Json(fields): Json<Map<String, Value>>,
) -> ApiResult<Json<Book>> {
    let patch = BookPatch::from_json(fields)?;

    let book = state.books.get(book_uid).await?.ok_or(ApiError::NotFound)?;
    ensure_owner(&book, auth_user.user_uid)?;

    if patch.is_empty() {
        return Ok(Json(book));
    }

    let updated = state
        .books
        .update(book_uid, patch)
        .await?
        .ok_or(ApiError::NotFound)?;

    tracing::info!(book_uid = %book_uid, "Book updated");
    Ok(Json(updated))
}

/// DELETE /book/delete_book/{book_uid}
pub async fn delete_book(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(book_uid): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let book = state.books.get(book_uid).await?.ok_or(ApiError::NotFound)?;
    ensure_owner(&book, auth_user.user_uid)?;

    if !state.books.delete(book_uid).await? {
        return Err(ApiError::NotFound);
    }

    tracing::info!(book_uid = %book_uid, "Book deleted");
    Ok(StatusCode::NO_CONTENT)
}
