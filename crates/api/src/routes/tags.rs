//! Tag routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    services::{BookDetail, Tag, TagAdd, TagCreate},
    state::AppState,
};

/// GET /tags
pub async fn list_tags(State(state): State<AppState>) -> ApiResult<Json<Vec<Tag>>> {
    Ok(Json(state.tags.list().await?))
}

/// POST /tags
pub async fn create_tag(
    State(state): State<AppState>,
    Json(body): Json<TagCreate>,
) -> ApiResult<(StatusCode, Json<Tag>)> {
    let tag = state.tags.create(body).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

/// POST /tags/book/{book_uid}
pub async fn add_tags_to_book(
    State(state): State<AppState>,
    Path(book_uid): Path<Uuid>,
    Json(body): Json<TagAdd>,
) -> ApiResult<Json<BookDetail>> {
    if !state.tags.attach_to_book(book_uid, body).await? {
        return Err(ApiError::NotFound);
    }

    let detail = state
        .books
        .get_detail(book_uid)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(detail))
}

/// PUT /tags/{tag_uid} (admin)
pub async fn update_tag(
    State(state): State<AppState>,
    Path(tag_uid): Path<Uuid>,
    Json(body): Json<TagCreate>,
) -> ApiResult<Json<Tag>> {
    let tag = state
        .tags
        .rename(tag_uid, body)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(tag))
}

/// DELETE /tags/{tag_uid} (admin)
pub async fn delete_tag(
    State(state): State<AppState>,
    Path(tag_uid): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !state.tags.delete(tag_uid).await? {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}
