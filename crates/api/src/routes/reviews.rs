//! Review routes

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    auth::{AuthUser, CurrentUser},
    error::{ApiError, ApiResult},
    services::{reviews::ensure_author, Review, ReviewCreate, ReviewPatch},
    state::AppState,
};

use super::auth::MessageResponse;

/// POST /reviews/book/{book_uid}
pub async fn add_review(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(book_uid): Path<Uuid>,
    Json(body): Json<ReviewCreate>,
) -> ApiResult<(StatusCode, Json<Review>)> {
    let review = state.reviews.add(user.uid, book_uid, body).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// GET /reviews/{review_uid}
pub async fn get_review(
    State(state): State<AppState>,
    Path(review_uid): Path<Uuid>,
) -> ApiResult<Json<Review>> {
    let review = state
        .reviews
        .get(review_uid)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(review))
}

/// GET /reviews (admin)
pub async fn list_reviews(State(state): State<AppState>) -> ApiResult<Json<Vec<Review>>> {
    Ok(Json(state.reviews.list_all().await?))
}

/// PATCH /reviews/{review_uid}
pub async fn update_review(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(review_uid): Path<Uuid>,
    Json(fields): Json<Map<String, Value>>,
) -> ApiResult<Json<Review>> {
    let patch = ReviewPatch::from_json(fields)?;

    let review = state
        .reviews
        .get(review_uid)
        .await?
        .ok_or(ApiError::NotFound)?;
    ensure_author(&review, auth_user.user_uid)?;

    let updated = state
        .reviews
        .update(review_uid, patch)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(updated))
}

/// DELETE /reviews/{review_uid}
pub async fn delete_review(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(review_uid): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let review = state
        .reviews
        .get(review_uid)
        .await?
        .ok_or(ApiError::NotFound)?;
    ensure_author(&review, auth_user.user_uid)?;

    if !state.reviews.delete(review_uid).await? {
        return Err(ApiError::NotFound);
    }

    tracing::info!(review_uid = %review_uid, "Review deleted");
    Ok(Json(MessageResponse {
        message: "Review deleted successfully".to_string(),
    }))
}
