//! Account, login and link-token routes

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{
        hash_password, verify_password, AuthError, AuthUser, EmailPayload, TokenPurpose,
        UserClaims, MIN_PASSWORD_LENGTH,
    },
    email::{password_reset_mail, send_best_effort, verification_mail},
    error::{ApiError, ApiResult},
    services::{
        users::{is_valid_email, require_user},
        Book, NewUser, User,
    },
    state::AppState,
};

/// Minimum username length at signup
pub const MIN_USERNAME_LENGTH: usize = 5;

/// Reply to every reset request, whether or not the account exists
pub const RESET_REQUESTED_MESSAGE: &str =
    "Please check your email for instructions to reset your password";

// =============================================================================
// Request/Response Types
// =============================================================================

/// Signup body. Unknown fields, including `role`, are rejected.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub firstname: String,
    #[serde(default)]
    pub lastname: Option<String>,
    pub username: String,
    pub email: String,
    pub password: String,
}

impl SignupRequest {
    fn validate(&self) -> ApiResult<()> {
        if self.username.trim().chars().count() < MIN_USERNAME_LENGTH {
            return Err(ApiError::Validation(format!(
                "username must be at least {} characters",
                MIN_USERNAME_LENGTH
            )));
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ApiError::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        if !is_valid_email(self.email.trim()) {
            return Err(ApiError::Validation("email address is not valid".to_string()));
        }
        if self.firstname.trim().is_empty() {
            return Err(ApiError::Validation("firstname must not be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub message: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub email: String,
    pub uid: Uuid,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub access_token: String,
    pub refresh_token: String,
    pub user: LoginUser,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub books: Vec<Book>,
}

#[derive(Debug, Serialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirm {
    #[serde(alias = "password")]
    pub new_password: String,
    #[serde(alias = "confirm_password")]
    pub confirm_new_password: String,
}

impl PasswordResetConfirm {
    fn validate(&self) -> ApiResult<()> {
        if self.new_password != self.confirm_new_password {
            return Err(ApiError::BadRequest("Passwords do not match".to_string()));
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ApiError::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn invalid_link() -> ApiError {
    ApiError::BadRequest("Invalid or expired link".to_string())
}

async fn send_verification_link(state: &AppState, email: &str) -> ApiResult<()> {
    let payload = EmailPayload {
        email: email.to_string(),
    };
    let token = state
        .token_manager
        .issue(&payload, TokenPurpose::EmailVerification)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to issue verification token");
            ApiError::Internal
        })?;

    let link = format!("{}/auth/verify/{}", state.config.link_base(), token);
    send_best_effort(state.outbox.as_ref(), verification_mail(email, &link)).await;
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<SignupResponse>)> {
    body.validate()?;
    let email = body.email.trim().to_lowercase();

    if state.users.exists(&email).await? {
        return Err(ApiError::Conflict("User already exists".to_string()));
    }

    let password_hash = hash_password(&body.password)?;
    let user = state
        .users
        .create(NewUser {
            username: body.username.trim().to_string(),
            email: email.clone(),
            firstname: body.firstname.trim().to_string(),
            lastname: body.lastname.unwrap_or_default().trim().to_string(),
            password_hash,
        })
        .await?;

    send_verification_link(&state, &user.email).await?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "Account created. Check your email to verify your account".to_string(),
            user,
        }),
    ))
}

/// POST /auth/login
///
/// Unknown email and wrong password get the same answer.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let email = body.email.trim().to_lowercase();

    let user = match state.users.find_by_email(&email).await? {
        Some(user) if verify_password(&body.password, &user.password_hash) => user,
        _ => {
            tracing::info!("Login rejected");
            return Err(ApiError::Unauthorized);
        }
    };

    let pair = state.jwt_manager.issue_pair(&UserClaims {
        email: user.email.clone(),
        user_uid: user.uid,
        role: user.role.clone(),
    })?;

    tracing::info!(user_uid = %user.uid, "User logged in");

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        user: LoginUser {
            email: user.email,
            uid: user.uid,
            role: user.role,
        },
    }))
}

/// GET /auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<MeResponse>> {
    let user = require_user(state.users.find_by_email(&auth_user.email).await?)?;
    let books = state.books.list_for_user(user.uid).await?;

    Ok(Json(MeResponse { user, books }))
}

/// GET /auth/refresh_token
pub async fn refresh_token(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<AccessTokenResponse>> {
    if auth_user.is_expired_at(OffsetDateTime::now_utc()) {
        return Err(AuthError::InvalidOrExpiredToken.into());
    }

    let access_token = state.jwt_manager.issue_access_token(&auth_user.user_claims())?;
    tracing::debug!(user_uid = %auth_user.user_uid, "Access token refreshed");

    Ok(Json(AccessTokenResponse { access_token }))
}

/// GET /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<MessageResponse>> {
    state.revocation.revoke(&auth_user.jti).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to revoke token");
        ApiError::Internal
    })?;

    tracing::info!(user_uid = %auth_user.user_uid, jti = %auth_user.jti, "User logged out");
    Ok(MessageResponse::new("Logged out successfully"))
}

/// GET /auth/verify/{token}
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let payload: EmailPayload = state
        .token_manager
        .decode_logged(&token, TokenPurpose::EmailVerification)
        .ok_or_else(invalid_link)?;

    let user = require_user(state.users.mark_verified(&payload.email).await?)?;
    tracing::info!(user_uid = %user.uid, "Email verified");

    Ok(MessageResponse::new("Account verified successfully"))
}

/// POST /auth/resend_verification
pub async fn resend_verification(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<MessageResponse>> {
    let user = require_user(state.users.find_by_email(&auth_user.email).await?)?;
    if user.is_verified {
        return Err(ApiError::BadRequest("Account is already verified".to_string()));
    }

    send_verification_link(&state, &user.email).await?;
    Ok(MessageResponse::new("Verification email sent"))
}

/// POST /auth/password_reset_request
pub async fn password_reset_request(
    State(state): State<AppState>,
    Json(body): Json<PasswordResetRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let email = body.email.trim().to_lowercase();

    if state.users.exists(&email).await? {
        let token = state
            .token_manager
            .issue(&EmailPayload { email: email.clone() }, TokenPurpose::PasswordReset)
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to issue reset token");
                ApiError::Internal
            })?;

        let link = format!(
            "{}/auth/password_reset_confirm/{}",
            state.config.link_base(),
            token
        );
        send_best_effort(state.outbox.as_ref(), password_reset_mail(&email, &link)).await;
    } else {
        tracing::debug!("Password reset requested for unknown email");
    }

    Ok(MessageResponse::new(RESET_REQUESTED_MESSAGE))
}

/// POST /auth/password_reset_confirm/{token}
pub async fn password_reset_confirm(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(body): Json<PasswordResetConfirm>,
) -> ApiResult<Json<MessageResponse>> {
    body.validate()?;

    let payload: EmailPayload = state
        .token_manager
        .decode_logged(&token, TokenPurpose::PasswordReset)
        .ok_or_else(invalid_link)?;

    let password_hash = hash_password(&body.new_password)?;
    if !state
        .users
        .update_password(&payload.email, &password_hash)
        .await?
    {
        return Err(ApiError::NotFound);
    }

    tracing::info!("Password reset completed");
    Ok(MessageResponse::new("Password reset successfully"))
}
