//! Authentication middleware for Axum
//!
//! Bearer tokens go through decode, kind check and revocation check, in that
//! order. Any failure short-circuits with an [`AuthError`] response.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    jwt::{Claims, JwtError, JwtManager, TokenType, UserClaims},
    revocation::RevocationStore,
    roles::RoleChecker,
};
use crate::services::users::{User, UserStore};

/// Authenticated caller, decoded from a bearer token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub jti: String,
    pub user_uid: Uuid,
    pub email: String,
    pub role: String,
    pub token_type: TokenType,
    pub expiry: OffsetDateTime,
}

impl AuthUser {
    pub fn from_claims(claims: Claims) -> Self {
        let token_type = claims.token_type();
        Self {
            jti: claims.jti,
            user_uid: claims.user.user_uid,
            email: claims.user.email,
            role: claims.user.role,
            token_type,
            expiry: claims.expiry,
        }
    }

    /// User summary as embedded in the token
    pub fn user_claims(&self) -> UserClaims {
        UserClaims {
            email: self.email.clone(),
            user_uid: self.user_uid,
            role: self.role.clone(),
        }
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expiry
    }
}

/// Account resolved from the store by the role guard
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
    pub revocation: Arc<dyn RevocationStore>,
    pub users: Arc<dyn UserStore>,
}

/// Extract the bearer credential from the Authorization header
pub fn extract_bearer_token(request: &Request) -> Option<String> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;

    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Run a bearer token through decode, kind check and revocation check
pub async fn authenticate(
    auth_state: &AuthState,
    token: &str,
    required: TokenType,
) -> Result<Claims, AuthError> {
    let claims = auth_state
        .jwt_manager
        .validate(token, required)
        .map_err(|e| match e {
            JwtError::WrongTokenType => {
                tracing::debug!(expected = required.as_str(), "authenticate: wrong token kind");
                AuthError::WrongTokenKind(required)
            }
            other => {
                tracing::debug!(error = %other, "authenticate: token failed to decode");
                AuthError::InvalidOrExpiredToken
            }
        })?;

    match auth_state.revocation.is_revoked(&claims.jti).await {
        Ok(false) => Ok(claims),
        Ok(true) => {
            tracing::info!(jti = %claims.jti, "authenticate: token has been revoked");
            Err(AuthError::InvalidOrExpiredToken)
        }
        Err(e) => {
            tracing::error!(error = %e, "authenticate: revocation lookup failed");
            Err(AuthError::Unavailable)
        }
    }
}

async fn guard(
    auth_state: &AuthState,
    required: TokenType,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(token) = extract_bearer_token(&request) else {
        tracing::debug!(path = %path, "No bearer credential");
        return AuthError::MissingCredential.into_response();
    };

    match authenticate(auth_state, &token, required).await {
        Ok(claims) => {
            let auth_user = AuthUser::from_claims(claims);
            tracing::debug!(
                path = %path,
                user_uid = %auth_user.user_uid,
                token_type = required.as_str(),
                "Authentication successful"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %path, error = ?err, "Authentication failed");
            err.into_response()
        }
    }
}

/// Middleware that requires a valid, unrevoked access token
pub async fn require_access_token(
    State(auth_state): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    guard(&auth_state, TokenType::Access, request, next).await
}

/// Middleware that requires a valid, unrevoked refresh token
pub async fn require_refresh_token(
    State(auth_state): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    guard(&auth_state, TokenType::Refresh, request, next).await
}

/// Middleware that requires the caller's current role to be in `checker`'s
/// allow-list. Must run after [`require_access_token`].
///
/// The role is read from the account store, not from the token, so a role
/// change applies to tokens that are already issued.
pub async fn require_role(
    checker: RoleChecker,
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(auth_user) = request.extensions().get::<AuthUser>().cloned() else {
        return AuthError::MissingCredential.into_response();
    };

    let user = match auth_state.users.find_by_email(&auth_user.email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!(email = %auth_user.email, "Token refers to an account that no longer exists");
            return AuthError::InvalidOrExpiredToken.into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "require_role: account lookup failed");
            return AuthError::Unavailable.into_response();
        }
    };

    if let Err(err) = checker.check(&user.role) {
        tracing::warn!(
            user_uid = %user.uid,
            role = %user.role,
            allowed = ?checker.allowed_roles(),
            "Insufficient role"
        );
        return err.into_response();
    }

    request.extensions_mut().insert(CurrentUser(user));
    next.run(request).await
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer credential")]
    MissingCredential,
    /// Bad signature, malformed, expired or revoked. Callers cannot tell which.
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("Wrong token kind, expected {}", .0.as_str())]
    WrongTokenKind(TokenType),
    #[error("Insufficient permissions")]
    Forbidden,
    #[error("Authentication backend unavailable")]
    Unavailable,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingCredential => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidOrExpiredToken => {
                (StatusCode::UNAUTHORIZED, "This token is invalid or expired")
            }
            AuthError::WrongTokenKind(TokenType::Access) => {
                (StatusCode::FORBIDDEN, "Please provide an access token")
            }
            AuthError::WrongTokenKind(TokenType::Refresh) => {
                (StatusCode::FORBIDDEN, "Please provide a refresh token")
            }
            AuthError::Forbidden => (
                StatusCode::FORBIDDEN,
                "You do not have permission to access this resource",
            ),
            AuthError::Unavailable => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(value) = "Bearer".parse() {
                response
                    .headers_mut()
                    .insert(axum::http::header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}
