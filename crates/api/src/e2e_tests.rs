//! Router-level account flows
//!
//! These run the full router over in-memory collaborators. None of the
//! routes exercised here reach Postgres.

use axum::http::{header, Method, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::routes::auth::RESET_REQUESTED_MESSAGE;
use crate::test_support::{body_json, empty_request, json_request, TestApp};

const PREFIX: &str = "/api/v1";

fn uri(path: &str) -> String {
    format!("{}{}", PREFIX, path)
}

fn alice() -> Value {
    json!({
        "firstname": "Alice",
        "lastname": "Liddell",
        "username": "alice",
        "email": "alice@example.com",
        "password": "wonderland"
    })
}

async fn signup(app: &TestApp, body: Value) -> (StatusCode, Value) {
    let response = app
        .router()
        .oneshot(json_request(Method::POST, &uri("/auth/signup"), None, body))
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn login(app: &TestApp, email: &str, password: &str) -> (StatusCode, Value) {
    let response = app
        .router()
        .oneshot(json_request(
            Method::POST,
            &uri("/auth/login"),
            None,
            json!({ "email": email, "password": password }),
        ))
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

/// Sign alice up and log her in, returning (access, refresh)
async fn alice_tokens(app: &TestApp) -> (String, String) {
    let (status, _) = signup(app, alice()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = login(app, "alice@example.com", "wonderland").await;
    assert_eq!(status, StatusCode::OK);
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["refresh_token"].as_str().unwrap().to_string(),
    )
}

async fn resend(app: &TestApp, token: Option<&str>) -> (StatusCode, Value) {
    let response = app
        .router()
        .oneshot(empty_request(
            Method::POST,
            &uri("/auth/resend_verification"),
            token,
        ))
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

// =============================================================================
// Signup and login
// =============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new();
    let response = app
        .router()
        .oneshot(empty_request(Method::GET, &uri("/health"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_signup_creates_unverified_user_and_sends_link() {
    let app = TestApp::new();
    let (status, body) = signup(&app, alice()).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["user"]["role"], "user");
    assert_eq!(body["user"]["is_verified"], false);
    assert!(body["user"].get("password_hash").is_none());

    let sent = app.outbox.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec!["alice@example.com".to_string()]);
    assert!(app
        .outbox
        .last_token_after("/api/v1/auth/verify/")
        .await
        .is_some());
}

#[tokio::test]
async fn test_signup_duplicate_email_conflicts() {
    let app = TestApp::new();
    signup(&app, alice()).await;

    let mut again = alice();
    again["username"] = json!("alice2");
    again["email"] = json!("ALICE@example.com");
    let (status, body) = signup(&app, again).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "User already exists");
}

#[tokio::test]
async fn test_signup_cannot_choose_role() {
    let app = TestApp::new();
    let mut body = alice();
    body["role"] = json!("admin");

    let (status, _) = signup(&app, body).await;

    assert!(status.is_client_error());
    assert!(app.users.get("alice@example.com").await.is_none());
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = TestApp::new();
    signup(&app, alice()).await;

    let (wrong_status, wrong_body) = login(&app, "alice@example.com", "not-it").await;
    let (unknown_status, unknown_body) = login(&app, "bob@example.com", "wonderland").await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, unknown_body);
}

#[tokio::test]
async fn test_login_returns_token_pair_and_user_summary() {
    let app = TestApp::new();
    signup(&app, alice()).await;

    let (status, body) = login(&app, "alice@example.com", "wonderland").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["user"]["role"], "user");
    assert_ne!(body["access_token"], body["refresh_token"]);
}

// =============================================================================
// Token guards and logout
// =============================================================================

#[tokio::test]
async fn test_logout_revokes_access_token() {
    let app = TestApp::new();
    let (access, _) = alice_tokens(&app).await;

    let (status, _) = resend(&app, Some(&access)).await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .router()
        .oneshot(empty_request(Method::GET, &uri("/auth/logout"), Some(&access)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.revocation.len().await, 1);

    let (status, body) = resend(&app, Some(&access)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "This token is invalid or expired");
}

#[tokio::test]
async fn test_logout_leaves_other_sessions_alone() {
    let app = TestApp::new();
    let (first, _) = alice_tokens(&app).await;
    let (_, body) = login(&app, "alice@example.com", "wonderland").await;
    let second = body["access_token"].as_str().unwrap().to_string();

    app.router()
        .oneshot(empty_request(Method::GET, &uri("/auth/logout"), Some(&first)))
        .await
        .unwrap();

    let (status, _) = resend(&app, Some(&second)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_and_garbage_credentials() {
    let app = TestApp::new();

    let response = app
        .router()
        .oneshot(empty_request(
            Method::POST,
            &uri("/auth/resend_verification"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );

    let (status, _) = resend(&app, Some("definitely.not.a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_token_rejected_on_access_route() {
    let app = TestApp::new();
    let (_, refresh) = alice_tokens(&app).await;

    let (status, body) = resend(&app, Some(&refresh)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Please provide an access token");
}

#[tokio::test]
async fn test_access_token_rejected_on_refresh_route() {
    let app = TestApp::new();
    let (access, _) = alice_tokens(&app).await;

    let response = app
        .router()
        .oneshot(empty_request(
            Method::GET,
            &uri("/auth/refresh_token"),
            Some(&access),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await["error"],
        "Please provide a refresh token"
    );
}

#[tokio::test]
async fn test_refresh_issues_working_access_token() {
    let app = TestApp::new();
    let (_, refresh) = alice_tokens(&app).await;

    let response = app
        .router()
        .oneshot(empty_request(
            Method::GET,
            &uri("/auth/refresh_token"),
            Some(&refresh),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let fresh = body["access_token"].as_str().unwrap();
    let (status, _) = resend(&app, Some(fresh)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_route_forbidden_for_user_role() {
    let app = TestApp::new();
    let (access, _) = alice_tokens(&app).await;

    let response = app
        .router()
        .oneshot(empty_request(Method::GET, &uri("/books"), Some(&access)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_role_guard_rejects_deleted_account() {
    let app = TestApp::new();
    let (access, _) = alice_tokens(&app).await;
    app.users.remove("alice@example.com").await;

    let response = app
        .router()
        .oneshot(empty_request(Method::GET, &uri("/books"), Some(&access)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Email verification
// =============================================================================

#[tokio::test]
async fn test_verification_link_marks_account_verified() {
    let app = TestApp::new();
    let (access, _) = alice_tokens(&app).await;
    let token = app
        .outbox
        .last_token_after("/api/v1/auth/verify/")
        .await
        .unwrap();

    let response = app
        .router()
        .oneshot(empty_request(
            Method::GET,
            &uri(&format!("/auth/verify/{}", token)),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.users.get("alice@example.com").await.unwrap().is_verified);

    let (status, body) = resend(&app, Some(&access)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Account is already verified");
}

#[tokio::test]
async fn test_tampered_verification_link_rejected() {
    let app = TestApp::new();
    alice_tokens(&app).await;
    let mut token = app
        .outbox
        .last_token_after("/api/v1/auth/verify/")
        .await
        .unwrap();
    token.push('x');

    let response = app
        .router()
        .oneshot(empty_request(
            Method::GET,
            &uri(&format!("/auth/verify/{}", token)),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!app.users.get("alice@example.com").await.unwrap().is_verified);
}

// =============================================================================
// Password reset
// =============================================================================

async fn request_reset(app: &TestApp, email: &str) -> (StatusCode, Value) {
    let response = app
        .router()
        .oneshot(json_request(
            Method::POST,
            &uri("/auth/password_reset_request"),
            None,
            json!({ "email": email }),
        ))
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn confirm_reset(app: &TestApp, token: &str, password: &str, confirm: &str) -> StatusCode {
    app.router()
        .oneshot(json_request(
            Method::POST,
            &uri(&format!("/auth/password_reset_confirm/{}", token)),
            None,
            json!({ "new_password": password, "confirm_new_password": confirm }),
        ))
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_reset_request_same_reply_for_unknown_email() {
    let app = TestApp::new();
    alice_tokens(&app).await;
    let mails_before = app.outbox.sent().await.len();

    let (known_status, known) = request_reset(&app, "alice@example.com").await;
    let (unknown_status, unknown) = request_reset(&app, "nobody@example.com").await;

    assert_eq!(known_status, StatusCode::OK);
    assert_eq!(unknown_status, StatusCode::OK);
    assert_eq!(known, unknown);
    assert_eq!(known["message"], RESET_REQUESTED_MESSAGE);
    assert_eq!(app.outbox.sent().await.len(), mails_before + 1);
}

#[tokio::test]
async fn test_reset_mismatch_rejected_without_change() {
    let app = TestApp::new();
    alice_tokens(&app).await;
    request_reset(&app, "alice@example.com").await;
    let token = app
        .outbox
        .last_token_after("/api/v1/auth/password_reset_confirm/")
        .await
        .unwrap();

    let hash_before = app
        .users
        .get("alice@example.com")
        .await
        .unwrap()
        .password_hash;
    let writes_before = app.users.writes();

    let status = confirm_reset(&app, &token, "looking-glass", "looking-glas").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.users.writes(), writes_before);
    assert_eq!(
        app.users.get("alice@example.com").await.unwrap().password_hash,
        hash_before
    );
}

#[tokio::test]
async fn test_reset_confirm_changes_password() {
    let app = TestApp::new();
    alice_tokens(&app).await;
    request_reset(&app, "alice@example.com").await;
    let token = app
        .outbox
        .last_token_after("/api/v1/auth/password_reset_confirm/")
        .await
        .unwrap();

    let status = confirm_reset(&app, &token, "looking-glass", "looking-glass").await;
    assert_eq!(status, StatusCode::OK);

    let (old, _) = login(&app, "alice@example.com", "wonderland").await;
    let (new, _) = login(&app, "alice@example.com", "looking-glass").await;
    assert_eq!(old, StatusCode::UNAUTHORIZED);
    assert_eq!(new, StatusCode::OK);
}

#[tokio::test]
async fn test_verification_token_is_not_a_reset_token() {
    let app = TestApp::new();
    alice_tokens(&app).await;
    let token = app
        .outbox
        .last_token_after("/api/v1/auth/verify/")
        .await
        .unwrap();
    let writes_before = app.users.writes();

    let status = confirm_reset(&app, &token, "looking-glass", "looking-glass").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.users.writes(), writes_before);
}
