//! HTTP routes
//!
//! Every route below is mounted under the configured prefix (`/api/v1` by
//! default). Guards are attached per group with `route_layer`, so the access
//! token check always runs before the role check.

pub mod auth;
pub mod books;
pub mod health;
pub mod reviews;
pub mod tags;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    routing::{delete, get, patch, post, put},
    Router,
};

use crate::{
    auth::{
        require_access_token, require_refresh_token, require_role, AuthState, RoleChecker,
        ADMIN_ONLY, USER_OR_ADMIN,
    },
    state::AppState,
};

/// Require a valid access token on every route in `router`
fn with_access(router: Router<AppState>, auth_state: &AuthState) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(
        auth_state.clone(),
        require_access_token,
    ))
}

/// Require a valid access token and one of `checker`'s roles
fn with_roles(
    router: Router<AppState>,
    auth_state: &AuthState,
    checker: RoleChecker,
) -> Router<AppState> {
    let router = router.route_layer(middleware::from_fn_with_state(
        auth_state.clone(),
        move |s: State<AuthState>, req: Request, next: Next| require_role(checker, s, req, next),
    ));
    with_access(router, auth_state)
}

fn auth_routes(auth_state: &AuthState) -> Router<AppState> {
    let public = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/verify/{token}", get(auth::verify_email))
        .route(
            "/auth/password_reset_request",
            post(auth::password_reset_request),
        )
        .route(
            "/auth/password_reset_confirm/{token}",
            post(auth::password_reset_confirm),
        );

    let access = with_access(
        Router::new()
            .route("/auth/me", get(auth::me))
            .route("/auth/logout", get(auth::logout))
            .route("/auth/resend_verification", post(auth::resend_verification)),
        auth_state,
    );

    let refresh = Router::new()
        .route("/auth/refresh_token", get(auth::refresh_token))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            require_refresh_token,
        ));

    public.merge(access).merge(refresh)
}

fn book_routes(auth_state: &AuthState) -> Router<AppState> {
    let admin = with_roles(
        Router::new().route("/books", get(books::list_books)),
        auth_state,
        ADMIN_ONLY,
    );

    let user = with_roles(
        Router::new()
            .route("/book/{book_uid}", get(books::get_book))
            .route("/user/all_books", get(books::list_user_books))
            .route("/book/add_book", post(books::add_book))
            .route("/book/update_book/{book_uid}", patch(books::update_book))
            .route("/book/delete_book/{book_uid}", delete(books::delete_book)),
        auth_state,
        USER_OR_ADMIN,
    );

    admin.merge(user)
}

fn review_routes(auth_state: &AuthState) -> Router<AppState> {
    let admin = with_roles(
        Router::new().route("/reviews", get(reviews::list_reviews)),
        auth_state,
        ADMIN_ONLY,
    );

    let user = with_roles(
        Router::new()
            .route("/reviews/book/{book_uid}", post(reviews::add_review))
            .route(
                "/reviews/{review_uid}",
                get(reviews::get_review)
                    .patch(reviews::update_review)
                    .delete(reviews::delete_review),
            ),
        auth_state,
        USER_OR_ADMIN,
    );

    admin.merge(user)
}

fn tag_routes(auth_state: &AuthState) -> Router<AppState> {
    let any_user = with_access(Router::new().route("/tags", get(tags::list_tags)), auth_state);

    let user = with_roles(
        Router::new()
            .route("/tags", post(tags::create_tag))
            .route("/tags/book/{book_uid}", post(tags::add_tags_to_book)),
        auth_state,
        USER_OR_ADMIN,
    );

    let admin = with_roles(
        Router::new().route(
            "/tags/{tag_uid}",
            put(tags::update_tag).delete(tags::delete_tag),
        ),
        auth_state,
        ADMIN_ONLY,
    );

    any_user.merge(user).merge(admin)
}

/// Build the API router
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();
    let prefix = state.config.api_prefix();

    let api = Router::new()
        .route("/health", get(health::health_check))
        .merge(auth_routes(&auth_state))
        .merge(book_routes(&auth_state))
        .merge(review_routes(&auth_state))
        .merge(tag_routes(&auth_state));

    Router::new().nest(&prefix, api).with_state(state)
}
