//! HTTP layer
//!
//! Routes, the session-loading middleware, the route guard on `/profile`
//! and the error boundary.

pub mod auth;
pub mod middleware;
pub mod pages;


use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, AuthContext, CurrentUser};

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/profile", get(pages::profile))
        .route_layer(axum_middleware::from_fn(middleware::require_login));

    let public_routes = Router::new()
        .route("/", get(pages::index))
        .route("/signup", post(auth::signup))
        .route("/login", get(auth::begin_login).post(auth::login))
        .route("/auth/facebook/callback", get(auth::facebook_callback))
        .route("/logout", get(auth::logout));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(middleware::not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::load_session,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(middleware::handle_panic))
        .with_state(state)
}
