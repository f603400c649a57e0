//! Page handlers

use axum::http::StatusCode;

use super::middleware::{AuthContext, CurrentUser};

/// GET /
pub async fn index(context: AuthContext) -> (StatusCode, &'static str) {
    tracing::debug!(user = ?context.user, "Index requested");
    (StatusCode::OK, "Welcome to our app!")
}

/// GET /profile (behind the route guard)
pub async fn profile(CurrentUser(user): CurrentUser) -> (StatusCode, String) {
    (
        StatusCode::OK,
        format!("Welcome to your profile {}!", user.username),
    )
}
