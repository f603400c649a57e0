//! API middleware
//!
//! - `load_session`: resolves the session cookie into an [`AuthContext`]
//! - `require_login`: route guard for pages that need a logged-in user
//! - [`ApiError`]: the single error boundary every handler returns through

use anyhow::Context;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

use crate::auth::{
    AuthError, FederatedStrategy, IdentityProvider, LocalStrategy, SessionSerializer, Strategy,
    StrategySet,
};
use crate::config::Config;
use crate::db::repositories::SqlxUserRepository;
use crate::db::DynDatabasePool;
use crate::models::{Session, SessionRecord};
use crate::services::{AccountService, SessionManager};
use crate::session::{CookieSigner, MemorySessionStore, SessionCookie};

/// Message shown for any 500, whatever went wrong
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error!";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub strategies: Arc<StrategySet>,
    pub sessions: Arc<SessionManager>,
    pub serializer: Arc<SessionSerializer>,
    pub cookie: Arc<SessionCookie>,
    /// Keep the session (minus the user) on logout
    pub keep_session_info: bool,
}

impl AppState {
    /// Wire services from configuration
    ///
    /// The local strategy is always registered; `provider` adds the
    /// federated one.
    pub fn build(
        config: &Config,
        pool: DynDatabasePool,
        provider: Option<Arc<dyn IdentityProvider>>,
    ) -> anyhow::Result<Self> {
        let secret = config
            .session
            .secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .context("A session secret is required")?;

        let accounts = Arc::new(AccountService::new(SqlxUserRepository::boxed(pool)));

        let mut strategies = StrategySet::new();
        strategies.register(Strategy::Local(LocalStrategy::new(accounts.clone())));
        if let Some(provider) = provider {
            strategies.register(Strategy::Federated(FederatedStrategy::new(provider)));
        }

        let seconds = |ttl: i64| std::time::Duration::from_secs(ttl.max(0).unsigned_abs());
        let store = MemorySessionStore::new(
            config.session.max_sessions,
            seconds(config.session.ttl_seconds),
        )
        .with_anonymous_pool(
            config.session.max_anonymous_sessions,
            seconds(config.session.anonymous_ttl_seconds),
        );
        let sessions = SessionManager::with_ttl(Arc::new(store), config.session.ttl_seconds)
            .with_anonymous_ttl(config.session.anonymous_ttl_seconds);

        Ok(Self {
            serializer: Arc::new(SessionSerializer::new(
                config.session.deserialize,
                accounts.clone(),
            )),
            accounts,
            strategies: Arc::new(strategies),
            cookie: Arc::new(SessionCookie::new(
                config.session.cookie_name.clone(),
                CookieSigner::new(secret)?,
                sessions.ttl_seconds(),
                config.session.secure_cookie,
            )),
            sessions: Arc::new(sessions),
            keep_session_info: config.session.keep_session_info,
        })
    }
}

/// Per-request authentication state
///
/// Always present in handlers; requests without a valid cookie get the
/// empty default.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    /// Live session behind the cookie, if any
    pub session: Option<Session>,
    /// User rebuilt from the session, if logged in
    pub user: Option<SessionRecord>,
}

impl<S: Send + Sync> FromRequestParts<S> for AuthContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<AuthContext>().cloned().unwrap_or_default())
    }
}

/// Logged-in user admitted by [`require_login`]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub SessionRecord);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| found("/login"))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", INTERNAL_ERROR_MESSAGE)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingInput(field) => ApiError::with_details(
                "VALIDATION_ERROR",
                "Provide username and password.",
                serde_json::json!({ "field": field }),
            ),
            AuthError::DuplicateUsername(_) => ApiError::conflict(err.to_string()),
            AuthError::InvalidCredentials | AuthError::ProviderDenied(_) => {
                ApiError::unauthorized(err.to_string())
            }
            AuthError::UnknownStrategy(_) => ApiError::not_found(err.to_string()),
            AuthError::SessionOperationFailed(ref e) | AuthError::Unhandled(ref e) => {
                tracing::error!(error = ?e, "{}", err);
                ApiError::internal_error()
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Unhandled(err).into()
    }
}

/// `302 Found` to `location`
///
/// Form posts are answered with 302 rather than axum's 303 `Redirect::to`.
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
        Err(_) => ApiError::internal_error().into_response(),
    }
}

/// Resolve the session cookie and attach an [`AuthContext`] to the request
pub async fn load_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let mut context = AuthContext::default();

    if let Some(token) = state.cookie.read(request.headers()) {
        if let Some(session) = state.sessions.resolve(&token).await? {
            if let Some(record) = session.data.user.clone() {
                context.user = state
                    .serializer
                    .deserialize(record)
                    .await?
                    .map(|principal| SessionSerializer::serialize(&principal));
            }
            context.session = Some(session);
        }
    }

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Route guard: redirect to `/login` unless the request carries a user
pub async fn require_login(mut request: Request, next: Next) -> Response {
    let user = request
        .extensions()
        .get::<AuthContext>()
        .and_then(|context| context.user.clone());

    match user {
        Some(user) => {
            request.extensions_mut().insert(CurrentUser(user));
            next.run(request).await
        }
        None => found("/login"),
    }
}

/// Fallback for unknown routes
pub async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

/// Render a caught panic as the generic 500
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    tracing::error!(panic = detail, "Handler panicked");
    ApiError::internal_error().into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StrategyKind;

    #[test]
    fn test_api_error_status_mapping() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::internal_error().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ApiError::new("SOMETHING_ELSE", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_auth_error_conversion() {
        let cases = [
            (AuthError::MissingInput("username".into()), "VALIDATION_ERROR"),
            (AuthError::DuplicateUsername("alice".into()), "CONFLICT"),
            (AuthError::InvalidCredentials, "UNAUTHORIZED"),
            (AuthError::ProviderDenied("access_denied".into()), "UNAUTHORIZED"),
            (AuthError::UnknownStrategy(StrategyKind::Facebook), "NOT_FOUND"),
            (AuthError::SessionOperationFailed(anyhow::anyhow!("store down")), "INTERNAL_ERROR"),
            (AuthError::Unhandled(anyhow::anyhow!("db down")), "INTERNAL_ERROR"),
        ];

        for (err, code) in cases {
            assert_eq!(ApiError::from(err).error.code, code);
        }
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = ApiError::from(AuthError::Unhandled(anyhow::anyhow!("password=hunter2")));
        assert_eq!(err.error.message, INTERNAL_ERROR_MESSAGE);
        assert!(err.error.details.is_none());
    }

    #[test]
    fn test_api_error_json_shape() {
        let json = serde_json::to_value(ApiError::conflict("taken")).unwrap();
        assert_eq!(json["error"]["code"], "CONFLICT");
        assert_eq!(json["error"]["message"], "taken");
        assert!(json["error"].get("details").is_none());
    }

    #[test]
    fn test_found_is_302() {
        let response = found("/login");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[test]
    fn test_handle_panic_renders_generic_500() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
