//! Authentication endpoints
//!
//! - POST /signup: create an account, then log in with it
//! - POST /login: local login
//! - GET /login: start the provider round-trip, or show the login prompt
//! - GET /auth/facebook/callback: finish the provider round-trip
//! - GET /logout
//!
//! Successful logins answer `302 /profile` with a fresh session cookie;
//! rejected ones flash a message and answer `302 /login`.

use axum::{
    extract::{FromRequest, Query, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;

use super::middleware::{found, ApiError, AppState, AuthContext};
use crate::auth::{AuthError, AuthorizationGrant, Credentials, SessionSerializer};
use crate::models::{PendingAuthorization, Principal, Session, StrategyKind};
use crate::services::RegisterInput;

/// Flash message for a rejected username/password
pub const LOCAL_FAILURE_MESSAGE: &str = "Username or password not correct.";

/// Flash message for a failed provider round-trip
pub const FEDERATED_FAILURE_MESSAGE: &str = "Try logging again!";

/// `username`/`password` from either a urlencoded form or a JSON body
///
/// Anything that is not JSON is read as a form; an unreadable form counts
/// as empty, while malformed JSON is a 400.
#[derive(Debug, Default, Deserialize)]
pub struct CredentialsBody {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl CredentialsBody {
    fn into_parts(self) -> (String, String) {
        (
            self.username.unwrap_or_default(),
            self.password.unwrap_or_default(),
        )
    }
}

impl<S: Send + Sync> FromRequest<S> for CredentialsBody {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"));

        if is_json {
            let Json(body) = Json::<CredentialsBody>::from_request(req, state)
                .await
                .map_err(|rejection| ApiError::validation_error(rejection.body_text()))?;
            Ok(body)
        } else {
            Ok(Form::<CredentialsBody>::from_request(req, state)
                .await
                .map(|Form(body)| body)
                .unwrap_or_default())
        }
    }
}

/// Query string of the provider callback
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_reason: Option<String>,
}

/// POST /signup
pub async fn signup(
    State(state): State<AppState>,
    context: AuthContext,
    body: CredentialsBody,
) -> Result<Response, ApiError> {
    let (username, password) = body.into_parts();
    if username.is_empty() || password.is_empty() {
        return Err(AuthError::MissingInput(
            if username.is_empty() { "username" } else { "password" }.to_string(),
        )
        .into());
    }

    state
        .accounts
        .register(RegisterInput::new(&username, &password))
        .await?;

    let result = state
        .strategies
        .authenticate(StrategyKind::Local, Credentials::password(username, password))
        .await;
    finish_login(&state, context.session, StrategyKind::Local, result).await
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    context: AuthContext,
    body: CredentialsBody,
) -> Result<Response, ApiError> {
    let (username, password) = body.into_parts();
    let result = state
        .strategies
        .authenticate(StrategyKind::Local, Credentials::password(username, password))
        .await;
    finish_login(&state, context.session, StrategyKind::Local, result).await
}

/// GET /login
pub async fn begin_login(
    State(state): State<AppState>,
    context: AuthContext,
) -> Result<Response, ApiError> {
    let Ok(federated) = state.strategies.federated(StrategyKind::Facebook) else {
        return login_prompt(&state, context.session).await;
    };

    let redirect = federated.begin();
    let mut session = context.session.unwrap_or_else(|| state.sessions.start());
    session.data.pending_authorization = Some(PendingAuthorization {
        strategy: federated.kind(),
        csrf_state: redirect.csrf_state,
        pkce_verifier: redirect.pkce_verifier,
    });
    state.sessions.persist(&mut session).await?;

    Ok(with_cookie(found(&redirect.url), state.cookie.issue(&session.token)?))
}

/// Plain-text prompt shown when no provider is configured; consumes flash messages
async fn login_prompt(state: &AppState, session: Option<Session>) -> Result<Response, ApiError> {
    let messages = match session {
        Some(mut session) => state.sessions.take_messages(&mut session).await?,
        None => Vec::new(),
    };

    let mut body = String::from("Please log in.");
    for message in messages {
        body.push('\n');
        body.push_str(&message);
    }
    Ok((StatusCode::OK, body).into_response())
}

/// GET /auth/facebook/callback
pub async fn facebook_callback(
    State(state): State<AppState>,
    context: AuthContext,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    let pending = context
        .session
        .as_ref()
        .and_then(|session| session.data.pending_authorization.clone())
        .filter(|pending| pending.strategy == StrategyKind::Facebook);

    let grant = AuthorizationGrant {
        code: params.code,
        returned_state: params.state,
        error: params.error.or(params.error_reason),
        expected_state: pending.as_ref().map(|p| p.csrf_state.clone()),
        pkce_verifier: pending.map(|p| p.pkce_verifier),
    };

    let result = state
        .strategies
        .authenticate(StrategyKind::Facebook, Credentials::Grant(grant))
        .await;
    finish_login(&state, context.session, StrategyKind::Facebook, result).await
}

/// GET /logout
///
/// Always redirects to `/`. A failing session store is logged and the
/// redirect still goes out.
pub async fn logout(
    State(state): State<AppState>,
    context: AuthContext,
) -> Result<Response, ApiError> {
    let response = found("/");
    let Some(session) = context.session else {
        return Ok(with_cookie(response, state.cookie.clear()?));
    };

    let username = session.data.user.as_ref().map(|u| u.username.clone());
    match state.sessions.log_out(session, state.keep_session_info).await {
        Ok(Some(kept)) => {
            tracing::info!(username = ?username, "Logged out, session kept");
            Ok(with_cookie(response, state.cookie.issue(&kept.token)?))
        }
        Ok(None) => {
            tracing::info!(username = ?username, "Logged out");
            Ok(with_cookie(response, state.cookie.clear()?))
        }
        Err(e) => {
            tracing::error!(error = %e, "Logout failed to update the session store");
            Ok(response)
        }
    }
}

/// Turn a strategy outcome into the login response
async fn finish_login(
    state: &AppState,
    session: Option<Session>,
    kind: StrategyKind,
    result: Result<Principal, AuthError>,
) -> Result<Response, ApiError> {
    match result {
        Ok(principal) => {
            let record = SessionSerializer::serialize(&principal);
            tracing::info!(username = %record.username, strategy = %kind, "Login succeeded");

            let session = state.sessions.log_in(session, record).await?;
            Ok(with_cookie(found("/profile"), state.cookie.issue(&session.token)?))
        }
        Err(e) if e.is_rejection() => {
            tracing::warn!(strategy = %kind, reason = %e, "Login rejected");

            let message = match kind {
                StrategyKind::Local => LOCAL_FAILURE_MESSAGE,
                _ => FEDERATED_FAILURE_MESSAGE,
            };
            let mut session = session.unwrap_or_else(|| state.sessions.start());
            session.data.pending_authorization = None;
            state.sessions.push_message(&mut session, message).await?;

            Ok(with_cookie(found("/login"), state.cookie.issue(&session.token)?))
        }
        Err(e) => Err(e.into()),
    }
}

fn with_cookie(mut response: Response, cookie: HeaderValue) -> Response {
    response.headers_mut().append(header::SET_COOKIE, cookie);
    response
}
