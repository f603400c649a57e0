//! Authentication error taxonomy

use crate::models::StrategyKind;

/// Failures produced by strategies, the account service and the session layer
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A required field was absent or empty
    #[error("Missing credentials: {0}")]
    MissingInput(String),

    /// Unknown username or wrong password; the two are never told apart
    #[error("Username or password not correct.")]
    InvalidCredentials,

    #[error("Username '{0}' is already taken")]
    DuplicateUsername(String),

    /// The identity provider refused the grant or the round-trip was tampered with
    #[error("Provider denied authentication: {0}")]
    ProviderDenied(String),

    #[error("Unknown authentication strategy: {0}")]
    UnknownStrategy(StrategyKind),

    #[error("Session operation failed: {0}")]
    SessionOperationFailed(#[source] anyhow::Error),

    #[error("Internal error: {0}")]
    Unhandled(#[from] anyhow::Error),
}

impl AuthError {
    /// Failures that send the user back to the login page instead of an error response
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::MissingInput(_) | AuthError::InvalidCredentials | AuthError::ProviderDenied(_)
        )
    }
}
