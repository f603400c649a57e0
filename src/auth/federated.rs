//! Federated (OAuth 2.0 authorization-code) strategy
//!
//! The strategy owns the parts of the round-trip that do not depend on the
//! provider: checking the returned `state` against the one stored in the
//! session and turning the provider's answer into a principal. Talking to
//! the provider is behind [`IdentityProvider`].

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::AuthError;
use crate::models::{FederatedProfile, Principal, StrategyKind};

/// Where to send the browser, plus what to remember until the callback
#[derive(Debug, Clone)]
pub struct AuthorizationRedirect {
    pub url: String,
    pub csrf_state: String,
    pub pkce_verifier: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered but refused to authenticate
    #[error("{0}")]
    Denied(String),

    /// The provider could not be reached or answered nonsense
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// An OAuth 2.0 identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Build the provider's authorization URL with fresh `state` and PKCE values
    fn authorization_redirect(&self) -> AuthorizationRedirect;

    /// Exchange `code` for a token and fetch the user's profile document
    async fn fetch_profile(&self, code: &str, pkce_verifier: &str) -> Result<Value, ProviderError>;
}

/// Query parameters of a provider callback, together with the values saved
/// in the session when the round-trip began
#[derive(Debug, Clone, Default)]
pub struct AuthorizationGrant {
    pub code: Option<String>,
    pub returned_state: Option<String>,
    /// `error` parameter set by the provider when the user declined
    pub error: Option<String>,
    pub expected_state: Option<String>,
    pub pkce_verifier: Option<String>,
}

pub struct FederatedStrategy {
    provider: Arc<dyn IdentityProvider>,
}

impl FederatedStrategy {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    pub fn kind(&self) -> StrategyKind {
        self.provider.kind()
    }

    /// Start a round-trip
    pub fn begin(&self) -> AuthorizationRedirect {
        self.provider.authorization_redirect()
    }

    pub async fn verify(&self, grant: AuthorizationGrant) -> Result<Principal, AuthError> {
        if let Some(error) = grant.error.filter(|e| !e.is_empty()) {
            return Err(AuthError::ProviderDenied(error));
        }

        let code = grant
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::MissingInput("code".to_string()))?;

        let (Some(expected), Some(returned)) = (grant.expected_state, grant.returned_state) else {
            return Err(AuthError::ProviderDenied("missing state".to_string()));
        };
        if expected != returned {
            return Err(AuthError::ProviderDenied("state mismatch".to_string()));
        }
        let verifier = grant
            .pkce_verifier
            .ok_or_else(|| AuthError::ProviderDenied("missing PKCE verifier".to_string()))?;

        let raw = match self.provider.fetch_profile(&code, &verifier).await {
            Ok(raw) => raw,
            Err(ProviderError::Denied(reason)) => return Err(AuthError::ProviderDenied(reason)),
            Err(ProviderError::Transport(e)) => {
                return Err(AuthError::Unhandled(
                    e.context(format!("{} profile request failed", self.kind())),
                ))
            }
        };

        let profile = FederatedProfile::new(self.kind(), raw);
        if profile.id().is_none() && profile.display_name().is_none() {
            return Err(AuthError::ProviderDenied(
                "profile carries neither id nor name".to_string(),
            ));
        }

        Ok(Principal::Federated(profile))
    }
}


#[cfg(test)]
mod tests {
    use super::stub::StubProvider;
    use super::*;
    use serde_json::json;

    fn grant() -> AuthorizationGrant {
        AuthorizationGrant {
            code: Some("code-1".to_string()),
            returned_state: Some("stub-state".to_string()),
            error: None,
            expected_state: Some("stub-state".to_string()),
            pkce_verifier: Some("stub-verifier".to_string()),
        }
    }

    #[tokio::test]
    async fn test_successful_grant_yields_profile() {
        let provider = StubProvider::returning(json!({"id": "1029", "name": "Bob"}));
        let strategy = FederatedStrategy::new(provider.clone());

        match strategy.verify(grant()).await.unwrap() {
            Principal::Federated(profile) => {
                assert_eq!(profile.provider, StrategyKind::Facebook);
                assert_eq!(profile.display_name(), Some("Bob"));
            }
            other => panic!("unexpected principal: {:?}", other),
        }
        assert_eq!(
            *provider.calls.lock().unwrap(),
            vec![("code-1".to_string(), "stub-verifier".to_string())]
        );
    }

    #[tokio::test]
    async fn test_state_mismatch_is_denied_without_calling_provider() {
        let provider = StubProvider::returning(json!({"id": "1"}));
        let strategy = FederatedStrategy::new(provider.clone());

        let result = strategy
            .verify(AuthorizationGrant {
                returned_state: Some("forged".to_string()),
                ..grant()
            })
            .await;

        assert!(matches!(result, Err(AuthError::ProviderDenied(_))));
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_expected_state_is_denied() {
        let strategy = FederatedStrategy::new(StubProvider::returning(json!({"id": "1"})));

        let result = strategy
            .verify(AuthorizationGrant {
                expected_state: None,
                ..grant()
            })
            .await;

        assert!(matches!(result, Err(AuthError::ProviderDenied(_))));
    }

    #[tokio::test]
    async fn test_provider_error_parameter_is_denied() {
        let strategy = FederatedStrategy::new(StubProvider::returning(json!({"id": "1"})));

        let result = strategy
            .verify(AuthorizationGrant {
                code: None,
                error: Some("access_denied".to_string()),
                ..grant()
            })
            .await;

        assert!(matches!(result, Err(AuthError::ProviderDenied(ref e)) if e == "access_denied"));
    }

    #[tokio::test]
    async fn test_missing_code() {
        let strategy = FederatedStrategy::new(StubProvider::returning(json!({"id": "1"})));

        let result = strategy
            .verify(AuthorizationGrant {
                code: Some(String::new()),
                ..grant()
            })
            .await;

        assert!(matches!(result, Err(AuthError::MissingInput(_))));
    }

    #[tokio::test]
    async fn test_rejected_exchange_and_transport_failure() {
        let denied = FederatedStrategy::new(StubProvider::denying("invalid_grant"));
        assert!(matches!(
            denied.verify(grant()).await,
            Err(AuthError::ProviderDenied(_))
        ));

        let provider = StubProvider::returning(json!({}));
        *provider.response.lock().unwrap() = None;
        let unreachable = FederatedStrategy::new(provider);
        assert!(matches!(
            unreachable.verify(grant()).await,
            Err(AuthError::Unhandled(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_profile_is_denied() {
        let strategy = FederatedStrategy::new(StubProvider::returning(json!({"email": "x@y"})));
        assert!(matches!(
            strategy.verify(grant()).await,
            Err(AuthError::ProviderDenied(_))
        ));
    }
}
