//! Strategy dispatch
//!
//! [`StrategySet`] is built once at startup and carried in the application
//! state. Strategies never touch the session; they only answer who the
//! credentials belong to.

use std::collections::HashMap;

use super::federated::{AuthorizationGrant, FederatedStrategy};
use super::local::LocalStrategy;
use super::AuthError;
use crate::models::{Principal, StrategyKind};

/// Input handed to a strategy
#[derive(Debug, Clone)]
pub enum Credentials {
    Password { username: String, password: String },
    Grant(AuthorizationGrant),
}

impl Credentials {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Password {
            username: username.into(),
            password: password.into(),
        }
    }
}

pub enum Strategy {
    Local(LocalStrategy),
    Federated(FederatedStrategy),
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Local(_) => StrategyKind::Local,
            Strategy::Federated(strategy) => strategy.kind(),
        }
    }

    pub async fn verify(&self, credentials: Credentials) -> Result<Principal, AuthError> {
        match (self, credentials) {
            (Strategy::Local(local), Credentials::Password { username, password }) => {
                local.verify(&username, &password).await
            }
            (Strategy::Federated(federated), Credentials::Grant(grant)) => {
                federated.verify(grant).await
            }
            (Strategy::Local(_), Credentials::Grant(_)) => {
                Err(AuthError::MissingInput("username".to_string()))
            }
            (Strategy::Federated(_), Credentials::Password { .. }) => {
                Err(AuthError::MissingInput("code".to_string()))
            }
        }
    }
}

/// Strategies registered for this process, keyed by kind
#[derive(Default)]
pub struct StrategySet {
    strategies: HashMap<StrategyKind, Strategy>,
}

impl StrategySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `strategy`, replacing any earlier one of the same kind
    pub fn register(&mut self, strategy: Strategy) -> &mut Self {
        tracing::debug!("Registered {} strategy", strategy.kind());
        self.strategies.insert(strategy.kind(), strategy);
        self
    }

    pub fn get(&self, kind: StrategyKind) -> Result<&Strategy, AuthError> {
        self.strategies
            .get(&kind)
            .ok_or(AuthError::UnknownStrategy(kind))
    }

    /// The federated strategy registered under `kind`
    pub fn federated(&self, kind: StrategyKind) -> Result<&FederatedStrategy, AuthError> {
        match self.get(kind)? {
            Strategy::Federated(strategy) => Ok(strategy),
            Strategy::Local(_) => Err(AuthError::UnknownStrategy(kind)),
        }
    }

    pub async fn authenticate(
        &self,
        kind: StrategyKind,
        credentials: Credentials,
    ) -> Result<Principal, AuthError> {
        self.get(kind)?.verify(credentials).await
    }
}
