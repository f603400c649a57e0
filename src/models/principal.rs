//! Authenticated identities

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::{SessionRecord, User};

/// Registered authentication strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Local,
    Facebook,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Local => "local",
            StrategyKind::Facebook => "facebook",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile document returned by an identity provider
///
/// Kept as raw JSON; only `id`, `username` and `name` are ever read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederatedProfile {
    pub provider: StrategyKind,
    pub raw: Value,
}

impl FederatedProfile {
    pub fn new(provider: StrategyKind, raw: Value) -> Self {
        Self { provider, raw }
    }

    /// Provider-side identifier; Graph API ids may arrive as strings or numbers
    pub fn id(&self) -> Option<String> {
        match self.raw.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.text_field("username")
    }

    pub fn display_name(&self) -> Option<&str> {
        self.text_field("name")
    }

    fn text_field(&self, key: &str) -> Option<&str> {
        self.raw
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// An authenticated identity
///
/// Strategies produce `Local` or `Federated` for the request that logged in;
/// later requests see whatever the session serializer rebuilt.
#[derive(Debug, Clone)]
pub enum Principal {
    Local(User),
    Federated(FederatedProfile),
    /// Rebuilt verbatim from a stored session record
    Restored(SessionRecord),
}

impl Principal {
    pub fn strategy(&self) -> StrategyKind {
        match self {
            Principal::Local(_) => StrategyKind::Local,
            Principal::Federated(profile) => profile.provider,
            Principal::Restored(record) => record.strategy,
        }
    }
}
