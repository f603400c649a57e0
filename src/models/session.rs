//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StrategyKind;

/// Minimal projection of a principal kept in the session
///
/// Never carries a password hash or the provider's profile payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub strategy: StrategyKind,
}

/// In-flight provider round-trip, checked when the callback arrives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub strategy: StrategyKind,
    pub csrf_state: String,
    pub pkce_verifier: String,
}

/// Everything stored under one session token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Logged-in user, if any
    #[serde(default)]
    pub user: Option<SessionRecord>,
    /// One-shot flash messages
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub pending_authorization: Option<PendingAuthorization>,
}

/// Server-side session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque random token presented in the cookie
    pub token: String,
    pub data: SessionData,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expires_in: Duration) -> Session {
        let now = Utc::now();
        Session {
            token: "t".to_string(),
            data: SessionData::default(),
            created_at: now,
            expires_at: now + expires_in,
        }
    }

    #[test]
    fn test_is_expired() {
        assert!(!session(Duration::hours(1)).is_expired());
        assert!(session(Duration::seconds(-1)).is_expired());
    }

    #[test]
    fn test_record_without_strategy_defaults_to_local() {
        let record: SessionRecord =
            serde_json::from_str(r#"{"id":"1","username":"alice"}"#).unwrap();
        assert_eq!(record.strategy, StrategyKind::Local);
    }
}
