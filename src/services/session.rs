//! Session lifecycle
//!
//! Wraps a [`SessionStore`] with the rules the HTTP layer relies on:
//! - every write pushes `expires_at` to now + TTL; sessions without a user
//!   use the (shorter) anonymous TTL
//! - logging in moves the session to a fresh token and destroys the old one
//! - logging out either destroys the session or only forgets the user

use crate::auth::AuthError;
use crate::config::MAX_SESSION_TTL_SECONDS;
use crate::models::{Session, SessionData, SessionRecord};
use crate::session::SessionStore;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Default session lifetime in seconds
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 60 * 60;

/// Default lifetime of sessions without a user
pub const DEFAULT_ANONYMOUS_TTL_SECONDS: i64 = 10 * 60;

/// `seconds` as a `TimeDelta`, clamped to +/- the longest supported TTL
fn ttl_delta(seconds: i64) -> TimeDelta {
    let seconds = seconds.clamp(-MAX_SESSION_TTL_SECONDS, MAX_SESSION_TTL_SECONDS);
    TimeDelta::try_seconds(seconds).unwrap_or_default()
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    ttl: TimeDelta,
    anonymous_ttl: TimeDelta,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_ttl(store, DEFAULT_SESSION_TTL_SECONDS)
    }

    /// Manager whose sessions live `ttl_seconds` after their last write
    ///
    /// Negative values produce already-expired sessions, which tests use.
    pub fn with_ttl(store: Arc<dyn SessionStore>, ttl_seconds: i64) -> Self {
        let ttl = ttl_delta(ttl_seconds);
        Self {
            store,
            ttl,
            anonymous_ttl: ttl_delta(DEFAULT_ANONYMOUS_TTL_SECONDS).min(ttl),
        }
    }

    /// Lifetime of sessions without a user; never longer than the main TTL
    pub fn with_anonymous_ttl(mut self, ttl_seconds: i64) -> Self {
        self.anonymous_ttl = ttl_delta(ttl_seconds).min(self.ttl);
        self
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    fn expiry_for(&self, data: &SessionData) -> DateTime<Utc> {
        let ttl = if data.user.is_some() {
            self.ttl
        } else {
            self.anonymous_ttl
        };
        Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Live session for `token`
    pub async fn resolve(&self, token: &str) -> Result<Option<Session>, AuthError> {
        self.store
            .load(token)
            .await
            .map_err(AuthError::SessionOperationFailed)
    }

    /// Fresh, unsaved session with a new random token
    pub fn start(&self) -> Session {
        let data = SessionData::default();
        Session {
            token: Uuid::new_v4().to_string(),
            expires_at: self.expiry_for(&data),
            data,
            created_at: Utc::now(),
        }
    }

    /// Write `session` back, restarting its TTL
    pub async fn persist(&self, session: &mut Session) -> Result<(), AuthError> {
        session.expires_at = self.expiry_for(&session.data);
        self.store
            .save(session)
            .await
            .map_err(AuthError::SessionOperationFailed)
    }

    /// Bind `record` to a new session token
    ///
    /// Ancillary data from `previous` is carried over, except the pending
    /// provider round-trip which has been consumed. The old token stops
    /// resolving.
    pub async fn log_in(
        &self,
        previous: Option<Session>,
        record: SessionRecord,
    ) -> Result<Session, AuthError> {
        let mut session = self.start();

        if let Some(previous) = previous {
            session.data = previous.data;
            session.data.pending_authorization = None;
            self.store
                .destroy(&previous.token)
                .await
                .map_err(AuthError::SessionOperationFailed)?;
        }

        session.data.user = Some(record);
        self.persist(&mut session).await?;

        tracing::debug!("Session regenerated for login");
        Ok(session)
    }

    /// Drop the user from `session`
    ///
    /// Without `keep_session_info` the whole session is destroyed and `None`
    /// is returned; otherwise the session survives with its other data.
    pub async fn log_out(
        &self,
        mut session: Session,
        keep_session_info: bool,
    ) -> Result<Option<Session>, AuthError> {
        if keep_session_info {
            session.data.user = None;
            self.persist(&mut session).await?;
            Ok(Some(session))
        } else {
            self.store
                .destroy(&session.token)
                .await
                .map_err(AuthError::SessionOperationFailed)?;
            Ok(None)
        }
    }

    /// Queue a flash message on `session` and save it
    pub async fn push_message(
        &self,
        session: &mut Session,
        message: impl Into<String>,
    ) -> Result<(), AuthError> {
        session.data.messages.push(message.into());
        self.persist(session).await
    }

    /// Remove and return all flash messages
    pub async fn take_messages(&self, session: &mut Session) -> Result<Vec<String>, AuthError> {
        if session.data.messages.is_empty() {
            return Ok(Vec::new());
        }
        let messages = std::mem::take(&mut session.data.messages);
        self.persist(session).await?;
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PendingAuthorization, StrategyKind};
    use crate::session::MemorySessionStore;

    fn manager() -> SessionManager {
        SessionManager::new(MemorySessionStore::boxed(100, std::time::Duration::from_secs(3600)))
    }

    fn record(username: &str) -> SessionRecord {
        SessionRecord {
            id: "1".to_string(),
            username: username.to_string(),
            strategy: StrategyKind::Local,
        }
    }

    #[tokio::test]
    async fn test_start_is_not_persisted() {
        let manager = manager();
        let session = manager.start();

        assert!(!session.token.is_empty());
        assert!(manager.resolve(&session.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_log_in_without_previous_session() {
        let manager = manager();

        let session = manager.log_in(None, record("alice")).await.unwrap();

        let resolved = manager.resolve(&session.token).await.unwrap().unwrap();
        assert_eq!(resolved.data.user, Some(record("alice")));
    }

    #[tokio::test]
    async fn test_log_in_regenerates_token() {
        let manager = manager();
        let mut anonymous = manager.start();
        anonymous.data.pending_authorization = Some(PendingAuthorization {
            strategy: StrategyKind::Facebook,
            csrf_state: "state".to_string(),
            pkce_verifier: "verifier".to_string(),
        });
        manager.push_message(&mut anonymous, "hello").await.unwrap();
        let old_token = anonymous.token.clone();

        let session = manager.log_in(Some(anonymous), record("alice")).await.unwrap();

        assert_ne!(session.token, old_token);
        assert!(manager.resolve(&old_token).await.unwrap().is_none());
        assert_eq!(session.data.messages, vec!["hello".to_string()]);
        assert!(session.data.pending_authorization.is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_treated_as_absent() {
        let store = MemorySessionStore::boxed(100, std::time::Duration::from_secs(3600));
        let manager = SessionManager::with_ttl(store, -1);

        let session = manager.log_in(None, record("alice")).await.unwrap();

        assert!(manager.resolve(&session.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_log_out_destroys_session() {
        let manager = manager();
        let session = manager.log_in(None, record("alice")).await.unwrap();
        let token = session.token.clone();

        let remaining = manager.log_out(session, false).await.unwrap();

        assert!(remaining.is_none());
        assert!(manager.resolve(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_log_out_keeping_session_info() {
        let manager = manager();
        let mut session = manager.log_in(None, record("alice")).await.unwrap();
        manager.push_message(&mut session, "kept").await.unwrap();
        let token = session.token.clone();

        let remaining = manager.log_out(session, true).await.unwrap().unwrap();

        assert!(remaining.data.user.is_none());
        let resolved = manager.resolve(&token).await.unwrap().unwrap();
        assert!(resolved.data.user.is_none());
        assert_eq!(resolved.data.messages, vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn test_take_messages_consumes() {
        let manager = manager();
        let mut session = manager.start();
        manager.push_message(&mut session, "one").await.unwrap();
        manager.push_message(&mut session, "two").await.unwrap();

        let mut loaded = manager.resolve(&session.token).await.unwrap().unwrap();
        let messages = manager.take_messages(&mut loaded).await.unwrap();
        assert_eq!(messages, vec!["one".to_string(), "two".to_string()]);

        let mut again = manager.resolve(&session.token).await.unwrap().unwrap();
        assert!(manager.take_messages(&mut again).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persist_extends_expiry() {
        let manager = manager();
        let mut session = manager.start();
        session.expires_at = Utc::now();

        manager.persist(&mut session).await.unwrap();
        assert!(session.expires_at <= Utc::now() + TimeDelta::minutes(10));

        session.data.user = Some(record("alice"));
        manager.persist(&mut session).await.unwrap();
        assert!(session.expires_at > Utc::now() + TimeDelta::minutes(59));
    }

    #[tokio::test]
    async fn test_anonymous_ttl_never_exceeds_main_ttl() {
        let store = MemorySessionStore::boxed(100, std::time::Duration::from_secs(3600));
        let manager = SessionManager::with_ttl(store, 60).with_anonymous_ttl(3600);

        let mut session = manager.start();
        manager.push_message(&mut session, "flash").await.unwrap();

        assert!(session.expires_at <= Utc::now() + TimeDelta::seconds(60));
    }

    #[tokio::test]
    async fn test_extreme_ttl_does_not_panic() {
        for ttl in [i64::MAX, 9_000_000_000_000_000, i64::MIN] {
            let store = MemorySessionStore::boxed(100, std::time::Duration::from_secs(3600));
            let manager = SessionManager::with_ttl(store, ttl).with_anonymous_ttl(ttl);

            let session = manager.log_in(None, record("alice")).await.unwrap();

            assert!(manager.ttl_seconds().abs() <= MAX_SESSION_TTL_SECONDS);
            assert_eq!(
                manager.resolve(&session.token).await.unwrap().is_some(),
                ttl > 0
            );
        }
    }
}
