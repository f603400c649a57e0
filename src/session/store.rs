//! Session store
//!
//! Sessions are kept in moka caches as JSON, keyed by token. Sessions with a
//! user and anonymous ones (flash messages, pending provider logins) live in
//! separate pools, so a burst of anonymous sessions can only evict other
//! anonymous sessions. Entries carry their own `expires_at`; an expired entry
//! is evicted on read and reported as absent even if the cache has not swept
//! it yet.

use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// moka refuses lifetimes beyond 1000 years; sessions never need more than one.
const MAX_CACHE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a live session; expired or unknown tokens yield `None`
    async fn load(&self, token: &str) -> Result<Option<Session>>;

    /// Insert or replace the session under its token
    async fn save(&self, session: &Session) -> Result<()>;

    /// Remove a session; unknown tokens are not an error
    async fn destroy(&self, token: &str) -> Result<()>;
}

#[derive(Clone)]
struct StoredSession(Arc<String>);

type SessionCache = Cache<String, StoredSession>;

pub struct MemorySessionStore {
    authenticated: SessionCache,
    anonymous: SessionCache,
}

impl std::fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySessionStore")
            .field("authenticated", &self.authenticated.entry_count())
            .field("anonymous", &self.anonymous.entry_count())
            .finish()
    }
}

/// A zero `ttl` disables the cache-level sweep; `expires_at` still applies.
fn build_cache(max_entries: u64, ttl: Duration) -> SessionCache {
    let mut builder = Cache::builder().max_capacity(max_entries);
    if !ttl.is_zero() {
        builder = builder.time_to_live(ttl.min(MAX_CACHE_TTL));
    }
    builder.build()
}

impl MemorySessionStore {
    /// Store holding at most `max_sessions` entries per pool, each dropped `ttl` after its last write
    pub fn new(max_sessions: u64, ttl: Duration) -> Self {
        Self {
            authenticated: build_cache(max_sessions, ttl),
            anonymous: build_cache(max_sessions, ttl),
        }
    }

    /// Replace the limits of the pool holding sessions without a user
    pub fn with_anonymous_pool(mut self, max_sessions: u64, ttl: Duration) -> Self {
        self.anonymous = build_cache(max_sessions, ttl);
        self
    }

    /// Boxed store for dependency injection
    pub fn boxed(max_sessions: u64, ttl: Duration) -> Arc<dyn SessionStore> {
        Arc::new(Self::new(max_sessions, ttl))
    }

    /// Pool `session` belongs in, and the one it must be absent from
    fn pools_for(&self, session: &Session) -> (&SessionCache, &SessionCache) {
        if session.data.user.is_some() {
            (&self.authenticated, &self.anonymous)
        } else {
            (&self.anonymous, &self.authenticated)
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, token: &str) -> Result<Option<Session>> {
        let entry = match self.authenticated.get(token).await {
            Some(entry) => entry,
            None => match self.anonymous.get(token).await {
                Some(entry) => entry,
                None => return Ok(None),
            },
        };

        let session: Session =
            serde_json::from_str(&entry.0).context("Failed to deserialize session")?;

        if session.is_expired() {
            tracing::debug!("Evicting expired session");
            self.destroy(token).await?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_string(session).context("Failed to serialize session")?;
        let (target, other) = self.pools_for(session);
        other.invalidate(&session.token).await;
        target
            .insert(session.token.clone(), StoredSession(Arc::new(json)))
            .await;
        Ok(())
    }

    async fn destroy(&self, token: &str) -> Result<()> {
        self.authenticated.invalidate(token).await;
        self.anonymous.invalidate(token).await;
        Ok(())
    }
}
