//! Session serializer
//!
//! `serialize` keeps only `{id, username}` (plus the strategy tag) of a
//! principal. `deserialize` rebuilds the request user from that record,
//! either trusting it as stored or reloading local users from the store.

use std::sync::Arc;

use super::AuthError;
use crate::config::DeserializeMode;
use crate::models::{Principal, SessionRecord, StrategyKind};
use crate::services::AccountService;

pub struct SessionSerializer {
    mode: DeserializeMode,
    accounts: Arc<AccountService>,
}

impl SessionSerializer {
    pub fn new(mode: DeserializeMode, accounts: Arc<AccountService>) -> Self {
        Self { mode, accounts }
    }

    /// Reduce `principal` to the record stored in the session
    ///
    /// The username falls back from `username` to `name` to the profile id.
    pub fn serialize(principal: &Principal) -> SessionRecord {
        match principal {
            Principal::Local(user) => SessionRecord {
                id: user.id.to_string(),
                username: user.username.clone(),
                strategy: StrategyKind::Local,
            },
            Principal::Federated(profile) => {
                let id = profile.id().unwrap_or_default();
                let username = profile
                    .username()
                    .or_else(|| profile.display_name())
                    .map(str::to_string)
                    .unwrap_or_else(|| id.clone());
                SessionRecord {
                    id,
                    username,
                    strategy: profile.provider,
                }
            }
            Principal::Restored(record) => record.clone(),
        }
    }

    /// Rebuild the request user; `None` means the session no longer names anyone
    pub async fn deserialize(&self, record: SessionRecord) -> Result<Option<Principal>, AuthError> {
        match (self.mode, record.strategy) {
            (DeserializeMode::Refetch, StrategyKind::Local) => {
                let Ok(id) = record.id.parse::<i64>() else {
                    return Ok(None);
                };
                Ok(self.accounts.get_by_id(id).await?.map(Principal::Local))
            }
            _ => Ok(Some(Principal::Restored(record))),
        }
    }
}
