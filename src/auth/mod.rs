//! Authentication
//!
//! Strategies turn credentials into a [`Principal`](crate::models::Principal);
//! the [`SessionSerializer`] reduces a principal to the record kept in the
//! session and rebuilds the request user from it.
//!
//! ```ignore
//! let mut strategies = StrategySet::new();
//! strategies.register(Strategy::Local(LocalStrategy::new(accounts.clone())));
//! let principal = strategies
//!     .authenticate(StrategyKind::Local, Credentials::password("alice", "hunter2"))
//!     .await?;
//! let record = SessionSerializer::serialize(&principal);
//! ```

pub mod error;
pub mod facebook;
pub mod federated;
pub mod local;
pub mod serializer;
pub mod strategy;

pub use error::AuthError;
pub use facebook::FacebookProvider;
pub use federated::{
    AuthorizationGrant, AuthorizationRedirect, FederatedStrategy, IdentityProvider, ProviderError,
};
pub use local::LocalStrategy;
pub use serializer::SessionSerializer;
pub use strategy::{Credentials, Strategy, StrategySet};
