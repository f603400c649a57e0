//! Data models
//!
//! - [`User`]: a locally registered account
//! - [`Principal`]: whatever a strategy authenticated for the current request
//! - [`Session`]: server-side session state keyed by an opaque token

mod principal;
mod session;
mod user;

pub use principal::{FederatedProfile, Principal, StrategyKind};
pub use session::{PendingAuthorization, Session, SessionData, SessionRecord};
pub use user::{CreateUserInput, User};
