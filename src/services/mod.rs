//! Business logic
//!
//! - `account`: signup and credential verification
//! - `password`: argon2 hashing
//! - `session`: session lifecycle on top of the session store

pub mod account;
pub mod password;
pub mod session;

pub use account::{AccountService, RegisterInput};
pub use session::SessionManager;
