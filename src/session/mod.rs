//! Server-side sessions
//!
//! - [`store`]: token → session map with expiry
//! - [`cookie`]: signed session cookie encoding

pub mod cookie;
pub mod store;

pub use cookie::{CookieSigner, SessionCookie};
pub use store::{MemorySessionStore, SessionStore};
