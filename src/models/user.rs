//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A locally registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Unique login name
    pub username: String,
    /// Argon2 PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row to insert into the credential store
///
/// The password must already be hashed with `services::password::hash_password`.
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub username: String,
    pub password_hash: String,
}

impl CreateUserInput {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
        }
    }
}
