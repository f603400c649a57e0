//! Account service
//!
//! Signup and credential checks against the credential store:
//! - `register` hashes the password and inserts a user, rejecting taken names
//! - `verify_credentials` answers with the user or `InvalidCredentials`,
//!   without revealing which half of the pair was wrong

use crate::auth::AuthError;
use crate::db::repositories::{is_unique_violation, UserRepository};
use crate::models::{CreateUserInput, User};
use crate::services::password::{hash_password, verify_dummy, verify_password};
use anyhow::Context;
use std::sync::Arc;

pub struct AccountService {
    user_repo: Arc<dyn UserRepository>,
}

impl AccountService {
    pub fn new(user_repo: Arc<dyn UserRepository>) -> Self {
        Self { user_repo }
    }

    /// Create a local account
    ///
    /// # Errors
    ///
    /// - `MissingInput` if username or password is empty
    /// - `DuplicateUsername` if the name is taken, including a lost insert race
    /// - `Unhandled` for store or hashing failures
    pub async fn register(&self, input: RegisterInput) -> Result<User, AuthError> {
        input.validate()?;

        if self
            .user_repo
            .get_by_username(&input.username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(AuthError::DuplicateUsername(input.username));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;

        match self
            .user_repo
            .create(&CreateUserInput::new(&input.username, password_hash))
            .await
        {
            Ok(user) => {
                tracing::info!(user_id = user.id, username = %user.username, "Account created");
                Ok(user)
            }
            Err(e) if is_unique_violation(&e) => Err(AuthError::DuplicateUsername(input.username)),
            Err(e) => Err(AuthError::Unhandled(e.context("Failed to create user"))),
        }
    }

    /// Check a username/password pair
    pub async fn verify_credentials(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let user = match self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to look up user")?
        {
            Some(user) => user,
            None => {
                verify_dummy(password);
                return Err(AuthError::InvalidCredentials);
            }
        };

        let valid =
            verify_password(password, &user.password_hash).context("Failed to verify password")?;
        if !valid {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, AuthError> {
        Ok(self.user_repo.get_by_id(id).await?)
    }

    pub async fn count(&self) -> Result<i64, AuthError> {
        Ok(self.user_repo.count().await?)
    }
}

/// Signup form
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn validate(&self) -> Result<(), AuthError> {
        if self.username.is_empty() {
            return Err(AuthError::MissingInput("username".to_string()));
        }
        if self.password.is_empty() {
            return Err(AuthError::MissingInput("password".to_string()));
        }
        Ok(())
    }
}
