//! Username/password strategy

use std::sync::Arc;

use super::AuthError;
use crate::models::Principal;
use crate::services::AccountService;

pub struct LocalStrategy {
    accounts: Arc<AccountService>,
}

impl LocalStrategy {
    pub fn new(accounts: Arc<AccountService>) -> Self {
        Self { accounts }
    }

    /// Check the pair against the credential store
    ///
    /// Empty fields are `MissingInput`; an unknown user and a wrong password
    /// both come back as `InvalidCredentials`.
    pub async fn verify(&self, username: &str, password: &str) -> Result<Principal, AuthError> {
        if username.is_empty() {
            return Err(AuthError::MissingInput("username".to_string()));
        }
        if password.is_empty() {
            return Err(AuthError::MissingInput("password".to_string()));
        }

        let user = self.accounts.verify_credentials(username, password).await?;
        Ok(Principal::Local(user))
    }
}
