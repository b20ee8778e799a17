use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

/// Minimum lengths enforced before credentials are sent anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialPolicy {
    /// Minimum username length in characters, after trimming.
    pub min_username_len: usize,
    /// Minimum password length in characters.
    pub min_password_len: usize,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            min_username_len: 3,
            min_password_len: 6,
        }
    }
}

impl CredentialPolicy {
    /// Check the local preconditions; the username is trimmed, the password is not.
    pub fn validate(&self, username: &str, password: &str) -> ApiResult<Credentials> {
        let username = username.trim();
        if username.chars().count() < self.min_username_len {
            return Err(ApiError::Validation(format!(
                "username must have at least {} characters",
                self.min_username_len
            )));
        }
        if password.chars().count() < self.min_password_len {
            return Err(ApiError::Validation(format!(
                "password must have at least {} characters",
                self.min_password_len
            )));
        }
        Ok(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// Credentials that passed [`CredentialPolicy::validate`].
#[derive(Clone)]
pub struct Credentials {
    /// Trimmed username.
    pub username: String,
    /// Password exactly as typed.
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
