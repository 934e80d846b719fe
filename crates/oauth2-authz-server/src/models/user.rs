//! End users (resource owners).

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::error::OAuthError;

/// Maximum username length.
const USERNAME_MAX: usize = 40;

/// Stable user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A resource owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

impl User {
    /// Normalize and validate a username: trimmed, 1-40 characters, no
    /// whitespace or control characters.
    pub fn validate_username(raw: &str) -> Result<String, OAuthError> {
        let username = raw.trim();
        if username.is_empty() || username.chars().count() > USERNAME_MAX {
            return Err(OAuthError::InvalidRequest("username must be 1-40 characters"));
        }
        if username.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(OAuthError::InvalidRequest("username must not contain whitespace"));
        }
        Ok(username.to_string())
    }
}
