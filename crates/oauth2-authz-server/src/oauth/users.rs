//! Resource owners, created on first login.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::OAuthResult;
use crate::models::{User, UserId};

#[derive(Default)]
struct Directory {
    by_id: HashMap<UserId, User>,
    by_username: HashMap<String, UserId>,
}

/// In-memory user directory. Users are never deleted.
#[derive(Clone, Default)]
pub struct UserDirectory {
    inner: Arc<RwLock<Directory>>,
}

impl UserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the user with this username, creating it if needed.
    pub async fn lookup_or_create(&self, username: &str) -> OAuthResult<User> {
        let username = User::validate_username(username)?;

        if let Some(user) = self.find(&username).await {
            return Ok(user);
        }

        let mut directory = self.inner.write().await;
        // Another login may have created it between the two locks.
        if let Some(id) = directory.by_username.get(&username) {
            if let Some(user) = directory.by_id.get(id) {
                return Ok(user.clone());
            }
        }
        let user = User { id: UserId::new(), username };
        directory.by_username.insert(user.username.clone(), user.id);
        directory.by_id.insert(user.id, user.clone());
        tracing::info!(user_id = %user.id, "Created user");
        Ok(user)
    }

    /// Look up an existing user by username. Never creates one.
    pub async fn find_by_username(&self, username: &str) -> Option<User> {
        let username = User::validate_username(username).ok()?;
        self.find(&username).await
    }

    pub async fn get(&self, id: UserId) -> Option<User> {
        self.inner.read().await.by_id.get(&id).cloned()
    }

    async fn find(&self, username: &str) -> Option<User> {
        let directory = self.inner.read().await;
        directory.by_username.get(username).and_then(|id| directory.by_id.get(id)).cloned()
    }
}

impl std::fmt::Debug for UserDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDirectory").finish()
    }
}
