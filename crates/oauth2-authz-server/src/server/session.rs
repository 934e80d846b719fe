//! Login sessions.
//!
//! Session ids live in a cookie; the server side is a `moka` cache with an
//! idle TTL, so abandoned sessions expire without a sweep task.

use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use moka::future::Cache;

use crate::config::defaults;
use crate::models::{UserId, random_string};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "sid";

/// Length of generated session ids.
const SESSION_ID_LENGTH: usize = 32;

/// In-memory session store mapping session ids to users.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<String, UserId>,
}

impl SessionStore {
    #[must_use]
    pub fn new(idle_ttl: Duration) -> Self {
        let sessions = Cache::builder()
            .max_capacity(defaults::SESSION_MAX_ENTRIES)
            .time_to_idle(idle_ttl)
            .build();
        Self { sessions }
    }

    /// Start a session for `user_id` and add its cookie to the jar.
    pub async fn login(&self, jar: CookieJar, user_id: UserId) -> CookieJar {
        let session_id = random_string(SESSION_ID_LENGTH);
        self.sessions.insert(session_id.clone(), user_id).await;
        tracing::debug!(user_id = %user_id, "Session started");

        let cookie = Cookie::build((SESSION_COOKIE, session_id))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build();
        jar.add(cookie)
    }

    /// The user of the jar's session, if any.
    pub async fn current_user(&self, jar: &CookieJar) -> Option<UserId> {
        let session_id = jar.get(SESSION_COOKIE)?.value().to_string();
        self.sessions.get(&session_id).await
    }

    /// End the jar's session and remove its cookie.
    pub async fn logout(&self, jar: CookieJar) -> CookieJar {
        if let Some(cookie) = jar.get(SESSION_COOKIE) {
            self.sessions.invalidate(cookie.value()).await;
        }
        jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").field("entries", &self.sessions.entry_count()).finish()
    }
}
