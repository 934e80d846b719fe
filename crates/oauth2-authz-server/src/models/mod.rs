//! Data model for the authorization server.
//!
//! Clients, users, authorization grants and token records, plus the [`Scope`]
//! set type shared by all of them. Records are plain owned data; the stores in
//! [`crate::oauth`] own them and hand out clones.

mod client;
mod grant;
mod scope;
mod token;
mod user;

use chrono::{DateTime, Utc};

pub use client::{
    Client, ClientForm, ClientMetadata, GrantType, ResponseType, TokenEndpointAuthMethod,
};
pub use grant::{AuthorizationGrant, CodeChallengeMethod, PkceChallenge};
pub use scope::Scope;
pub use token::{FamilyId, TokenKind, TokenRecord, TokenResponse};
pub use user::{User, UserId};

/// Alphabet for generated identifiers and secrets.
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random alphanumeric string from the OS-seeded thread RNG.
///
/// 48 characters carry ~285 bits of entropy.
#[must_use]
pub fn random_string(len: usize) -> String {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(ALPHANUMERIC[rng.gen_range(0..ALPHANUMERIC.len())]))
        .collect()
}

/// Expiry instant for a lifetime starting at `now`, saturating on overflow.
#[must_use]
pub fn expiry_after(now: DateTime<Utc>, ttl: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_string_alphabet_and_length() {
        let value = random_string(48);
        assert_eq!(value.len(), 48);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(value, random_string(48));
    }

    #[test]
    fn test_expiry_after_saturates() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, std::time::Duration::ZERO), now);
        assert_eq!(expiry_after(now, std::time::Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
