//! Authorization codes.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::{FamilyId, Scope, UserId};
use crate::error::OAuthError;
use crate::oauth::pkce;

/// PKCE code challenge method (RFC 7636 §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeChallengeMethod {
    Plain,
    S256,
}

impl CodeChallengeMethod {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "S256" => Ok(Self::S256),
            _ => Err(OAuthError::InvalidRequest("Unsupported code_challenge_method")),
        }
    }
}

/// A code challenge bound to an authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    pub challenge: String,
    pub method: CodeChallengeMethod,
}

impl PkceChallenge {
    /// Check a code verifier against this challenge.
    #[must_use]
    pub fn verify(&self, verifier: &str) -> bool {
        match self.method {
            CodeChallengeMethod::Plain => pkce::verify_plain(verifier, &self.challenge),
            CodeChallengeMethod::S256 => pkce::verify_s256(verifier, &self.challenge),
        }
    }
}

/// An authorization code issued after user approval.
#[derive(Debug, Clone)]
pub struct AuthorizationGrant {
    pub code: String,
    pub client_id: String,
    pub user_id: UserId,
    pub scope: Scope,
    /// Redirect URI the code was delivered to.
    pub redirect_uri: String,
    /// Whether `redirect_uri` was sent explicitly in the authorization request.
    /// If so, the token request must repeat it.
    pub redirect_uri_explicit: bool,
    pub pkce: Option<PkceChallenge>,
    /// Family shared by every token issued from this code.
    pub family_id: FamilyId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl AuthorizationGrant {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Check the `redirect_uri` presented at the token endpoint.
    #[must_use]
    pub fn redirect_uri_matches(&self, presented: Option<&str>) -> bool {
        match presented {
            Some(uri) => uri == self.redirect_uri,
            None => !self.redirect_uri_explicit,
        }
    }
}
