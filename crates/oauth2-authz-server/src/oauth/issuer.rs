//! Token minting and access token resolution.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::keys::KeyManager;
use super::store::GrantStore;
use crate::config::{Config, TokenFormat};
use crate::error::{OAuthError, OAuthResult};
use crate::models::{
    FamilyId, Scope, TokenKind, TokenRecord, TokenResponse, UserId, expiry_after, random_string,
};

/// Length of opaque token values.
const OPAQUE_TOKEN_LENGTH: usize = 48;

/// Claims of a signed access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    /// User id, or the client id for client_credentials tokens.
    pub sub: String,
    pub aud: String,
    pub scope: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub client_id: String,
}

/// What the resource side learns from a valid access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    pub client_id: String,
    pub user_id: Option<UserId>,
    pub scope: Scope,
    pub expires_at: DateTime<Utc>,
}

/// Parameters of one issuance.
#[derive(Debug, Clone)]
pub struct Issuance<'a> {
    pub client_id: &'a str,
    pub user_id: Option<UserId>,
    pub scope: Scope,
    pub family_id: FamilyId,
    pub include_refresh: bool,
}

/// Mints access and refresh tokens and records them in the store.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    config: Arc<Config>,
    keys: Arc<KeyManager>,
    store: GrantStore,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(config: Arc<Config>, keys: Arc<KeyManager>, store: GrantStore) -> Self {
        Self { config, keys, store }
    }

    /// Issue an access token, and a refresh token if requested, in one family.
    pub async fn issue(&self, issuance: Issuance<'_>) -> OAuthResult<TokenResponse> {
        let now = Utc::now();
        let expires_at = expiry_after(now, self.config.access_token_ttl);

        let (access_token, access_key) = match self.config.token_format {
            TokenFormat::Opaque => {
                let value = random_string(OPAQUE_TOKEN_LENGTH);
                (value.clone(), value)
            }
            TokenFormat::Signed => {
                let jti = uuid::Uuid::new_v4().to_string();
                let claims = AccessClaims {
                    iss: self.config.issuer.clone(),
                    sub: issuance
                        .user_id
                        .map_or_else(|| issuance.client_id.to_string(), |id| id.to_string()),
                    aud: issuance.client_id.to_string(),
                    scope: issuance.scope.to_string(),
                    exp: expires_at.timestamp(),
                    iat: now.timestamp(),
                    jti: jti.clone(),
                    client_id: issuance.client_id.to_string(),
                };
                (self.keys.sign(&claims)?, jti)
            }
        };

        let record = |key: String, kind: TokenKind, expires_at: DateTime<Utc>| TokenRecord {
            key,
            kind,
            client_id: issuance.client_id.to_string(),
            user_id: issuance.user_id,
            scope: issuance.scope.clone(),
            family_id: issuance.family_id,
            issued_at: now,
            expires_at,
            revoked: false,
            rotated: false,
        };

        let mut records = vec![record(access_key, TokenKind::Access, expires_at)];
        let refresh_token = issuance.include_refresh.then(|| random_string(OPAQUE_TOKEN_LENGTH));
        if let Some(value) = &refresh_token {
            let refresh_expiry = expiry_after(now, self.config.refresh_token_ttl);
            records.push(record(value.clone(), TokenKind::Refresh, refresh_expiry));
        }
        self.store.insert_tokens(records).await?;

        tracing::info!(
            client_id = %issuance.client_id,
            family_id = %issuance.family_id,
            scope = %issuance.scope,
            refresh = refresh_token.is_some(),
            "Issued tokens"
        );

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer",
            expires_in: self.config.access_token_ttl.as_secs(),
            refresh_token,
            scope: issuance.scope,
        })
    }

    /// Validate an access token and return its context.
    pub async fn resolve_access(&self, token: &str, now: DateTime<Utc>) -> OAuthResult<AccessContext> {
        let key = if looks_like_jwt(token) {
            let claims: AccessClaims = self
                .keys
                .verify(token)
                .map_err(|_| OAuthError::InvalidToken("The access token is invalid"))?;
            claims.jti
        } else {
            token.to_string()
        };

        let record = self
            .store
            .get_token(&key)
            .await
            .filter(|record| record.kind == TokenKind::Access)
            .ok_or(OAuthError::InvalidToken("The access token is invalid"))?;
        if record.revoked {
            return Err(OAuthError::InvalidToken("The access token was revoked"));
        }
        if record.is_expired_at(now) {
            return Err(OAuthError::InvalidToken("The access token expired"));
        }

        Ok(AccessContext {
            client_id: record.client_id,
            user_id: record.user_id,
            scope: record.scope,
            expires_at: record.expires_at,
        })
    }

    /// Store key of a presented token: the `jti` of a signed access token that
    /// verifies (expired or not), otherwise the value itself.
    #[must_use]
    pub fn store_key(&self, token: &str) -> String {
        if looks_like_jwt(token) {
            if let Ok(claims) = self.keys.verify_ignoring_expiry::<AccessClaims>(token) {
                return claims.jti;
            }
        }
        token.to_string()
    }

    #[must_use]
    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }
}

fn looks_like_jwt(token: &str) -> bool {
    token.split('.').count() == 3
}
