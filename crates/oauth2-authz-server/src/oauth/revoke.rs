//! Token revocation (RFC 7009).

use serde::Deserialize;

use super::issuer::TokenIssuer;
use super::registry::{ClientCredential, ClientRegistry};
use super::store::{GrantStore, Revocation};
use super::token::TokenError;
use crate::error::OAuthError;
use crate::models::TokenKind;

/// Raw revocation request form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevocationForm {
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Parse `token_type_hint`. Unknown hints are ignored.
fn parse_hint(hint: Option<&str>) -> Option<TokenKind> {
    match hint {
        Some("access_token") => Some(TokenKind::Access),
        Some("refresh_token") => Some(TokenKind::Refresh),
        _ => None,
    }
}

/// Revokes access and refresh tokens on behalf of authenticated clients.
#[derive(Debug, Clone)]
pub struct RevocationEndpoint {
    registry: ClientRegistry,
    store: GrantStore,
    issuer: TokenIssuer,
}

impl RevocationEndpoint {
    #[must_use]
    pub fn new(registry: ClientRegistry, store: GrantStore, issuer: TokenIssuer) -> Self {
        Self { registry, store, issuer }
    }

    /// Revoke a token. Unknown, foreign and already revoked tokens all succeed
    /// silently; only client authentication and a missing `token` fail.
    pub async fn revoke(
        &self,
        authorization: Option<&str>,
        form: RevocationForm,
    ) -> Result<(), TokenError> {
        let basic_attempted = authorization.is_some();
        let fail = |error: OAuthError| TokenError { error, basic_attempted };

        let credential = ClientCredential::from_request(
            authorization,
            form.client_id.as_deref(),
            form.client_secret.as_deref(),
        )
        .map_err(fail)?;
        let client = self.registry.authenticate(&credential).await.map_err(fail)?;

        let token = form
            .token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| fail(OAuthError::InvalidRequest("Missing token")))?;

        // Signed access tokens are stored under their jti; opaque values as is.
        let signed_key = self.issuer.store_key(token);
        let mut candidates = vec![token.to_string()];
        if signed_key != token {
            match parse_hint(form.token_type_hint.as_deref()) {
                Some(TokenKind::Refresh) => candidates.push(signed_key),
                _ => candidates.insert(0, signed_key),
            }
        }

        let mut outcome = Revocation::NotFound;
        for key in &candidates {
            outcome = self.store.revoke(key, &client.client_id).await;
            if outcome != Revocation::NotFound {
                break;
            }
        }

        match outcome {
            Revocation::NotFound => {
                tracing::debug!(client_id = %client.client_id, "Revocation of unknown token");
            }
            Revocation::NotOwned => {
                tracing::warn!(
                    client_id = %client.client_id,
                    "Revocation attempted for a token of another client"
                );
            }
            Revocation::Revoked { kind, count } => {
                tracing::info!(
                    client_id = %client.client_id,
                    kind = kind.as_str(),
                    count,
                    "Revoked token"
                );
            }
        }
        Ok(())
    }
}
