//! Token endpoint logic (RFC 6749 §4.1.3, §4.4, §6).

use std::sync::Arc;

use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;

use super::issuer::{Issuance, TokenIssuer};
use super::registry::{ClientCredential, ClientRegistry};
use super::store::{GrantStore, RedeemFailure, RefreshFailure, RefreshPolicy};
use crate::config::Config;
use crate::error::{OAuthError, OAuthResult};
use crate::models::{AuthorizationGrant, Client, FamilyId, GrantType, Scope, TokenResponse};

/// Raw token request form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequestForm {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// The grants this endpoint supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode { code: String, redirect_uri: Option<String>, code_verifier: Option<String> },
    RefreshToken { refresh_token: String, scope: Option<Scope> },
    ClientCredentials { scope: Option<Scope> },
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

impl TokenGrant {
    /// Parse the grant from the form. Anything outside the closed set, including
    /// `password` and `implicit`, is `unsupported_grant_type`.
    pub fn from_form(form: &TokenRequestForm) -> OAuthResult<Self> {
        let grant_type = form
            .grant_type
            .as_deref()
            .filter(|value| !value.is_empty())
            .ok_or(OAuthError::InvalidRequest("Missing grant_type"))?;
        let scope = non_empty(form.scope.as_ref()).map(|raw| Scope::parse(&raw));

        match grant_type.parse::<GrantType>() {
            Ok(GrantType::AuthorizationCode) => Ok(Self::AuthorizationCode {
                code: non_empty(form.code.as_ref())
                    .ok_or(OAuthError::InvalidRequest("Missing code"))?,
                redirect_uri: non_empty(form.redirect_uri.as_ref()),
                code_verifier: non_empty(form.code_verifier.as_ref()),
            }),
            Ok(GrantType::RefreshToken) => Ok(Self::RefreshToken {
                refresh_token: non_empty(form.refresh_token.as_ref())
                    .ok_or(OAuthError::InvalidRequest("Missing refresh_token"))?,
                scope,
            }),
            Ok(GrantType::ClientCredentials) => Ok(Self::ClientCredentials { scope }),
            Ok(GrantType::Implicit) | Err(_) => Err(OAuthError::UnsupportedGrantType),
        }
    }

    #[must_use]
    pub const fn grant_type(&self) -> GrantType {
        match self {
            Self::AuthorizationCode { .. } => GrantType::AuthorizationCode,
            Self::RefreshToken { .. } => GrantType::RefreshToken,
            Self::ClientCredentials { .. } => GrantType::ClientCredentials,
        }
    }
}

/// A token endpoint error, remembering whether HTTP Basic was attempted so
/// `invalid_client` can carry a matching challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenError {
    pub error: OAuthError,
    pub basic_attempted: bool,
}

impl IntoResponse for TokenError {
    fn into_response(self) -> Response {
        let mut response = self.error.into_response();
        if self.error == OAuthError::InvalidClient && self.basic_attempted {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic realm=\"oauth\""));
        }
        response
    }
}

/// Authenticates clients and exchanges grants for tokens.
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    config: Arc<Config>,
    registry: ClientRegistry,
    store: GrantStore,
    issuer: TokenIssuer,
}

impl TokenEndpoint {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        registry: ClientRegistry,
        store: GrantStore,
        issuer: TokenIssuer,
    ) -> Self {
        Self { config, registry, store, issuer }
    }

    /// Handle a token request. `authorization` is the raw `Authorization` header.
    pub async fn exchange(
        &self,
        authorization: Option<&str>,
        form: TokenRequestForm,
    ) -> Result<TokenResponse, TokenError> {
        let basic_attempted = authorization.is_some();
        let fail = |error: OAuthError| TokenError { error, basic_attempted };

        let credential = ClientCredential::from_request(
            authorization,
            form.client_id.as_deref(),
            form.client_secret.as_deref(),
        )
        .map_err(fail)?;
        let client = self.registry.authenticate(&credential).await.map_err(fail)?;

        let grant = TokenGrant::from_form(&form).map_err(fail)?;
        ClientRegistry::validate_grant_type(&client, grant.grant_type()).map_err(fail)?;

        let grant_type = grant.grant_type();
        let result = match grant {
            TokenGrant::AuthorizationCode { code, redirect_uri, code_verifier } => {
                self.authorization_code(&client, &code, redirect_uri, code_verifier).await
            }
            TokenGrant::RefreshToken { refresh_token, scope } => {
                self.refresh(&client, &refresh_token, scope).await
            }
            TokenGrant::ClientCredentials { scope } => self.client_credentials(&client, scope).await,
        };

        result.map_err(|error| {
            tracing::warn!(
                client_id = %client.client_id,
                grant_type = %grant_type,
                error = error.error_code(),
                "Token request rejected"
            );
            fail(error)
        })
    }

    async fn authorization_code(
        &self,
        client: &Client,
        code: &str,
        redirect_uri: Option<String>,
        code_verifier: Option<String>,
    ) -> OAuthResult<TokenResponse> {
        let require_verifier = client.is_public() && self.config.pkce.require_for_public;

        let check = |grant: &AuthorizationGrant| {
            if !grant.redirect_uri_matches(redirect_uri.as_deref()) {
                return Err(OAuthError::InvalidGrant);
            }
            match (&grant.pkce, code_verifier.as_deref()) {
                (Some(challenge), Some(verifier)) if challenge.verify(verifier) => Ok(()),
                (None, None) if !require_verifier => Ok(()),
                _ => Err(OAuthError::InvalidGrant),
            }
        };

        let grant = self
            .store
            .redeem_code(code, &client.client_id, Utc::now(), self.config.revoke_on_code_replay, check)
            .await
            .map_err(|failure| match failure {
                RedeemFailure::Invalid | RedeemFailure::Replayed { .. } => OAuthError::InvalidGrant,
                RedeemFailure::Rejected(error) => error,
            })?;

        self.issuer
            .issue(Issuance {
                client_id: &client.client_id,
                user_id: Some(grant.user_id),
                scope: grant.scope,
                family_id: grant.family_id,
                include_refresh: client.allows_grant(GrantType::RefreshToken),
            })
            .await
    }

    async fn refresh(
        &self,
        client: &Client,
        refresh_token: &str,
        requested: Option<Scope>,
    ) -> OAuthResult<TokenResponse> {
        let policy = RefreshPolicy {
            rotate: self.config.rotate_refresh_tokens,
            revoke_family_on_reuse: self.config.revoke_family_on_refresh_reuse,
        };
        let record = self
            .store
            .use_refresh_token(
                refresh_token,
                &client.client_id,
                requested.as_ref(),
                Utc::now(),
                policy,
            )
            .await
            .map_err(|failure| match failure {
                RefreshFailure::ScopeExceeded => OAuthError::InvalidScope,
                RefreshFailure::Invalid | RefreshFailure::Reused { .. } => OAuthError::InvalidGrant,
            })?;

        self.issuer
            .issue(Issuance {
                client_id: &client.client_id,
                user_id: record.user_id,
                scope: requested.unwrap_or(record.scope),
                family_id: record.family_id,
                include_refresh: policy.rotate,
            })
            .await
    }

    async fn client_credentials(
        &self,
        client: &Client,
        requested: Option<Scope>,
    ) -> OAuthResult<TokenResponse> {
        if client.is_public() {
            return Err(OAuthError::UnauthorizedClient);
        }
        let scope = match requested {
            Some(scope) if scope.is_subset(client.allowed_scope()) => scope,
            Some(_) => return Err(OAuthError::InvalidScope),
            None => client.allowed_scope().clone(),
        };

        self.issuer
            .issue(Issuance {
                client_id: &client.client_id,
                user_id: None,
                scope,
                family_id: FamilyId::new(),
                include_refresh: false,
            })
            .await
    }
}
