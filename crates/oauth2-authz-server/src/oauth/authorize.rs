//! Authorization endpoint logic (RFC 6749 §4.1.1, §4.2.1).
//!
//! Validation is fail-fast. Until the client and redirect URI are trusted,
//! errors are returned directly to the user agent; afterwards they are sent to
//! the client's redirect URI, in the query for the code flow and in the
//! fragment for the implicit flow. The end user is passed in explicitly as a
//! [`ConsentDecision`]; this module knows nothing about sessions.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::issuer::{Issuance, TokenIssuer};
use super::pkce;
use super::registry::ClientRegistry;
use super::store::GrantStore;
use crate::config::Config;
use crate::error::OAuthError;
use crate::models::{
    AuthorizationGrant, Client, CodeChallengeMethod, FamilyId, PkceChallenge, ResponseType, Scope,
    User, expiry_after, random_string,
};

/// Length of generated authorization codes.
const CODE_LENGTH: usize = 40;

/// Raw authorization request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,
}

impl AuthorizationRequest {
    /// Treat empty parameters as absent, as HTML forms send them.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.response_type,
            &mut self.client_id,
            &mut self.redirect_uri,
            &mut self.scope,
            &mut self.state,
            &mut self.code_challenge,
            &mut self.code_challenge_method,
        ] {
            if field.as_deref().is_some_and(|value| value.trim().is_empty()) {
                *field = None;
            }
        }
        self
    }

    /// Present parameters as name/value pairs, e.g. for hidden form fields.
    #[must_use]
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("response_type", &self.response_type),
            ("client_id", &self.client_id),
            ("redirect_uri", &self.redirect_uri),
            ("scope", &self.scope),
            ("state", &self.state),
            ("code_challenge", &self.code_challenge),
            ("code_challenge_method", &self.code_challenge_method),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|value| (name, value)))
        .collect()
    }
}

/// A request that passed validation and awaits the user's decision.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub client: Client,
    pub response_type: ResponseType,
    pub redirect_uri: String,
    pub redirect_uri_explicit: bool,
    pub scope: Scope,
    pub state: Option<String>,
    pub pkce: Option<PkceChallenge>,
    /// The parameters as received, for re-submission from a consent form.
    pub request: AuthorizationRequest,
}

/// The resource owner's decision, supplied by the caller.
#[derive(Debug, Clone, Copy)]
pub enum ConsentDecision<'a> {
    /// No decision yet.
    Pending,
    Approved(&'a User),
    Denied,
}

/// Result of processing an authorization request.
#[derive(Debug, Clone)]
pub enum AuthorizationOutcome {
    /// Valid request; ask the user.
    NeedsConsent(Box<ValidatedRequest>),
    /// Send the user agent to this location (success or redirected error).
    Redirect(String),
    /// Error shown directly; the redirect URI is not trusted.
    Rejected(OAuthError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseMode {
    Query,
    Fragment,
}

impl From<ResponseType> for ResponseMode {
    fn from(response_type: ResponseType) -> Self {
        match response_type {
            ResponseType::Code => Self::Query,
            ResponseType::Token => Self::Fragment,
        }
    }
}

/// Append parameters to a redirect URI in the query or fragment.
fn build_redirect(redirect_uri: &str, mode: ResponseMode, params: &[(&str, &str)]) -> String {
    let encoded = url::form_urlencoded::Serializer::new(String::new()).extend_pairs(params).finish();
    match mode {
        ResponseMode::Query => {
            let separator = match redirect_uri.find('?') {
                None => "?",
                Some(index) if index + 1 == redirect_uri.len() => "",
                Some(_) => "&",
            };
            format!("{redirect_uri}{separator}{encoded}")
        }
        ResponseMode::Fragment => format!("{redirect_uri}#{encoded}"),
    }
}

fn error_redirect(
    redirect_uri: &str,
    mode: ResponseMode,
    error: OAuthError,
    state: Option<&str>,
) -> AuthorizationOutcome {
    let mut params = vec![("error", error.error_code()), ("error_description", error.description())];
    if let Some(state) = state {
        params.push(("state", state));
    }
    AuthorizationOutcome::Redirect(build_redirect(redirect_uri, mode, &params))
}

/// Validates authorization requests and issues codes or implicit tokens.
#[derive(Debug, Clone)]
pub struct AuthorizationEngine {
    config: Arc<Config>,
    registry: ClientRegistry,
    store: GrantStore,
    issuer: TokenIssuer,
}

impl AuthorizationEngine {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        registry: ClientRegistry,
        store: GrantStore,
        issuer: TokenIssuer,
    ) -> Self {
        Self { config, registry, store, issuer }
    }

    /// Process an authorization request with the user's decision.
    pub async fn authorize(
        &self,
        request: AuthorizationRequest,
        decision: ConsentDecision<'_>,
    ) -> AuthorizationOutcome {
        let validated = match self.validate(request.normalized()).await {
            Ok(validated) => validated,
            Err(outcome) => return outcome,
        };

        match decision {
            ConsentDecision::Pending => AuthorizationOutcome::NeedsConsent(Box::new(validated)),
            ConsentDecision::Denied => {
                tracing::info!(client_id = %validated.client.client_id, "Authorization denied");
                error_redirect(
                    &validated.redirect_uri,
                    validated.response_type.into(),
                    OAuthError::AccessDenied,
                    validated.state.as_deref(),
                )
            }
            ConsentDecision::Approved(user) => match validated.response_type {
                ResponseType::Code => self.issue_code(validated, user).await,
                ResponseType::Token => self.issue_implicit(validated, user).await,
            },
        }
    }

    async fn validate(
        &self,
        request: AuthorizationRequest,
    ) -> Result<ValidatedRequest, AuthorizationOutcome> {
        use AuthorizationOutcome::Rejected;

        let client_id = request
            .client_id
            .as_deref()
            .ok_or(Rejected(OAuthError::InvalidRequest("Missing client_id")))?;
        let client = self.registry.lookup(client_id).await.map_err(Rejected)?;

        let redirect_uri =
            ClientRegistry::validate_redirect_uri(&client, request.redirect_uri.as_deref())
                .map_err(Rejected)?;
        let state = request.state.as_deref();

        // From here on errors go back to the client.
        let Some(raw_response_type) = request.response_type.as_deref() else {
            return Err(error_redirect(
                &redirect_uri,
                ResponseMode::Query,
                OAuthError::InvalidRequest("Missing response_type"),
                state,
            ));
        };
        let response_type: ResponseType = raw_response_type
            .parse()
            .map_err(|e| error_redirect(&redirect_uri, ResponseMode::Query, e, state))?;
        let mode = ResponseMode::from(response_type);
        let reject = |error: OAuthError| error_redirect(&redirect_uri, mode, error, state);

        ClientRegistry::validate_grant_type(&client, response_type.grant_type()).map_err(reject)?;

        let scope = match request.scope.as_deref() {
            None => client.allowed_scope().clone(),
            Some(raw) => {
                let requested = Scope::parse(raw);
                if !requested.is_subset(&self.config.scopes_supported)
                    || !requested.is_subset(client.allowed_scope())
                {
                    return Err(reject(OAuthError::InvalidScope));
                }
                requested
            }
        };

        let pkce = match response_type {
            ResponseType::Code => self.validate_pkce(&client, &request).map_err(reject)?,
            ResponseType::Token => None,
        };

        Ok(ValidatedRequest {
            response_type,
            redirect_uri_explicit: request.redirect_uri.is_some(),
            redirect_uri: redirect_uri.clone(),
            scope,
            state: request.state.clone(),
            pkce,
            client,
            request,
        })
    }

    fn validate_pkce(
        &self,
        client: &Client,
        request: &AuthorizationRequest,
    ) -> Result<Option<PkceChallenge>, OAuthError> {
        let Some(challenge) = request.code_challenge.as_deref() else {
            if request.code_challenge_method.is_some() {
                return Err(OAuthError::InvalidRequest("Missing code_challenge"));
            }
            if client.is_public() && self.config.pkce.require_for_public {
                return Err(OAuthError::InvalidRequest("Public clients must use PKCE"));
            }
            return Ok(None);
        };

        let method = match request.code_challenge_method.as_deref() {
            None => CodeChallengeMethod::Plain,
            Some(method) => method.parse()?,
        };
        if method == CodeChallengeMethod::Plain && !self.config.pkce.allow_plain {
            return Err(OAuthError::InvalidRequest("Plain code_challenge_method is not allowed"));
        }
        if !pkce::is_well_formed(challenge) {
            return Err(OAuthError::InvalidRequest("Malformed code_challenge"));
        }
        Ok(Some(PkceChallenge { challenge: challenge.to_string(), method }))
    }

    async fn issue_code(&self, validated: ValidatedRequest, user: &User) -> AuthorizationOutcome {
        let now = Utc::now();
        let code = random_string(CODE_LENGTH);
        let grant = AuthorizationGrant {
            code: code.clone(),
            client_id: validated.client.client_id.clone(),
            user_id: user.id,
            scope: validated.scope,
            redirect_uri: validated.redirect_uri.clone(),
            redirect_uri_explicit: validated.redirect_uri_explicit,
            pkce: validated.pkce,
            family_id: FamilyId::new(),
            created_at: now,
            expires_at: expiry_after(now, self.config.auth_code_ttl),
            used: false,
        };
        tracing::info!(
            client_id = %grant.client_id,
            user_id = %user.id,
            family_id = %grant.family_id,
            pkce = grant.pkce.is_some(),
            "Issued authorization code"
        );
        self.store.insert_code(grant).await;

        let mut params = vec![("code", code.as_str())];
        if let Some(state) = validated.state.as_deref() {
            params.push(("state", state));
        }
        AuthorizationOutcome::Redirect(build_redirect(
            &validated.redirect_uri,
            ResponseMode::Query,
            &params,
        ))
    }

    async fn issue_implicit(&self, validated: ValidatedRequest, user: &User) -> AuthorizationOutcome {
        let issued = self
            .issuer
            .issue(Issuance {
                client_id: &validated.client.client_id,
                user_id: Some(user.id),
                scope: validated.scope.clone(),
                family_id: FamilyId::new(),
                include_refresh: false,
            })
            .await;

        let state = validated.state.as_deref();
        match issued {
            Ok(response) => {
                let expires_in = response.expires_in.to_string();
                let scope = response.scope.to_string();
                let mut params = vec![
                    ("access_token", response.access_token.as_str()),
                    ("token_type", response.token_type),
                    ("expires_in", expires_in.as_str()),
                    ("scope", scope.as_str()),
                ];
                if let Some(state) = state {
                    params.push(("state", state));
                }
                AuthorizationOutcome::Redirect(build_redirect(
                    &validated.redirect_uri,
                    ResponseMode::Fragment,
                    &params,
                ))
            }
            Err(error) => {
                error_redirect(&validated.redirect_uri, ResponseMode::Fragment, error, state)
            }
        }
    }
}
