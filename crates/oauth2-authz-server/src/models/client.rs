//! Registered OAuth clients and their validated registration metadata.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Scope, UserId, random_string};
use crate::error::OAuthError;

/// Length of generated client identifiers.
const CLIENT_ID_LENGTH: usize = 24;
/// Length of generated client secrets.
const CLIENT_SECRET_LENGTH: usize = 48;
/// Maximum length of a client display name.
const CLIENT_NAME_MAX: usize = 100;

/// Grant types a client may be allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
    Implicit,
}

impl GrantType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::ClientCredentials => "client_credentials",
            Self::Implicit => "implicit",
        }
    }
}

impl FromStr for GrantType {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(Self::AuthorizationCode),
            "refresh_token" => Ok(Self::RefreshToken),
            "client_credentials" => Ok(Self::ClientCredentials),
            "implicit" => Ok(Self::Implicit),
            _ => Err(OAuthError::UnsupportedGrantType),
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization endpoint response types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    /// Authorization code flow.
    Code,
    /// Implicit flow.
    Token,
}

impl ResponseType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Token => "token",
        }
    }

    /// The grant type a client must allow to use this response type.
    #[must_use]
    pub const fn grant_type(&self) -> GrantType {
        match self {
            Self::Code => GrantType::AuthorizationCode,
            Self::Token => GrantType::Implicit,
        }
    }
}

impl FromStr for ResponseType {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(Self::Code),
            "token" => Ok(Self::Token),
            _ => Err(OAuthError::UnsupportedResponseType),
        }
    }
}

/// How a client authenticates at the token endpoint (RFC 7591 §2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    /// Public client, no secret.
    None,
    /// Secret in the HTTP Basic `Authorization` header.
    ClientSecretBasic,
    /// Secret in the request body.
    ClientSecretPost,
}

impl TokenEndpointAuthMethod {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
        }
    }

    #[must_use]
    pub const fn is_public(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl FromStr for TokenEndpointAuthMethod {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "client_secret_basic" => Ok(Self::ClientSecretBasic),
            "client_secret_post" => Ok(Self::ClientSecretPost),
            _ => Err(OAuthError::InvalidClientMetadata("Unsupported token_endpoint_auth_method")),
        }
    }
}

/// Raw client creation form.
///
/// Only these fields are accepted; anything else fails deserialization.
/// Multi-valued fields are whitespace separated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientForm {
    pub client_name: String,
    #[serde(default)]
    pub client_uri: Option<String>,
    #[serde(default)]
    pub redirect_uris: String,
    #[serde(default)]
    pub grant_types: String,
    #[serde(default)]
    pub response_types: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub token_endpoint_auth_method: Option<String>,
}

/// Validated client registration metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMetadata {
    pub client_name: String,
    pub client_uri: Option<String>,
    pub redirect_uris: Vec<String>,
    pub grant_types: BTreeSet<GrantType>,
    pub scope: Scope,
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,
}

impl ClientMetadata {
    /// Start metadata for a client with no redirect URIs, grants or scope.
    #[must_use]
    pub fn new(client_name: impl Into<String>, method: TokenEndpointAuthMethod) -> Self {
        Self {
            client_name: client_name.into(),
            client_uri: None,
            redirect_uris: Vec::new(),
            grant_types: BTreeSet::new(),
            scope: Scope::default(),
            token_endpoint_auth_method: method,
        }
    }

    #[must_use]
    pub fn redirect_uri(mut self, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        if !self.redirect_uris.contains(&uri) {
            self.redirect_uris.push(uri);
        }
        self
    }

    #[must_use]
    pub fn grant_type(mut self, grant_type: GrantType) -> Self {
        self.grant_types.insert(grant_type);
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: &str) -> Self {
        self.scope = Scope::parse(scope);
        self
    }

    /// Parse and validate the creation form against the server's scopes.
    pub fn from_form(form: ClientForm, scopes_supported: &Scope) -> Result<Self, OAuthError> {
        let method = match form.token_endpoint_auth_method.as_deref().map(str::trim) {
            None | Some("") => TokenEndpointAuthMethod::ClientSecretBasic,
            Some(value) => value.parse()?,
        };

        let mut metadata = Self::new(form.client_name.trim(), method);
        metadata.client_uri =
            form.client_uri.map(|uri| uri.trim().to_string()).filter(|uri| !uri.is_empty());

        for uri in form.redirect_uris.split_ascii_whitespace() {
            metadata = metadata.redirect_uri(uri);
        }

        for value in form.grant_types.split_ascii_whitespace() {
            let grant_type = value
                .parse()
                .map_err(|_| OAuthError::InvalidClientMetadata("Unsupported grant type"))?;
            metadata = metadata.grant_type(grant_type);
        }
        if metadata.grant_types.is_empty() {
            metadata = metadata.grant_type(GrantType::AuthorizationCode);
        }

        for value in form.response_types.split_ascii_whitespace() {
            let response_type: ResponseType = value
                .parse()
                .map_err(|_| OAuthError::InvalidClientMetadata("Unsupported response type"))?;
            if !metadata.grant_types.contains(&response_type.grant_type()) {
                return Err(OAuthError::InvalidClientMetadata(
                    "response_types require a matching grant type",
                ));
            }
        }

        metadata.scope = Scope::parse(&form.scope);
        if !metadata.scope.is_subset(scopes_supported) {
            return Err(OAuthError::InvalidClientMetadata("scope contains unsupported values"));
        }

        metadata.check()?;
        Ok(metadata)
    }

    /// Check cross-field invariants.
    pub fn check(&self) -> Result<(), OAuthError> {
        if self.client_name.is_empty() || self.client_name.chars().count() > CLIENT_NAME_MAX {
            return Err(OAuthError::InvalidClientMetadata("client_name is required"));
        }
        if let Some(uri) = &self.client_uri {
            if !is_http_url(uri) {
                return Err(OAuthError::InvalidClientMetadata("client_uri must be an http(s) URL"));
            }
        }
        if !self.redirect_uris.iter().all(|uri| is_valid_redirect_uri(uri)) {
            return Err(OAuthError::InvalidClientMetadata(
                "redirect_uris must be absolute URLs without fragment",
            ));
        }
        let redirecting = self.grant_types.contains(&GrantType::AuthorizationCode)
            || self.grant_types.contains(&GrantType::Implicit);
        if redirecting && self.redirect_uris.is_empty() {
            return Err(OAuthError::InvalidClientMetadata("redirect_uris is required"));
        }
        if self.token_endpoint_auth_method.is_public()
            && self.grant_types.contains(&GrantType::ClientCredentials)
        {
            return Err(OAuthError::InvalidClientMetadata(
                "client_credentials requires a confidential client",
            ));
        }
        Ok(())
    }
}

fn is_http_url(value: &str) -> bool {
    url::Url::parse(value).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

/// Absolute URI with no fragment (RFC 6749 §3.1.2). Custom schemes are allowed
/// for native apps.
fn is_valid_redirect_uri(value: &str) -> bool {
    url::Url::parse(value).is_ok_and(|url| url.fragment().is_none() && !url.cannot_be_a_base())
        && !value.contains('#')
}

/// A registered OAuth client.
#[derive(Clone, PartialEq, Eq)]
pub struct Client {
    pub client_id: String,
    client_secret: Option<String>,
    pub metadata: ClientMetadata,
    /// User who created the client, for display only.
    pub owner: Option<UserId>,
    pub issued_at: DateTime<Utc>,
}

impl Client {
    /// Register a client with generated credentials. Public clients get no secret.
    pub fn register(metadata: ClientMetadata, owner: Option<UserId>) -> Result<Self, OAuthError> {
        let secret = (!metadata.token_endpoint_auth_method.is_public())
            .then(|| random_string(CLIENT_SECRET_LENGTH));
        Self::with_credentials(metadata, random_string(CLIENT_ID_LENGTH), secret, owner)
    }

    /// Register a client with caller-chosen credentials.
    ///
    /// Public clients must not carry a secret; confidential clients must.
    pub fn with_credentials(
        metadata: ClientMetadata,
        client_id: impl Into<String>,
        client_secret: Option<String>,
        owner: Option<UserId>,
    ) -> Result<Self, OAuthError> {
        metadata.check()?;
        let client_id = client_id.into();
        if client_id.is_empty() {
            return Err(OAuthError::InvalidClientMetadata("client_id must not be empty"));
        }
        let client_secret = client_secret.filter(|secret| !secret.is_empty());
        match (metadata.token_endpoint_auth_method.is_public(), &client_secret) {
            (true, Some(_)) => {
                return Err(OAuthError::InvalidClientMetadata("public clients have no secret"));
            }
            (false, None) => {
                return Err(OAuthError::InvalidClientMetadata(
                    "confidential clients require a secret",
                ));
            }
            _ => {}
        }
        Ok(Self { client_id, client_secret, metadata, owner, issued_at: Utc::now() })
    }

    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    #[must_use]
    pub fn is_public(&self) -> bool {
        self.metadata.token_endpoint_auth_method.is_public()
    }

    #[must_use]
    pub fn auth_method(&self) -> TokenEndpointAuthMethod {
        self.metadata.token_endpoint_auth_method
    }

    #[must_use]
    pub fn allows_grant(&self, grant_type: GrantType) -> bool {
        self.metadata.grant_types.contains(&grant_type)
    }

    #[must_use]
    pub fn redirect_uris(&self) -> &[String] {
        &self.metadata.redirect_uris
    }

    #[must_use]
    pub fn allowed_scope(&self) -> &Scope {
        &self.metadata.scope
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***REDACTED***"))
            .field("metadata", &self.metadata)
            .field("owner", &self.owner)
            .finish()
    }
}
