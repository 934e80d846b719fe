//! In-memory client registry and client authentication.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::RwLock;

use super::pkce::constant_time_eq;
use crate::error::{OAuthError, OAuthResult};
use crate::models::{Client, GrantType, TokenEndpointAuthMethod, UserId};

/// Where the client presented its credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// HTTP Basic `Authorization` header.
    Basic,
    /// `client_id` / `client_secret` form fields.
    Post,
    /// `client_id` only.
    None,
}

impl CredentialSource {
    const fn auth_method(self) -> TokenEndpointAuthMethod {
        match self {
            Self::Basic => TokenEndpointAuthMethod::ClientSecretBasic,
            Self::Post => TokenEndpointAuthMethod::ClientSecretPost,
            Self::None => TokenEndpointAuthMethod::None,
        }
    }
}

/// Client credentials as presented at the token or revocation endpoint.
#[derive(Clone)]
pub struct ClientCredential {
    pub client_id: String,
    pub secret: Option<String>,
    pub source: CredentialSource,
}

impl ClientCredential {
    /// Combine the `Authorization` header and the form fields into one credential.
    ///
    /// A client must not use more than one authentication method per request.
    pub fn from_request(
        authorization: Option<&str>,
        form_client_id: Option<&str>,
        form_client_secret: Option<&str>,
    ) -> OAuthResult<Self> {
        let form_client_id = form_client_id.filter(|id| !id.is_empty());
        let form_client_secret = form_client_secret.filter(|secret| !secret.is_empty());

        if let Some(header) = authorization {
            let (client_id, secret) = parse_basic(header).ok_or(OAuthError::InvalidClient)?;
            if form_client_secret.is_some() {
                return Err(OAuthError::InvalidRequest("Multiple client authentication methods"));
            }
            if form_client_id.is_some_and(|id| id != client_id) {
                return Err(OAuthError::InvalidRequest("client_id does not match credentials"));
            }
            return Ok(Self { client_id, secret: Some(secret), source: CredentialSource::Basic });
        }

        let client_id = form_client_id.ok_or(OAuthError::InvalidClient)?.to_string();
        Ok(match form_client_secret {
            Some(secret) => {
                Self { client_id, secret: Some(secret.to_string()), source: CredentialSource::Post }
            }
            None => Self { client_id, secret: None, source: CredentialSource::None },
        })
    }
}

impl std::fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredential")
            .field("client_id", &self.client_id)
            .field("source", &self.source)
            .finish()
    }
}

/// Decode `Basic base64(urlencode(id):urlencode(secret))` (RFC 6749 §2.3.1).
fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    let id = form_decode(id)?;
    let secret = form_decode(secret)?;
    (!id.is_empty()).then_some((id, secret))
}

fn form_decode(value: &str) -> Option<String> {
    let input = format!("v={value}");
    let mut pairs = url::form_urlencoded::parse(input.as_bytes());
    pairs.next().map(|(_, decoded)| decoded.into_owned())
}

/// Registered clients keyed by `client_id`.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<RwLock<HashMap<String, Client>>>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validated client. Client ids are unique.
    pub async fn register(&self, client: Client) -> OAuthResult<Client> {
        let mut clients = self.clients.write().await;
        if clients.contains_key(&client.client_id) {
            return Err(OAuthError::InvalidClientMetadata("client_id already registered"));
        }
        tracing::info!(
            client_id = %client.client_id,
            auth_method = client.auth_method().as_str(),
            "Registered OAuth client"
        );
        clients.insert(client.client_id.clone(), client.clone());
        Ok(client)
    }

    pub async fn lookup(&self, client_id: &str) -> OAuthResult<Client> {
        self.clients.read().await.get(client_id).cloned().ok_or(OAuthError::InvalidClient)
    }

    /// Clients created by a user, newest first.
    pub async fn clients_owned_by(&self, owner: UserId) -> Vec<Client> {
        let clients = self.clients.read().await;
        let mut owned: Vec<Client> =
            clients.values().filter(|client| client.owner == Some(owner)).cloned().collect();
        owned.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        owned
    }

    /// Resolve the redirect URI for an authorization request.
    ///
    /// A supplied URI must exactly match a registered one. Without one, the
    /// client must have exactly one registered URI.
    pub fn validate_redirect_uri(client: &Client, redirect_uri: Option<&str>) -> OAuthResult<String> {
        match redirect_uri {
            Some(uri) if client.redirect_uris().iter().any(|registered| registered == uri) => {
                Ok(uri.to_string())
            }
            Some(_) => Err(OAuthError::InvalidRequest("redirect_uri is not registered")),
            None => match client.redirect_uris() {
                [only] => Ok(only.clone()),
                _ => Err(OAuthError::InvalidRequest("redirect_uri is required")),
            },
        }
    }

    pub fn validate_grant_type(client: &Client, grant_type: GrantType) -> OAuthResult<()> {
        if client.allows_grant(grant_type) {
            Ok(())
        } else {
            Err(OAuthError::UnauthorizedClient)
        }
    }

    /// Authenticate a client at the token or revocation endpoint.
    ///
    /// Public clients need no secret and any supplied one is ignored. Confidential
    /// clients must present the secret through their registered method.
    pub async fn authenticate(&self, credential: &ClientCredential) -> OAuthResult<Client> {
        let client = self.lookup(&credential.client_id).await.inspect_err(|_| {
            tracing::warn!(client_id = %credential.client_id, "Authentication for unknown client");
        })?;

        let Some(expected) = client.client_secret() else {
            return Ok(client);
        };

        let method_matches = credential.source.auth_method() == client.auth_method();
        let secret_matches =
            credential.secret.as_deref().is_some_and(|secret| constant_time_eq(secret, expected));
        if method_matches && secret_matches {
            Ok(client)
        } else {
            tracing::warn!(
                client_id = %client.client_id,
                method_matches,
                "Client authentication failed"
            );
            Err(OAuthError::InvalidClient)
        }
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry").finish()
    }
}
