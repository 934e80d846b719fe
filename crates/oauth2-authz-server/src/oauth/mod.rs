//! OAuth 2.0 protocol engine.
//!
//! Components, in dependency order:
//! - [`keys`]: RS256 signing keys, JWKS export, rotation
//! - [`registry`]: registered clients and client authentication
//! - [`store`]: authorization codes and issued tokens
//! - [`issuer`]: access/refresh token minting and resolution
//! - [`authorize`]: the authorization endpoint
//! - [`token`]: the token endpoint
//! - [`revoke`]: RFC 7009 revocation
//! - [`guard`]: RFC 6750 bearer protection for resources
//!
//! [`AuthorizationServer`] wires them together over shared in-memory state.
//! Nothing here depends on HTTP sessions; the end user is always an explicit
//! argument.

pub mod authorize;
pub mod guard;
pub mod issuer;
pub mod keys;
pub mod pkce;
pub mod registry;
pub mod revoke;
pub mod store;
pub mod token;
pub mod users;

use std::sync::Arc;

use crate::config::{Config, defaults};
use crate::error::{KeyError, OAuthResult};
use crate::models::{Client, ClientMetadata, UserId};

pub use authorize::{
    AuthorizationEngine, AuthorizationOutcome, AuthorizationRequest, ConsentDecision,
    ValidatedRequest,
};
pub use guard::{GuardRejection, ResourceGuard};
pub use issuer::{AccessContext, TokenIssuer};
pub use keys::{Jwks, KeyManager, SigningKey};
pub use registry::{ClientCredential, ClientRegistry};
pub use revoke::{RevocationEndpoint, RevocationForm};
pub use store::GrantStore;
pub use token::{TokenEndpoint, TokenError, TokenGrant, TokenRequestForm};
pub use users::UserDirectory;

/// All engine components over one set of stores.
#[derive(Debug, Clone)]
pub struct AuthorizationServer {
    pub config: Arc<Config>,
    pub keys: Arc<KeyManager>,
    pub registry: ClientRegistry,
    pub users: UserDirectory,
    pub store: GrantStore,
    pub issuer: TokenIssuer,
    pub authorization: AuthorizationEngine,
    pub token: TokenEndpoint,
    pub revocation: RevocationEndpoint,
    pub guard: ResourceGuard,
}

impl AuthorizationServer {
    /// Build the engine around an existing key manager.
    #[must_use]
    pub fn new(config: Config, keys: KeyManager) -> Self {
        let config = Arc::new(config);
        let keys = Arc::new(keys);
        let registry = ClientRegistry::new();
        let users = UserDirectory::new();
        let store = GrantStore::new();
        let issuer = TokenIssuer::new(Arc::clone(&config), Arc::clone(&keys), store.clone());

        Self {
            authorization: AuthorizationEngine::new(
                Arc::clone(&config),
                registry.clone(),
                store.clone(),
                issuer.clone(),
            ),
            token: TokenEndpoint::new(
                Arc::clone(&config),
                registry.clone(),
                store.clone(),
                issuer.clone(),
            ),
            revocation: RevocationEndpoint::new(registry.clone(), store.clone(), issuer.clone()),
            guard: ResourceGuard::new(issuer.clone(), config.issuer.clone()),
            config,
            keys,
            registry,
            users,
            store,
            issuer,
        }
    }

    /// Build the engine, loading the signing key from the configured PEM file or
    /// generating one.
    pub fn from_config(config: Config) -> Result<Self, KeyError> {
        let key = match &config.signing_key_path {
            Some(path) => SigningKey::from_pem_file(defaults::SIGNING_KEY_ID, path)?,
            None => SigningKey::generate(defaults::SIGNING_KEY_ID)?,
        };
        tracing::info!(
            kid = key.kid(),
            loaded = config.signing_key_path.is_some(),
            "Signing key ready"
        );
        Ok(Self::new(config, KeyManager::new(key)))
    }

    /// Validate and register a client with generated credentials.
    pub async fn create_client(
        &self,
        metadata: ClientMetadata,
        owner: Option<UserId>,
    ) -> OAuthResult<Client> {
        self.registry.register(Client::register(metadata, owner)?).await
    }
}
