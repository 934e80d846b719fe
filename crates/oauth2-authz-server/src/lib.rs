//! OAuth 2.0 Authorization Server
//!
//! An in-memory OAuth 2.0 authorization server with a small demo surface.
//!
//! # Features
//!
//! - **Grants**: authorization code (with PKCE), implicit, refresh token and
//!   client credentials
//! - **Refresh rotation**: reuse of a rotated-out refresh token revokes its family
//! - **Revocation**: RFC 7009 endpoint, idempotent and owner-checked
//! - **Signed tokens**: optional RS256 access tokens with JWKS and key rotation
//! - **Resource guard**: RFC 6750 bearer checks with scope enforcement
//!
//! # Example
//!
//! ```no_run
//! use oauth2_authz_server::{config::Config, server::AuthServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let server = AuthServer::new(config)?;
//!     server.run_http(5000).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod oauth;
pub mod server;

pub use config::Config;
pub use error::{KeyError, OAuthError, OAuthResult};
pub use oauth::AuthorizationServer;
