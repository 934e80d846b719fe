//! HTTP server.
//!
//! Exposes the [`crate::oauth`] engine over axum, together with the small demo
//! surface around it: login by username, client creation and a consent page.

pub mod handlers;
pub mod pages;
pub mod session;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Config;
use crate::oauth::AuthorizationServer;

/// The authorization server with its HTTP front end.
pub struct AuthServer {
    state: Arc<transport::HttpState>,
}

impl AuthServer {
    /// Create a server, loading or generating the signing key.
    ///
    /// # Errors
    ///
    /// Returns error if the configured signing key cannot be loaded.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let server = AuthorizationServer::from_config(config)?;
        Ok(Self::with_engine(server))
    }

    /// Create a server around an existing engine.
    #[must_use]
    pub fn with_engine(server: AuthorizationServer) -> Self {
        Self { state: Arc::new(transport::HttpState::new(server)) }
    }

    /// The protocol engine.
    #[must_use]
    pub fn engine(&self) -> &AuthorizationServer {
        &self.state.server
    }

    /// Run the server in HTTP mode.
    ///
    /// # Errors
    ///
    /// Returns error on server failure.
    pub async fn run_http(self, port: u16) -> anyhow::Result<()> {
        let config = &self.state.server.config;
        tracing::info!(issuer = %config.issuer, "Starting authorization server on port {}", port);

        let cleanup = self.state.server.store.start_cleanup_task(config.cleanup_interval);
        let router = transport::create_router(Arc::clone(&self.state));
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        tracing::info!("HTTP server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        cleanup.abort();
        tracing::info!("HTTP server shut down");
        Ok(())
    }
}

impl std::fmt::Debug for AuthServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthServer").field("issuer", &self.state.server.config.issuer).finish()
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
