//! HTTP routing.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::session::SessionStore;
use crate::oauth::AuthorizationServer;

/// Shared state for HTTP handlers.
#[derive(Debug)]
pub struct HttpState {
    pub server: AuthorizationServer,
    pub sessions: SessionStore,
}

impl HttpState {
    #[must_use]
    pub fn new(server: AuthorizationServer) -> Self {
        let sessions = SessionStore::new(server.config.session_ttl);
        Self { server, sessions }
    }
}

/// Create the HTTP router.
pub fn create_router(state: Arc<HttpState>) -> Router {
    let request_timeout = state.server.config.request_timeout;

    // Endpoints called by clients and resource servers from other origins.
    let api = Router::new()
        .route("/oauth/token", post(handlers::handle_token))
        .route("/oauth/revoke", post(handlers::handle_revoke))
        .route("/oauth/jwks.json", get(handlers::handle_jwks))
        .route("/.well-known/openid-configuration", get(handlers::handle_discovery))
        .route("/api/me", get(handlers::handle_api_me))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/", get(handlers::handle_home).post(handlers::handle_login))
        .route("/logout", get(handlers::handle_logout))
        .route(
            "/create_client",
            get(handlers::handle_create_client_page).post(handlers::handle_create_client),
        )
        .route(
            "/oauth/authorize",
            get(handlers::handle_authorize_get).post(handlers::handle_authorize_post),
        )
        .route("/health", get(handlers::handle_health))
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(timeout_layer(request_timeout)),
        )
        .with_state(state)
}

/// Requests running past `request_timeout` are answered with 408.
fn timeout_layer(request_timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn test_slow_request_times_out() {
        let router = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "done"
                }),
            )
            .layer(timeout_layer(Duration::from_millis(20)));

        let response =
            router.oneshot(Request::get("/slow").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
