//! HTTP handlers.
//!
//! Thin adapters between axum and the [`crate::oauth`] engine. The only state
//! they add is the login session, which they resolve into the explicit user
//! argument the engine expects.

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{Query, State, rejection::FormRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use super::pages;
use super::transport::HttpState;
use crate::error::OAuthError;
use crate::models::{ClientForm, ClientMetadata, Scope, User};
use crate::oauth::{
    AuthorizationOutcome, AuthorizationRequest, ConsentDecision, RevocationForm, TokenError,
    TokenRequestForm,
};

/// Scope required by `GET /api/me`.
const PROFILE_SCOPE: &str = "profile";

fn authorization_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION).and_then(|value| value.to_str().ok())
}

async fn session_user(state: &HttpState, jar: &CookieJar) -> Option<User> {
    let user_id = state.sessions.current_user(jar).await?;
    state.server.users.get(user_id).await
}

fn no_store(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

fn found(location: String) -> Response {
    match HeaderValue::from_str(&location) {
        Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
        Err(_) => OAuthError::ServerError.into_response(),
    }
}

// ─── Home, login, logout ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
}

/// `GET /`
pub async fn handle_home(State(state): State<Arc<HttpState>>, jar: CookieJar) -> Response {
    let Some(user) = session_user(&state, &jar).await else {
        return Html(pages::render_home(None, &[], None)).into_response();
    };
    let clients = state.server.registry.clients_owned_by(user.id).await;
    Html(pages::render_home(Some(&user), &clients, None)).into_response()
}

/// `POST /`
///
/// Log in by username, creating the user on first login.
pub async fn handle_login(
    State(state): State<Arc<HttpState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    match state.server.users.lookup_or_create(&form.username).await {
        Ok(user) => {
            let jar = state.sessions.login(jar, user.id).await;
            tracing::info!(user_id = %user.id, "User logged in");
            (jar, Redirect::to("/")).into_response()
        }
        Err(error) => (
            StatusCode::BAD_REQUEST,
            Html(pages::render_home(None, &[], Some(error.description()))),
        )
            .into_response(),
    }
}

/// `GET /logout`
pub async fn handle_logout(State(state): State<Arc<HttpState>>, jar: CookieJar) -> Response {
    let jar = state.sessions.logout(jar).await;
    (jar, Redirect::to("/")).into_response()
}

// ─── Client creation ─────────────────────────────────────────────────────────

/// `GET /create_client`
pub async fn handle_create_client_page(
    State(state): State<Arc<HttpState>>,
    jar: CookieJar,
) -> Response {
    if session_user(&state, &jar).await.is_none() {
        return Redirect::to("/").into_response();
    }
    Html(pages::render_create_client(&state.server.config.scopes_supported, None)).into_response()
}

/// `POST /create_client`
///
/// Only the explicit [`ClientForm`] fields are accepted. The signed-in user
/// becomes the owner.
pub async fn handle_create_client(
    State(state): State<Arc<HttpState>>,
    jar: CookieJar,
    form: Result<Form<ClientForm>, FormRejection>,
) -> Response {
    let Some(user) = session_user(&state, &jar).await else {
        return Redirect::to("/").into_response();
    };
    let scopes_supported = &state.server.config.scopes_supported;
    let rejected = |error: OAuthError| {
        (
            StatusCode::BAD_REQUEST,
            Html(pages::render_create_client(
                scopes_supported,
                Some(&format!("{}: {}", error.error_code(), error.description())),
            )),
        )
            .into_response()
    };

    let Ok(Form(form)) = form else {
        return rejected(OAuthError::InvalidClientMetadata("Unrecognized client fields"));
    };
    let metadata = match ClientMetadata::from_form(form, scopes_supported) {
        Ok(metadata) => metadata,
        Err(error) => return rejected(error),
    };
    match state.server.create_client(metadata, Some(user.id)).await {
        Ok(_) => Redirect::to("/").into_response(),
        Err(error) => rejected(error),
    }
}

// ─── Authorization endpoint ──────────────────────────────────────────────────

/// Consent form submission: the original request plus the user's answer.
#[derive(Debug, Deserialize)]
pub struct AuthorizeSubmission {
    #[serde(flatten)]
    pub request: AuthorizationRequest,
    pub username: Option<String>,
    pub confirm: Option<String>,
}

fn authorization_response(outcome: AuthorizationOutcome, user: Option<&User>) -> Response {
    match outcome {
        AuthorizationOutcome::NeedsConsent(validated) => {
            Html(pages::render_consent(&validated, user)).into_response()
        }
        AuthorizationOutcome::Redirect(location) => found(location),
        AuthorizationOutcome::Rejected(error) => error.into_response(),
    }
}

/// `GET /oauth/authorize`
///
/// Validate the request and show the consent page.
pub async fn handle_authorize_get(
    State(state): State<Arc<HttpState>>,
    jar: CookieJar,
    Query(request): Query<AuthorizationRequest>,
) -> Response {
    let user = session_user(&state, &jar).await;
    let outcome = state.server.authorization.authorize(request, ConsentDecision::Pending).await;
    authorization_response(outcome, user.as_ref())
}

/// `POST /oauth/authorize`
///
/// Apply the user's decision. Without a session the form may name an existing
/// user; unknown names are treated as no user.
pub async fn handle_authorize_post(
    State(state): State<Arc<HttpState>>,
    jar: CookieJar,
    Form(submission): Form<AuthorizeSubmission>,
) -> Response {
    let mut user = session_user(&state, &jar).await;
    if user.is_none() {
        if let Some(username) = submission.username.as_deref() {
            user = state.server.users.find_by_username(username).await;
        }
    }

    let approved = matches!(submission.confirm.as_deref(), Some("yes" | "on" | "true"));
    let decision = match (&user, approved) {
        (Some(user), true) => ConsentDecision::Approved(user),
        _ => ConsentDecision::Denied,
    };
    let outcome = state.server.authorization.authorize(submission.request, decision).await;
    authorization_response(outcome, user.as_ref())
}

// ─── Token and revocation endpoints ──────────────────────────────────────────

/// `POST /oauth/token`
pub async fn handle_token(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    form: Result<Form<TokenRequestForm>, FormRejection>,
) -> Response {
    let basic_attempted = headers.contains_key(header::AUTHORIZATION);
    let Ok(Form(form)) = form else {
        let error = OAuthError::InvalidRequest("Expected a form-encoded body");
        return TokenError { error, basic_attempted }.into_response();
    };

    match state.server.token.exchange(authorization_header(&headers), form).await {
        Ok(token) => no_store(Json(token).into_response()),
        Err(error) => error.into_response(),
    }
}

/// `POST /oauth/revoke`
pub async fn handle_revoke(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    form: Result<Form<RevocationForm>, FormRejection>,
) -> Response {
    let basic_attempted = headers.contains_key(header::AUTHORIZATION);
    let Ok(Form(form)) = form else {
        let error = OAuthError::InvalidRequest("Expected a form-encoded body");
        return TokenError { error, basic_attempted }.into_response();
    };

    match state.server.revocation.revoke(authorization_header(&headers), form).await {
        Ok(()) => no_store(StatusCode::OK.into_response()),
        Err(error) => error.into_response(),
    }
}

// ─── Discovery ───────────────────────────────────────────────────────────────

/// `GET /oauth/jwks.json`
pub async fn handle_jwks(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(state.server.keys.export_public_jwks())
}

/// `GET /.well-known/openid-configuration`
pub async fn handle_discovery(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let config = &state.server.config;
    Json(serde_json::json!({
        "issuer": config.issuer,
        "authorization_endpoint": config.endpoint("/oauth/authorize"),
        "token_endpoint": config.endpoint("/oauth/token"),
        "revocation_endpoint": config.endpoint("/oauth/revoke"),
        "jwks_uri": config.endpoint("/oauth/jwks.json"),
    }))
}

// ─── Protected API ───────────────────────────────────────────────────────────

/// `GET /api/me`
///
/// Requires a bearer token with the `profile` scope issued for a user.
pub async fn handle_api_me(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    let required = Scope::parse(PROFILE_SCOPE);
    let context = match state.server.guard.check(authorization_header(&headers), &required).await {
        Ok(context) => context,
        Err(rejection) => return rejection.into_response(),
    };

    let user = match context.user_id {
        Some(user_id) => state.server.users.get(user_id).await,
        None => None,
    };
    match user {
        Some(user) => Json(serde_json::json!({ "id": user.id, "username": user.username }))
            .into_response(),
        None => state
            .server
            .guard
            .reject(OAuthError::InvalidToken("The access token has no resource owner"), &required)
            .into_response(),
    }
}

/// `GET /health`
pub async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "oauth2-authz-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
