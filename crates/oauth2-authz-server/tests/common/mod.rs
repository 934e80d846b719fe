//! Shared fixtures for HTTP-level tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use tower::ServiceExt;

use oauth2_authz_server::config::{Config, TokenFormat};
use oauth2_authz_server::models::{Client, ClientMetadata, GrantType, TokenEndpointAuthMethod};
use oauth2_authz_server::oauth::{AuthorizationServer, KeyManager};
use oauth2_authz_server::server::transport::{HttpState, create_router};

pub const ISSUER: &str = "https://auth.example.com";
pub const CONFIDENTIAL_ID: &str = "c1";
pub const CONFIDENTIAL_SECRET: &str = "c1-secret";
pub const CONFIDENTIAL_REDIRECT: &str = "https://app/cb";
pub const PUBLIC_ID: &str = "native-app";
pub const PUBLIC_REDIRECT: &str = "com.example.app:/callback";
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

pub struct TestApp {
    pub router: Router,
    pub server: AuthorizationServer,
}

pub async fn test_app(token_format: TokenFormat) -> TestApp {
    let mut config = Config::for_testing(ISSUER);
    config.token_format = token_format;
    let server = AuthorizationServer::new(config, KeyManager::generate("key-1").unwrap());

    let confidential = ClientMetadata::new("Confidential", TokenEndpointAuthMethod::ClientSecretBasic)
        .redirect_uri(CONFIDENTIAL_REDIRECT)
        .grant_type(GrantType::AuthorizationCode)
        .grant_type(GrantType::RefreshToken)
        .grant_type(GrantType::ClientCredentials)
        .scope("openid profile email");
    server
        .registry
        .register(
            Client::with_credentials(
                confidential,
                CONFIDENTIAL_ID,
                Some(CONFIDENTIAL_SECRET.to_string()),
                None,
            )
            .unwrap(),
        )
        .await
        .unwrap();

    let public = ClientMetadata::new("Native", TokenEndpointAuthMethod::None)
        .redirect_uri(PUBLIC_REDIRECT)
        .grant_type(GrantType::AuthorizationCode)
        .grant_type(GrantType::RefreshToken)
        .scope("openid profile");
    server
        .registry
        .register(Client::with_credentials(public, PUBLIC_ID, None, None).unwrap())
        .await
        .unwrap();

    let router = create_router(Arc::new(HttpState::new(server.clone())));
    TestApp { router, server }
}

/// Register another confidential client with the code and refresh grants.
pub async fn register_confidential(
    app: &TestApp,
    client_id: &str,
    secret: &str,
    auth_method: TokenEndpointAuthMethod,
) {
    let metadata = ClientMetadata::new(client_id, auth_method)
        .redirect_uri(CONFIDENTIAL_REDIRECT)
        .grant_type(GrantType::AuthorizationCode)
        .grant_type(GrantType::RefreshToken)
        .scope("openid profile email");
    let client =
        Client::with_credentials(metadata, client_id, Some(secret.to_string()), None).unwrap();
    app.server.registry.register(client).await.unwrap();
}

pub fn basic_auth(client_id: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{client_id}:{secret}")))
}

pub fn s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

pub fn location(response: &Response<Body>) -> url::Url {
    let value = response.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    url::Url::parse(value).unwrap()
}

pub fn query_params(url: &url::Url) -> HashMap<String, String> {
    url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect()
}

pub fn fragment_params(url: &url::Url) -> HashMap<String, String> {
    url::form_urlencoded::parse(url.fragment().unwrap_or_default().as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

pub fn session_cookie(response: &Response<Body>) -> String {
    let value = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    value.split(';').next().unwrap().to_string()
}

pub async fn post_form(
    router: &Router,
    path: &str,
    authorization: Option<&str>,
    params: &[(&str, &str)],
) -> Response<Body> {
    let mut request = Request::post(path).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(authorization) = authorization {
        request = request.header(header::AUTHORIZATION, authorization);
    }
    let body = serde_urlencoded::to_string(params).unwrap();
    router.clone().oneshot(request.body(Body::from(body)).unwrap()).await.unwrap()
}

pub async fn get(router: &Router, path: &str, authorization: Option<&str>) -> Response<Body> {
    let mut request = Request::get(path);
    if let Some(authorization) = authorization {
        request = request.header(header::AUTHORIZATION, authorization);
    }
    router.clone().oneshot(request.body(Body::empty()).unwrap()).await.unwrap()
}

/// Log `username` in, creating the user on first use.
pub async fn login(router: &Router, username: &str) -> Response<Body> {
    let response = post_form(router, "/", None, &[("username", username)]).await;
    assert!(response.status().is_redirection());
    response
}

/// Approve an authorization request for `username` and return the code.
pub async fn authorize_code(
    router: &Router,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    username: &str,
    code_challenge: Option<&str>,
) -> String {
    login(router, username).await;
    let mut params = vec![
        ("response_type", "code"),
        ("client_id", client_id),
        ("redirect_uri", redirect_uri),
        ("scope", scope),
        ("state", "xyz"),
        ("username", username),
        ("confirm", "yes"),
    ];
    if let Some(challenge) = code_challenge {
        params.push(("code_challenge", challenge));
        params.push(("code_challenge_method", "S256"));
    }

    let response = post_form(router, "/oauth/authorize", None, &params).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let params = query_params(&location(&response));
    assert_eq!(params.get("state").map(String::as_str), Some("xyz"));
    params.get("code").cloned().unwrap()
}

/// Redeem a code for the confidential client.
pub async fn redeem(router: &Router, code: &str) -> Response<Body> {
    post_form(
        router,
        "/oauth/token",
        Some(&basic_auth(CONFIDENTIAL_ID, CONFIDENTIAL_SECRET)),
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", CONFIDENTIAL_REDIRECT),
        ],
    )
    .await
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
