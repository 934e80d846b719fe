//! End-to-end OAuth 2.0 flows over the HTTP router.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tower::ServiceExt;

use common::*;
use oauth2_authz_server::config::TokenFormat;
use oauth2_authz_server::models::TokenEndpointAuthMethod;

#[tokio::test]
async fn test_code_exchange_then_replay_is_rejected() {
    let app = test_app(TokenFormat::Opaque).await;
    let code =
        authorize_code(&app.router, CONFIDENTIAL_ID, CONFIDENTIAL_REDIRECT, "profile", "alice", None)
            .await;

    let response = redeem(&app.router, &code).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
    let token = body_json(response).await;
    let access_token = token["access_token"].as_str().unwrap().to_string();
    assert!(!access_token.is_empty());
    assert_eq!(token["scope"], "profile");
    assert_eq!(token["token_type"], "Bearer");

    let response = get(&app.router, "/api/me", Some(&bearer(&access_token))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["username"], "alice");

    let response = redeem(&app.router, &code).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");

    // Replay revokes what the code produced.
    let response = get(&app.router, "/api/me", Some(&bearer(&access_token))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_consent_page_with_session() {
    let app = test_app(TokenFormat::Opaque).await;

    let response = post_form(&app.router, "/", None, &[("username", "alice")]).await;
    assert!(response.status().is_redirection());
    let cookie = session_cookie(&response);

    let path = format!(
        "/oauth/authorize?response_type=code&client_id={CONFIDENTIAL_ID}&scope=profile&state=s1"
    );
    let response = app
        .router
        .clone()
        .oneshot(Request::get(&path).header(header::COOKIE, &cookie).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Authorize Confidential"));
    assert!(html.contains("Signed in as <strong>alice</strong>"));
    assert!(html.contains(r#"name="state" value="s1""#));

    let body = serde_urlencoded::to_string([
        ("response_type", "code"),
        ("client_id", CONFIDENTIAL_ID),
        ("scope", "profile"),
        ("state", "s1"),
        ("confirm", "yes"),
    ])
    .unwrap();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::post("/oauth/authorize")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(header::COOKIE, &cookie)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let redirect = location(&response);
    assert!(redirect.as_str().starts_with(CONFIDENTIAL_REDIRECT));
    let params = query_params(&redirect);
    assert!(params.contains_key("code"));
    assert_eq!(params["state"], "s1");
}

#[tokio::test]
async fn test_denied_consent_redirects_with_access_denied() {
    let app = test_app(TokenFormat::Opaque).await;
    let response = post_form(
        &app.router,
        "/oauth/authorize",
        None,
        &[
            ("response_type", "code"),
            ("client_id", CONFIDENTIAL_ID),
            ("state", "abc"),
            ("username", "alice"),
            ("confirm", "no"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let params = query_params(&location(&response));
    assert_eq!(params["error"], "access_denied");
    assert_eq!(params["state"], "abc");
}

#[tokio::test]
async fn test_consent_form_does_not_create_users() {
    let app = test_app(TokenFormat::Opaque).await;
    for confirm in ["no", "yes"] {
        let response = post_form(
            &app.router,
            "/oauth/authorize",
            None,
            &[
                ("response_type", "code"),
                ("client_id", CONFIDENTIAL_ID),
                ("state", "abc"),
                ("username", "mallory"),
                ("confirm", confirm),
            ],
        )
        .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(query_params(&location(&response))["error"], "access_denied");
    }
    assert!(app.server.users.find_by_username("mallory").await.is_none());
}

#[tokio::test]
async fn test_unregistered_redirect_uri_is_not_followed() {
    let app = test_app(TokenFormat::Opaque).await;
    let path = format!(
        "/oauth/authorize?response_type=code&client_id={CONFIDENTIAL_ID}&redirect_uri=https%3A%2F%2Fevil%2Fcb"
    );
    let response = get(&app.router, &path, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::LOCATION).is_none());
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_invalid_scope_is_redirected_to_client() {
    let app = test_app(TokenFormat::Opaque).await;
    let path = format!("/oauth/authorize?response_type=code&client_id={CONFIDENTIAL_ID}&scope=admin&state=q");
    let response = get(&app.router, &path, None).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let params = query_params(&location(&response));
    assert_eq!(params["error"], "invalid_scope");
    assert_eq!(params["state"], "q");
}

#[tokio::test]
async fn test_public_client_requires_verifier_and_ignores_secret() {
    let app = test_app(TokenFormat::Opaque).await;
    let challenge = s256(VERIFIER);

    let code =
        authorize_code(&app.router, PUBLIC_ID, PUBLIC_REDIRECT, "profile", "alice", Some(&challenge))
            .await;
    let response = post_form(
        &app.router,
        "/oauth/token",
        None,
        &[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", PUBLIC_REDIRECT),
            ("client_id", PUBLIC_ID),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");

    let code =
        authorize_code(&app.router, PUBLIC_ID, PUBLIC_REDIRECT, "profile", "alice", Some(&challenge))
            .await;
    let response = post_form(
        &app.router,
        "/oauth/token",
        None,
        &[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", PUBLIC_REDIRECT),
            ("client_id", PUBLIC_ID),
            ("client_secret", "anything"),
            ("code_verifier", VERIFIER),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["access_token"].is_string());
}

#[tokio::test]
async fn test_public_client_without_challenge_is_refused_at_authorize() {
    let app = test_app(TokenFormat::Opaque).await;
    let response = post_form(
        &app.router,
        "/oauth/authorize",
        None,
        &[
            ("response_type", "code"),
            ("client_id", PUBLIC_ID),
            ("username", "alice"),
            ("confirm", "yes"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(query_params(&location(&response))["error"], "invalid_request");
}

#[tokio::test]
async fn test_wrong_client_secret_gets_basic_challenge() {
    let app = test_app(TokenFormat::Opaque).await;
    let code =
        authorize_code(&app.router, CONFIDENTIAL_ID, CONFIDENTIAL_REDIRECT, "profile", "alice", None)
            .await;
    let response = post_form(
        &app.router,
        "/oauth/token",
        Some(&basic_auth(CONFIDENTIAL_ID, "wrong")),
        &[("grant_type", "authorization_code"), ("code", code.as_str()), ("redirect_uri", CONFIDENTIAL_REDIRECT)],
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::WWW_AUTHENTICATE).is_some());
    assert_eq!(body_json(response).await["error"], "invalid_client");

    // The failed attempt never reached the code.
    assert_eq!(redeem(&app.router, &code).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_concurrent_redemptions_have_one_winner() {
    let app = test_app(TokenFormat::Opaque).await;
    let code =
        authorize_code(&app.router, CONFIDENTIAL_ID, CONFIDENTIAL_REDIRECT, "profile", "alice", None)
            .await;

    let attempts = (0..8).map(|_| redeem(&app.router, &code));
    let responses = futures::future::join_all(attempts).await;
    let winners = responses.iter().filter(|r| r.status() == StatusCode::OK).count();
    assert_eq!(winners, 1);
    assert!(
        responses
            .iter()
            .filter(|r| r.status() != StatusCode::OK)
            .all(|r| r.status() == StatusCode::BAD_REQUEST)
    );
}

#[tokio::test]
async fn test_refresh_rotation_and_reuse_revokes_family() {
    let app = test_app(TokenFormat::Opaque).await;
    let code =
        authorize_code(&app.router, CONFIDENTIAL_ID, CONFIDENTIAL_REDIRECT, "profile email", "alice", None)
            .await;
    let first = body_json(redeem(&app.router, &code).await).await;
    let first_refresh = first["refresh_token"].as_str().unwrap().to_string();
    let auth = basic_auth(CONFIDENTIAL_ID, CONFIDENTIAL_SECRET);

    let response = post_form(
        &app.router,
        "/oauth/token",
        Some(&auth),
        &[("grant_type", "refresh_token"), ("refresh_token", first_refresh.as_str()), ("scope", "profile")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let second = body_json(response).await;
    assert_eq!(second["scope"], "profile");
    let second_refresh = second["refresh_token"].as_str().unwrap().to_string();
    let second_access = second["access_token"].as_str().unwrap().to_string();
    assert_ne!(first_refresh, second_refresh);

    let response = post_form(
        &app.router,
        "/oauth/token",
        Some(&auth),
        &[("grant_type", "refresh_token"), ("refresh_token", first_refresh.as_str())],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");

    let response = post_form(
        &app.router,
        "/oauth/token",
        Some(&auth),
        &[("grant_type", "refresh_token"), ("refresh_token", second_refresh.as_str())],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let response = get(&app.router, "/api/me", Some(&bearer(&second_access))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_cannot_widen_scope() {
    let app = test_app(TokenFormat::Opaque).await;
    let code =
        authorize_code(&app.router, CONFIDENTIAL_ID, CONFIDENTIAL_REDIRECT, "profile", "alice", None)
            .await;
    let tokens = body_json(redeem(&app.router, &code).await).await;
    let refresh = tokens["refresh_token"].as_str().unwrap();

    let response = post_form(
        &app.router,
        "/oauth/token",
        Some(&basic_auth(CONFIDENTIAL_ID, CONFIDENTIAL_SECRET)),
        &[("grant_type", "refresh_token"), ("refresh_token", refresh), ("scope", "profile email")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_scope");
}

#[tokio::test]
async fn test_foreign_refresh_token_hides_its_scope() {
    let app = test_app(TokenFormat::Opaque).await;
    register_confidential(&app, "c2", "c2-secret", TokenEndpointAuthMethod::ClientSecretBasic).await;
    let code =
        authorize_code(&app.router, CONFIDENTIAL_ID, CONFIDENTIAL_REDIRECT, "profile", "alice", None)
            .await;
    let tokens = body_json(redeem(&app.router, &code).await).await;
    let refresh = tokens["refresh_token"].as_str().unwrap();
    let access = tokens["access_token"].as_str().unwrap();

    for presented in [refresh, access, "no-such-token"] {
        let response = post_form(
            &app.router,
            "/oauth/token",
            Some(&basic_auth("c2", "c2-secret")),
            &[("grant_type", "refresh_token"), ("refresh_token", presented), ("scope", "email")],
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_grant");
    }

    // The owner's token is untouched and still refreshes.
    let response = post_form(
        &app.router,
        "/oauth/token",
        Some(&basic_auth(CONFIDENTIAL_ID, CONFIDENTIAL_SECRET)),
        &[("grant_type", "refresh_token"), ("refresh_token", refresh)],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_client_secret_post_exchange() {
    let app = test_app(TokenFormat::Opaque).await;
    register_confidential(&app, "poster", "poster-secret", TokenEndpointAuthMethod::ClientSecretPost)
        .await;
    let code =
        authorize_code(&app.router, "poster", CONFIDENTIAL_REDIRECT, "profile", "alice", None).await;

    let response = post_form(
        &app.router,
        "/oauth/token",
        None,
        &[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", CONFIDENTIAL_REDIRECT),
            ("client_id", "poster"),
            ("client_secret", "poster-secret"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = body_json(response).await;
    assert_eq!(token["token_type"], "Bearer");
    assert!(token["refresh_token"].is_string());

    let response = get(&app.router, "/api/me", Some(&bearer(token["access_token"].as_str().unwrap())))
        .await;
    assert_eq!(body_json(response).await["username"], "alice");
}

#[tokio::test]
async fn test_revocation_is_idempotent() {
    let app = test_app(TokenFormat::Opaque).await;
    let code =
        authorize_code(&app.router, CONFIDENTIAL_ID, CONFIDENTIAL_REDIRECT, "profile", "alice", None)
            .await;
    let tokens = body_json(redeem(&app.router, &code).await).await;
    let access = tokens["access_token"].as_str().unwrap().to_string();
    let auth = basic_auth(CONFIDENTIAL_ID, CONFIDENTIAL_SECRET);

    for _ in 0..2 {
        let response = post_form(
            &app.router,
            "/oauth/revoke",
            Some(&auth),
            &[("token", access.as_str()), ("token_type_hint", "access_token")],
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response =
        post_form(&app.router, "/oauth/revoke", Some(&auth), &[("token", "never-issued")]).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app.router, "/api/me", Some(&bearer(&access))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response.headers().get(header::WWW_AUTHENTICATE).unwrap().to_str().unwrap();
    assert!(challenge.contains(r#"error="invalid_token""#));
}

#[tokio::test]
async fn test_revocation_requires_client_authentication() {
    let app = test_app(TokenFormat::Opaque).await;
    let response = post_form(
        &app.router,
        "/oauth/revoke",
        Some(&basic_auth(CONFIDENTIAL_ID, "wrong")),
        &[("token", "whatever")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn test_insufficient_scope_is_forbidden() {
    let app = test_app(TokenFormat::Opaque).await;
    let response = post_form(
        &app.router,
        "/oauth/token",
        Some(&basic_auth(CONFIDENTIAL_ID, CONFIDENTIAL_SECRET)),
        &[("grant_type", "client_credentials"), ("scope", "email")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = body_json(response).await;
    assert!(token.get("refresh_token").is_none());
    let access = token["access_token"].as_str().unwrap();

    let response = get(&app.router, "/api/me", Some(&bearer(access))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let challenge = response.headers().get(header::WWW_AUTHENTICATE).unwrap().to_str().unwrap();
    assert!(challenge.contains(r#"error="insufficient_scope""#));
    assert!(challenge.contains(r#"scope="profile""#));
    assert_eq!(body_json(response).await["error"], "insufficient_scope");
}

#[tokio::test]
async fn test_client_token_on_user_endpoint_gets_challenge() {
    let app = test_app(TokenFormat::Opaque).await;
    let response = post_form(
        &app.router,
        "/oauth/token",
        Some(&basic_auth(CONFIDENTIAL_ID, CONFIDENTIAL_SECRET)),
        &[("grant_type", "client_credentials"), ("scope", "profile")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let access = body_json(response).await["access_token"].as_str().unwrap().to_string();

    let response = get(&app.router, "/api/me", Some(&bearer(&access))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response.headers().get(header::WWW_AUTHENTICATE).unwrap().to_str().unwrap();
    assert!(challenge.starts_with(&format!("Bearer realm=\"{ISSUER}")));
    assert!(challenge.contains(r#"error="invalid_token""#));
    assert_eq!(body_json(response).await["error"], "invalid_token");
}

#[tokio::test]
async fn test_missing_bearer_gets_bare_challenge() {
    let app = test_app(TokenFormat::Opaque).await;
    let response = get(&app.router, "/api/me", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response.headers().get(header::WWW_AUTHENTICATE).unwrap().to_str().unwrap();
    assert!(challenge.starts_with("Bearer realm="));
    assert!(!challenge.contains("error="));
}

#[tokio::test]
async fn test_password_grant_is_unsupported() {
    let app = test_app(TokenFormat::Opaque).await;
    let response = post_form(
        &app.router,
        "/oauth/token",
        Some(&basic_auth(CONFIDENTIAL_ID, CONFIDENTIAL_SECRET)),
        &[("grant_type", "password"), ("username", "alice"), ("password", "x")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "unsupported_grant_type");
}
