//! Bearer token protection for resource endpoints (RFC 6750).

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use super::issuer::{AccessContext, TokenIssuer};
use crate::error::OAuthError;
use crate::models::Scope;

/// Why a protected request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardRejection {
    realm: String,
    /// `None` when the request carried no bearer credentials at all.
    error: Option<OAuthError>,
    required: Scope,
}

impl GuardRejection {
    #[must_use]
    pub fn error(&self) -> Option<OAuthError> {
        self.error
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.error.map_or(StatusCode::UNAUTHORIZED, |error| error.status())
    }

    /// The `WWW-Authenticate` challenge.
    #[must_use]
    pub fn challenge(&self) -> String {
        let mut challenge = format!("Bearer realm=\"{}\"", self.realm);
        if let Some(error) = self.error {
            challenge.push_str(&format!(
                ", error=\"{}\", error_description=\"{}\"",
                error.error_code(),
                error.description()
            ));
            if error == OAuthError::InsufficientScope {
                challenge.push_str(&format!(", scope=\"{}\"", self.required));
            }
        }
        challenge
    }
}

impl IntoResponse for GuardRejection {
    fn into_response(self) -> Response {
        let challenge = HeaderValue::from_str(&self.challenge())
            .unwrap_or_else(|_| HeaderValue::from_static("Bearer"));
        let mut response = match self.error {
            Some(error) => error.into_response(),
            None => StatusCode::UNAUTHORIZED.into_response(),
        };
        response.headers_mut().insert(header::WWW_AUTHENTICATE, challenge);
        response
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
///
/// `Ok(None)` means no bearer credentials were sent.
fn bearer_token(authorization: Option<&str>) -> Result<Option<&str>, OAuthError> {
    let Some(value) = authorization else {
        return Ok(None);
    };
    let (scheme, token) = value.trim().split_once(' ').unwrap_or((value.trim(), ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Ok(None);
    }
    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(OAuthError::InvalidRequest("Malformed bearer token"));
    }
    Ok(Some(token))
}

/// Validates bearer tokens and scope requirements.
#[derive(Debug, Clone)]
pub struct ResourceGuard {
    issuer: TokenIssuer,
    realm: String,
}

impl ResourceGuard {
    #[must_use]
    pub fn new(issuer: TokenIssuer, realm: impl Into<String>) -> Self {
        Self { issuer, realm: realm.into() }
    }

    /// A rejection carrying this guard's challenge, for handlers that refuse a
    /// token after [`ResourceGuard::check`] accepted it.
    #[must_use]
    pub fn reject(&self, error: OAuthError, required: &Scope) -> GuardRejection {
        self.rejection(Some(error), required)
    }

    fn rejection(&self, error: Option<OAuthError>, required: &Scope) -> GuardRejection {
        GuardRejection { realm: self.realm.clone(), error, required: required.clone() }
    }

    /// Check the request's bearer token against a required scope.
    pub async fn check(
        &self,
        authorization: Option<&str>,
        required: &Scope,
    ) -> Result<AccessContext, GuardRejection> {
        let reject = |error: Option<OAuthError>| self.rejection(error, required);

        let token = bearer_token(authorization)
            .map_err(|e| reject(Some(e)))?
            .ok_or_else(|| reject(None))?;
        let context =
            self.issuer.resolve_access(token, Utc::now()).await.map_err(|e| reject(Some(e)))?;

        if !required.is_subset(&context.scope) {
            tracing::debug!(
                client_id = %context.client_id,
                required = %required,
                granted = %context.scope,
                "Insufficient scope"
            );
            return Err(reject(Some(OAuthError::InsufficientScope)));
        }
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejection(error: Option<OAuthError>) -> GuardRejection {
        GuardRejection { realm: "https://auth.test".into(), error, required: Scope::parse("profile") }
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(None), Ok(None));
        assert_eq!(bearer_token(Some("Bearer abc")), Ok(Some("abc")));
        assert_eq!(bearer_token(Some("bearer  abc ")), Ok(Some("abc")));
        assert_eq!(bearer_token(Some("Basic Zm9vOmJhcg==")), Ok(None));
        assert!(bearer_token(Some("Bearer")).is_err());
        assert!(bearer_token(Some("Bearer a b")).is_err());
    }

    #[test]
    fn test_missing_credentials_challenge() {
        let rejection = rejection(None);
        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(rejection.challenge(), "Bearer realm=\"https://auth.test\"");
    }

    #[test]
    fn test_invalid_token_challenge() {
        let rejection = rejection(Some(OAuthError::InvalidToken("The access token expired")));
        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            rejection.challenge(),
            "Bearer realm=\"https://auth.test\", error=\"invalid_token\", \
             error_description=\"The access token expired\""
        );
    }

    #[test]
    fn test_insufficient_scope_challenge() {
        let rejection = rejection(Some(OAuthError::InsufficientScope));
        assert_eq!(rejection.status(), StatusCode::FORBIDDEN);
        assert!(rejection.challenge().ends_with(", scope=\"profile\""));

        let response = rejection.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let header = response.headers().get(header::WWW_AUTHENTICATE).unwrap();
        assert!(header.to_str().unwrap().contains("insufficient_scope"));
    }
}
