//! Error types for the authorization server.
//!
//! Uses `thiserror` for structured error handling. [`OAuthError`] is the protocol
//! taxonomy from RFC 6749 §4.1.2.1/§5.2, RFC 6750 §3.1 and RFC 7591 §3.2.2; every
//! variant renders as a standard `{error, error_description}` body and never
//! carries internal detail. [`KeyError`] covers signing key material and is logged,
//! then surfaced to clients as `server_error`.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Protocol-level errors returned to OAuth clients.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthError {
    /// Malformed or missing request parameter.
    #[error("invalid_request: {0}")]
    InvalidRequest(&'static str),

    /// Client authentication failed or the client is unknown.
    #[error("invalid_client")]
    InvalidClient,

    /// Authorization code or refresh token is invalid, expired, revoked,
    /// already used, or bound to another client.
    #[error("invalid_grant")]
    InvalidGrant,

    /// The client is not allowed to use this grant or response type.
    #[error("unauthorized_client")]
    UnauthorizedClient,

    /// The grant type is not supported by this server.
    #[error("unsupported_grant_type")]
    UnsupportedGrantType,

    /// The response type is not supported by this server.
    #[error("unsupported_response_type")]
    UnsupportedResponseType,

    /// Requested scope is unknown or exceeds what the client may request.
    #[error("invalid_scope")]
    InvalidScope,

    /// Bearer token lacks the scope required by the resource.
    #[error("insufficient_scope")]
    InsufficientScope,

    /// Bearer token is malformed, unknown, expired or revoked.
    #[error("invalid_token: {0}")]
    InvalidToken(&'static str),

    /// The resource owner denied the request.
    #[error("access_denied")]
    AccessDenied,

    /// Client registration metadata was rejected.
    #[error("invalid_client_metadata: {0}")]
    InvalidClientMetadata(&'static str),

    /// Unexpected internal failure.
    #[error("server_error")]
    ServerError,

    /// The server cannot handle the request right now.
    #[error("temporarily_unavailable")]
    TemporarilyUnavailable,
}

impl OAuthError {
    /// The registered error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::InvalidScope => "invalid_scope",
            Self::InsufficientScope => "insufficient_scope",
            Self::InvalidToken(_) => "invalid_token",
            Self::AccessDenied => "access_denied",
            Self::InvalidClientMetadata(_) => "invalid_client_metadata",
            Self::ServerError => "server_error",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
        }
    }

    /// Human-readable description safe to show to clients.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::InvalidRequest(msg)
            | Self::InvalidToken(msg)
            | Self::InvalidClientMetadata(msg) => *msg,
            Self::InvalidClient => "Client authentication failed",
            Self::InvalidGrant => "The provided authorization grant is invalid",
            Self::UnauthorizedClient => "The client is not authorized to use this method",
            Self::UnsupportedGrantType => "The grant type is not supported",
            Self::UnsupportedResponseType => "The response type is not supported",
            Self::InvalidScope => "The requested scope is invalid or unknown",
            Self::InsufficientScope => "The request requires higher privileges",
            Self::AccessDenied => "The resource owner denied the request",
            Self::ServerError => "The server encountered an unexpected condition",
            Self::TemporarilyUnavailable => "The server is temporarily unavailable",
        }
    }

    /// HTTP status used when the error is returned directly.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidClient | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientScope | Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::TemporarilyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// The JSON body for this error.
    #[must_use]
    pub const fn body(&self) -> ErrorBody {
        ErrorBody { error: self.error_code(), error_description: self.description() }
    }
}

/// Standard OAuth error response body.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: &'static str,
    pub error_description: &'static str,
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        response
    }
}

/// Errors from signing key management.
#[derive(thiserror::Error, Debug)]
pub enum KeyError {
    /// RSA key generation or parameter error
    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    /// PKCS#1 encoding/decoding error
    #[error("PKCS#1 error: {0}")]
    Pkcs1(#[from] rsa::pkcs1::Error),

    /// PKCS#8 decoding error
    #[error("PKCS#8 error: {0}")]
    Pkcs8(#[from] rsa::pkcs8::Error),

    /// JWT encoding or decoding error
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Key file could not be read
    #[error("Failed to read key file {path}: {source}")]
    Io {
        /// Path of the key file
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Key id not present in the active set
    #[error("Unknown key id: {0}")]
    UnknownKey(String),

    /// Attempt to remove the key currently used for signing
    #[error("Cannot retire the current signing key {0}")]
    RetireCurrent(String),

    /// Key id already present in the active set
    #[error("Duplicate key id: {0}")]
    DuplicateKey(String),
}

impl From<KeyError> for OAuthError {
    fn from(err: KeyError) -> Self {
        tracing::error!(error = %err, "Signing key failure");
        Self::ServerError
    }
}

/// Result type alias for protocol operations.
pub type OAuthResult<T> = Result<T, OAuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(OAuthError::InvalidClient.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(OAuthError::InvalidGrant.status(), StatusCode::BAD_REQUEST);
        assert_eq!(OAuthError::InsufficientScope.status(), StatusCode::FORBIDDEN);
        assert_eq!(OAuthError::InvalidToken("expired").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(OAuthError::ServerError.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_body_uses_registered_codes() {
        let body = OAuthError::InvalidRequest("Missing client_id").body();
        assert_eq!(body.error, "invalid_request");
        assert_eq!(body.error_description, "Missing client_id");

        let body = OAuthError::InvalidGrant.body();
        assert_eq!(body.error, "invalid_grant");
    }

    #[test]
    fn test_key_error_hides_detail() {
        let err: OAuthError = KeyError::UnknownKey("k1".into()).into();
        assert_eq!(err, OAuthError::ServerError);
        assert!(!err.description().contains("k1"));
    }
}
