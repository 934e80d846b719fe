//! Configuration for the authorization server.

use std::path::PathBuf;
use std::time::Duration;

use crate::models::Scope;

/// Protocol defaults.
pub mod defaults {
    use std::time::Duration;

    /// Issuer used when none is configured.
    pub const ISSUER: &str = "http://localhost:5000";

    /// Scopes recognized by the server.
    pub const SCOPES_SUPPORTED: &[&str] = &["openid", "profile", "email"];

    /// Authorization code lifetime (10 minutes).
    pub const AUTH_CODE_TTL: Duration = Duration::from_secs(600);

    /// Access token lifetime (1 hour).
    pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(3600);

    /// Refresh token lifetime (30 days).
    pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

    /// Idle lifetime of a login session.
    pub const SESSION_TTL: Duration = Duration::from_secs(12 * 3600);

    /// Maximum number of concurrent login sessions kept in memory.
    pub const SESSION_MAX_ENTRIES: u64 = 10_000;

    /// Interval of the expired grant/token sweep.
    pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

    /// Per-request timeout applied by the HTTP layer.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Key id of the generated signing key.
    pub const SIGNING_KEY_ID: &str = "key-1";
}

/// Access token representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TokenFormat {
    /// Random opaque values validated by store lookup.
    #[default]
    Opaque,
    /// RS256-signed JWTs validated by signature and expiry.
    Signed,
}

/// PKCE enforcement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PkcePolicy {
    /// Public clients must send a code challenge.
    pub require_for_public: bool,
    /// Accept the `plain` challenge method.
    pub allow_plain: bool,
}

impl Default for PkcePolicy {
    fn default() -> Self {
        Self { require_for_public: true, allow_plain: true }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Issuer identifier; also the base URL for endpoint metadata.
    pub issuer: String,

    /// Scopes the server recognizes.
    pub scopes_supported: Scope,

    /// Access token representation.
    pub token_format: TokenFormat,

    /// Authorization code lifetime.
    pub auth_code_ttl: Duration,

    /// Access token lifetime.
    pub access_token_ttl: Duration,

    /// Refresh token lifetime.
    pub refresh_token_ttl: Duration,

    /// Issue a new refresh token on every refresh and invalidate the old one.
    pub rotate_refresh_tokens: bool,

    /// Revoke tokens issued from an authorization code when the code is replayed.
    pub revoke_on_code_replay: bool,

    /// Revoke the whole token family when a rotated-out refresh token is reused.
    pub revoke_family_on_refresh_reuse: bool,

    /// PKCE enforcement.
    pub pkce: PkcePolicy,

    /// PEM file holding the RSA signing key. A key is generated when absent.
    pub signing_key_path: Option<PathBuf>,

    /// Idle lifetime of a login session.
    pub session_ttl: Duration,

    /// Interval of the expired grant/token sweep.
    pub cleanup_interval: Duration,

    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Config {
    /// Create a configuration with defaults for the given issuer.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into().trim_end_matches('/').to_string(),
            scopes_supported: defaults::SCOPES_SUPPORTED.iter().copied().collect(),
            token_format: TokenFormat::default(),
            auth_code_ttl: defaults::AUTH_CODE_TTL,
            access_token_ttl: defaults::ACCESS_TOKEN_TTL,
            refresh_token_ttl: defaults::REFRESH_TOKEN_TTL,
            rotate_refresh_tokens: true,
            revoke_on_code_replay: true,
            revoke_family_on_refresh_reuse: true,
            pkce: PkcePolicy::default(),
            signing_key_path: None,
            session_ttl: defaults::SESSION_TTL,
            cleanup_interval: defaults::CLEANUP_INTERVAL,
            request_timeout: defaults::REQUEST_TIMEOUT,
        }
    }

    /// Create a test configuration with a fixed issuer.
    #[must_use]
    pub fn for_testing(issuer: &str) -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            ..Self::new(issuer)
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Recognized: `OAUTH2_ISSUER`, `OAUTH2_TOKEN_FORMAT` (`opaque`/`signed`),
    /// `OAUTH2_JWT_KEY_PATH`, `OAUTH2_SCOPES` (space separated), the lifetimes
    /// `OAUTH2_AUTH_CODE_TTL`, `OAUTH2_ACCESS_TOKEN_TTL` and
    /// `OAUTH2_REFRESH_TOKEN_TTL` (seconds), and the policy flags
    /// `OAUTH2_ROTATE_REFRESH_TOKENS`, `OAUTH2_REVOKE_ON_CODE_REPLAY`,
    /// `OAUTH2_REVOKE_FAMILY_ON_REFRESH_REUSE`, `OAUTH2_PKCE_REQUIRE_FOR_PUBLIC`
    /// and `OAUTH2_PKCE_ALLOW_PLAIN`.
    ///
    /// # Errors
    ///
    /// Returns error if environment variables are invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let issuer = lookup("OAUTH2_ISSUER").unwrap_or_else(|| defaults::ISSUER.into());
        let mut config = Self::new(issuer);

        if let Some(format) = lookup("OAUTH2_TOKEN_FORMAT") {
            config.token_format = <TokenFormat as clap::ValueEnum>::from_str(&format, true)
                .map_err(|e| anyhow::anyhow!("invalid OAUTH2_TOKEN_FORMAT: {e}"))?;
        }
        if let Some(path) = lookup("OAUTH2_JWT_KEY_PATH") {
            config.signing_key_path = Some(PathBuf::from(path));
        }
        if let Some(scopes) = lookup("OAUTH2_SCOPES") {
            config.scopes_supported = Scope::parse(&scopes);
        }

        let seconds = |name: &str, target: &mut Duration| -> anyhow::Result<()> {
            if let Some(value) = lookup(name) {
                *target = parse_seconds(name, &value)?;
            }
            Ok(())
        };
        seconds("OAUTH2_AUTH_CODE_TTL", &mut config.auth_code_ttl)?;
        seconds("OAUTH2_ACCESS_TOKEN_TTL", &mut config.access_token_ttl)?;
        seconds("OAUTH2_REFRESH_TOKEN_TTL", &mut config.refresh_token_ttl)?;

        let flag = |name: &str, target: &mut bool| -> anyhow::Result<()> {
            if let Some(value) = lookup(name) {
                *target = parse_flag(name, &value)?;
            }
            Ok(())
        };
        flag("OAUTH2_ROTATE_REFRESH_TOKENS", &mut config.rotate_refresh_tokens)?;
        flag("OAUTH2_REVOKE_ON_CODE_REPLAY", &mut config.revoke_on_code_replay)?;
        flag("OAUTH2_REVOKE_FAMILY_ON_REFRESH_REUSE", &mut config.revoke_family_on_refresh_reuse)?;
        flag("OAUTH2_PKCE_REQUIRE_FOR_PUBLIC", &mut config.pkce.require_for_public)?;
        flag("OAUTH2_PKCE_ALLOW_PLAIN", &mut config.pkce.allow_plain)?;
        Ok(config)
    }

    /// Absolute URL of an endpoint path on this server.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.issuer)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(defaults::ISSUER)
    }
}

fn parse_flag(name: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("invalid boolean for {name}: {other}"),
    }
}

/// Parse a positive lifetime in whole seconds.
fn parse_seconds(name: &str, value: &str) -> anyhow::Result<Duration> {
    let secs: u64 = value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid seconds for {name}: {e}"))?;
    if secs == 0 {
        anyhow::bail!("{name} must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}
