//! Authorization server configuration.
//!
//! Every section is `#[serde(default)]` so a deployment only needs to spell
//! out what differs from the defaults. Durations use `humantime` notation
//! (`"10m"`, `"30d"`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard ceiling for the lifetime of an in-flight authorization context.
pub const MAX_CONTEXT_TIMEOUT: Duration = Duration::from_secs(900);

/// Scope a subject token must carry to be exchanged.
pub const DEFAULT_EXCHANGE_SCOPE: &str = "token-exchange";

/// Root configuration of the authorization server core.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// issuer = "https://idp.example.com"
///
/// [auth.tokens]
/// access_token_lifetime = "1h"
/// access_token_format = "jwt"
///
/// [auth.refresh]
/// issue_policy = "offline_scope_based"
/// rotation = "always"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer identifier placed in every token's `iss` claim.
    pub issuer: String,

    /// Scope that grants the right to exchange a token (RFC 8693).
    pub exchange_scope: String,

    /// Authorization endpoint settings.
    pub authorize: AuthorizeConfig,

    /// Access and ID token settings.
    pub tokens: TokensConfig,

    /// Refresh token settings.
    pub refresh: RefreshConfig,

    /// Consent settings.
    pub consent: ConsentConfig,

    /// Revocation endpoint settings.
    pub revocation: RevocationConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            exchange_scope: DEFAULT_EXCHANGE_SCOPE.to_string(),
            authorize: AuthorizeConfig::default(),
            tokens: TokensConfig::default(),
            refresh: RefreshConfig::default(),
            consent: ConsentConfig::default(),
            revocation: RevocationConfig::default(),
        }
    }
}

/// Authorization endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorizeConfig {
    /// How long an accepted authorization request stays usable.
    #[serde(with = "humantime_serde")]
    pub context_timeout: Duration,

    /// Authorization code lifetime.
    #[serde(with = "humantime_serde")]
    pub code_lifetime: Duration,

    /// Match redirect URIs against registered wildcard patterns.
    pub allow_wildcard_redirects: bool,

    /// Where the user agent is sent to authenticate and consent.
    /// The context handle is appended as the `context` query parameter.
    pub interaction_url: String,

    /// Group whose members may authorize, unless the client overrides it.
    pub users_group: String,

    /// Output translation profile applied to user attributes.
    pub translation_profile: Option<String>,

    /// Whether OpenID Connect requests are served.
    pub openid_enabled: bool,
}

impl Default for AuthorizeConfig {
    fn default() -> Self {
        Self {
            context_timeout: MAX_CONTEXT_TIMEOUT,
            code_lifetime: Duration::from_secs(600),
            allow_wildcard_redirects: false,
            interaction_url: "http://localhost:8080/login".to_string(),
            users_group: "/".to_string(),
            translation_profile: None,
            openid_enabled: true,
        }
    }
}

/// How access tokens are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTokenFormat {
    /// Random opaque identifiers, resolvable only through introspection.
    Opaque,
    /// Signed JWTs (`typ: at+jwt`).
    Jwt,
    /// JWT when the token request accepts `application/at+jwt`, opaque otherwise.
    AsRequested,
}

impl AccessTokenFormat {
    /// Returns `true` if this format can ever yield a JWT.
    #[must_use]
    pub fn supports_jwt(&self) -> bool {
        !matches!(self, Self::Opaque)
    }
}

/// Access and ID token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokensConfig {
    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// ID token lifetime.
    #[serde(with = "humantime_serde")]
    pub id_token_lifetime: Duration,

    /// Access token rendering.
    pub access_token_format: AccessTokenFormat,

    /// Signing algorithm: RS256, RS384 or ES384.
    pub signing_algorithm: String,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(3600),
            id_token_lifetime: Duration::from_secs(3600),
            access_token_format: AccessTokenFormat::Opaque,
            signing_algorithm: "RS256".to_string(),
        }
    }
}

/// When a refresh token is minted alongside an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshIssuePolicy {
    /// Always issue a refresh token.
    Always,
    /// Never issue a refresh token.
    Never,
    /// Issue only when `offline_access` is among the effective scopes.
    OfflineScopeBased,
}

/// Which clients get their refresh token replaced on every use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshRotation {
    /// Rotate for every client.
    Always,
    /// Rotate for public clients only.
    PublicClients,
    /// Never rotate; public clients get no refresh tokens at all.
    Never,
}

impl RefreshRotation {
    /// Returns `true` if refresh tokens of this client type rotate.
    #[must_use]
    pub fn applies_to(&self, public_client: bool) -> bool {
        match self {
            Self::Always => true,
            Self::PublicClients => public_client,
            Self::Never => false,
        }
    }
}

/// Refresh token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Issuance policy.
    pub issue_policy: RefreshIssuePolicy,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,

    /// Rotation policy.
    pub rotation: RefreshRotation,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            issue_policy: RefreshIssuePolicy::OfflineScopeBased,
            lifetime: Duration::from_secs(30 * 24 * 3600),
            rotation: RefreshRotation::Always,
        }
    }
}

/// Consent configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsentConfig {
    /// Clients for which the deployment skips the consent screen.
    pub skip_consent_clients: Vec<String>,

    /// Clients that present an active value selection step before consent.
    pub active_value_clients: Vec<String>,
}

impl ConsentConfig {
    /// Returns `true` if consent is disabled for the client.
    #[must_use]
    pub fn skips_consent(&self, client_id: &str) -> bool {
        self.skip_consent_clients.iter().any(|c| c == client_id)
    }

    /// Returns `true` if the client has an active value selection step.
    #[must_use]
    pub fn has_active_value_selection(&self, client_id: &str) -> bool {
        self.active_value_clients.iter().any(|c| c == client_id)
    }
}

/// Revocation endpoint configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RevocationConfig {
    /// Let confidential clients revoke their tokens without authenticating.
    pub allow_unauthenticated_legacy: bool,
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// Returns an error if any configuration values are invalid or inconsistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("issuer".to_string()));
        }
        url::Url::parse(&self.issuer).map_err(|e| {
            ConfigError::InvalidValue(format!("issuer '{}' is not a URL: {}", self.issuer, e))
        })?;

        if self.exchange_scope.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "exchange_scope cannot be empty".to_string(),
            ));
        }

        if self.authorize.context_timeout.is_zero()
            || self.authorize.context_timeout > MAX_CONTEXT_TIMEOUT
        {
            return Err(ConfigError::InvalidValue(format!(
                "authorize.context_timeout must be between 1s and {}s",
                MAX_CONTEXT_TIMEOUT.as_secs()
            )));
        }

        if self.authorize.code_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "authorize.code_lifetime must be > 0".to_string(),
            ));
        }

        url::Url::parse(&self.authorize.interaction_url).map_err(|e| {
            ConfigError::InvalidValue(format!("authorize.interaction_url is not a URL: {e}"))
        })?;

        if self.tokens.access_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "tokens.access_token_lifetime must be > 0".to_string(),
            ));
        }

        match self.tokens.signing_algorithm.as_str() {
            "RS256" | "RS384" | "ES384" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid signing algorithm: '{}'. Must be RS256, RS384, or ES384",
                    other
                )));
            }
        }

        if self.refresh.issue_policy != RefreshIssuePolicy::Never && self.refresh.lifetime.is_zero()
        {
            return Err(ConfigError::InvalidValue(
                "refresh.lifetime must be > 0 when refresh tokens are issued".to_string(),
            ));
        }

        Ok(())
    }
}
