//! Token revocation (RFC 7009)
//!
//! Revoking an access token marks it revoked. Revoking a refresh token
//! revokes its whole rotation family together with the access tokens minted
//! from it.
//!
//! # Security Considerations
//!
//! - Unknown tokens are answered with success so the endpoint does not
//!   reveal token existence
//! - A client may only revoke its own tokens
//! - Confidential clients must authenticate, except in the legacy mode
//!
//! # References
//!
//! - [RFC 7009 - OAuth 2.0 Token Revocation](https://tools.ietf.org/html/rfc7009)

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::storage::TokenRepository;
use crate::types::{StoredAccessToken, StoredRefreshToken, TokenRecord, hash_token};

// =============================================================================
// Request Types
// =============================================================================

/// Token revocation request per RFC 7009.
#[derive(Debug, Clone, Deserialize)]
pub struct RevocationRequest {
    /// The token to revoke.
    pub token: String,

    /// Optional hint about the token type. Unknown values are ignored.
    #[serde(default)]
    pub token_type_hint: Option<String>,
}

impl RevocationRequest {
    #[must_use]
    pub fn hint(&self) -> Option<TokenTypeHint> {
        self.token_type_hint.as_deref().and_then(TokenTypeHint::parse)
    }
}

/// Token type hint for revocation and introspection requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

impl TokenTypeHint {
    /// Parses a hint; anything unrecognized yields `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "access_token" => Some(Self::AccessToken),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
        }
    }
}

impl std::fmt::Display for TokenTypeHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who is asking to revoke.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevocationCaller {
    /// Client id from authentication or from the `client_id` parameter.
    pub client_id: Option<String>,
    /// Whether the client proved its identity.
    pub authenticated: bool,
}

// =============================================================================
// Lookup
// =============================================================================

/// A stored token found by its value.
#[derive(Debug, Clone)]
pub(crate) enum FoundToken {
    Access(StoredAccessToken),
    Refresh(StoredRefreshToken),
}

impl FoundToken {
    pub(crate) fn record(&self) -> &TokenRecord {
        match self {
            Self::Access(token) => &token.record,
            Self::Refresh(token) => &token.record,
        }
    }
}

/// Looks a token up in both tables, the hinted one first.
pub(crate) async fn find_token(
    tokens: &dyn TokenRepository,
    value: &str,
    hint: Option<TokenTypeHint>,
) -> AuthResult<Option<FoundToken>> {
    let hash = hash_token(value);
    let order = match hint {
        Some(TokenTypeHint::RefreshToken) => {
            [TokenTypeHint::RefreshToken, TokenTypeHint::AccessToken]
        }
        _ => [TokenTypeHint::AccessToken, TokenTypeHint::RefreshToken],
    };
    for kind in order {
        let found = match kind {
            TokenTypeHint::AccessToken => tokens
                .find_access_token(&hash)
                .await?
                .map(FoundToken::Access),
            TokenTypeHint::RefreshToken => tokens
                .find_refresh_token(&hash)
                .await?
                .map(FoundToken::Refresh),
        };
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

// =============================================================================
// Service
// =============================================================================

/// Revocation endpoint service.
pub struct RevocationService {
    config: Arc<AuthConfig>,
    tokens: Arc<dyn TokenRepository>,
}

impl RevocationService {
    #[must_use]
    pub fn new(config: Arc<AuthConfig>, tokens: Arc<dyn TokenRepository>) -> Self {
        Self { config, tokens }
    }

    /// Revokes the presented token.
    ///
    /// # Errors
    ///
    /// - `invalid_request` when no client id was supplied for a known token
    /// - `invalid_client` when the caller does not own the token, or a
    ///   confidential owner did not authenticate
    pub async fn revoke(
        &self,
        request: &RevocationRequest,
        caller: &RevocationCaller,
    ) -> AuthResult<()> {
        let Some(found) = find_token(self.tokens.as_ref(), &request.token, request.hint()).await?
        else {
            tracing::debug!("Revocation of an unknown token ignored");
            return Ok(());
        };
        let owner = found.record();

        let client_id = caller
            .client_id
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("client_id is required"))?;
        if client_id != owner.client_id {
            tracing::warn!(
                client_id = %client_id,
                owner = %owner.client_id,
                "Revocation of a token owned by another client"
            );
            return Err(AuthError::invalid_client("token was issued to another client"));
        }
        if !owner.client_type.is_public()
            && !caller.authenticated
            && !self.config.revocation.allow_unauthenticated_legacy
        {
            return Err(AuthError::invalid_client("client authentication is required"));
        }

        match &found {
            FoundToken::Access(token) => {
                self.tokens.revoke_access_token(&token.token_hash).await?;
                tracing::info!(client_id = %client_id, "Access token revoked");
            }
            FoundToken::Refresh(token) => {
                let revoked = self
                    .tokens
                    .revoke_refresh_family(token.family_id, client_id)
                    .await?;
                tracing::info!(
                    client_id = %client_id,
                    family_id = %token.family_id,
                    revoked,
                    "Refresh token family revoked"
                );
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
