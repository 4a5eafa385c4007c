//! Token domain types.
//!
//! A [`TokenRecord`] is the materialized content of a token, independent of
//! how it is rendered. Stored tokens wrap a record together with lifecycle
//! metadata.
//!
//! # Security
//!
//! - Token values are stored as SHA-256 hashes, never plaintext
//! - Refresh tokens are never deleted on rotation; they move to the
//!   [`RefreshTokenState::Used`] state so reuse can be detected

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::claims::ClaimFilters;
use crate::oauth::pkce::PkceChallenge;
use crate::scope::{EffectiveScope, OPENID_SCOPE};
use crate::types::client::ClientType;

/// Which tokens should embed user claims (`claims_in_tokens` parameter).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsInTokens {
    pub token: bool,
    pub id_token: bool,
}

/// Content of an issued token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Subject identifier (the client id for client credentials).
    pub subject: String,
    pub issuer: String,
    pub client_id: String,
    pub client_type: ClientType,

    /// Scopes as originally requested, before validation.
    pub requested_scopes: Vec<String>,
    pub effective_scopes: Vec<EffectiveScope>,

    pub audience: Vec<String>,
    #[serde(default)]
    pub claim_filters: ClaimFilters,

    /// Snapshot of the user claims computed at issuance.
    #[serde(default)]
    pub user_info: Map<String, Value>,

    #[serde(default)]
    pub acr: Option<String>,
    /// Authentication time, seconds since the epoch.
    #[serde(default)]
    pub auth_time: Option<i64>,

    #[serde(default)]
    pub claims_in_tokens: ClaimsInTokens,
    #[serde(default)]
    pub nonce: Option<String>,

    /// Group used for attribute lookups on refresh.
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub translation_profile: Option<String>,
}

impl TokenRecord {
    /// Returns `true` if the record was issued in OpenID mode.
    #[must_use]
    pub fn is_openid(&self) -> bool {
        self.has_scope(OPENID_SCOPE)
    }

    #[must_use]
    pub fn has_scope(&self, name: &str) -> bool {
        self.effective_scopes.iter().any(|s| s.name == name)
    }

    #[must_use]
    pub fn scope_names(&self) -> Vec<String> {
        self.effective_scopes.iter().map(|s| s.name.clone()).collect()
    }

    /// Space-joined effective scope names.
    #[must_use]
    pub fn scope_string(&self) -> String {
        crate::scope::join_scopes(&self.effective_scopes)
    }
}

/// Access token as persisted by the token repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAccessToken {
    /// SHA-256 hash of the token value (opaque or JWT).
    pub token_hash: String,
    pub record: TokenRecord,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// Rotation family of the refresh token this token was minted with.
    #[serde(default)]
    pub family_id: Option<Uuid>,
    #[serde(default)]
    pub revoked: bool,
}

impl StoredAccessToken {
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if the token is neither expired nor revoked.
    #[must_use]
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }
}

/// Lifecycle state of a refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RefreshTokenState {
    Active,
    /// Rotated; presenting it again is a reuse event.
    Used { superseded_by: Uuid },
    Revoked,
}

/// Refresh token as persisted by the token repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRefreshToken {
    pub id: Uuid,
    /// SHA-256 hash of the token value.
    pub token_hash: String,
    pub record: TokenRecord,
    /// Id of the first token of the rotation family.
    pub family_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    pub state: RefreshTokenState,
}

impl StoredRefreshToken {
    /// Creates the first token of a new rotation family.
    #[must_use]
    pub fn new_family(
        token_hash: String,
        record: TokenRecord,
        now: OffsetDateTime,
        expires_at: Option<OffsetDateTime>,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            token_hash,
            record,
            family_id: id,
            created_at: now,
            expires_at,
            state: RefreshTokenState::Active,
        }
    }

    /// Creates the successor of `self` within the same family.
    #[must_use]
    pub fn successor(
        &self,
        token_hash: String,
        record: TokenRecord,
        now: OffsetDateTime,
        expires_at: Option<OffsetDateTime>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            token_hash,
            record,
            family_id: self.family_id,
            created_at: now,
            expires_at,
            state: RefreshTokenState::Active,
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    #[must_use]
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        self.state == RefreshTokenState::Active && !self.is_expired_at(now)
    }
}

/// Authorization code awaiting exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCodeRecord {
    /// SHA-256 hash of the code value.
    pub code_hash: String,
    pub record: TokenRecord,
    /// Redirect URI chosen during validation.
    pub redirect_uri: String,
    /// Whether `redirect_uri` was present in the authorization request.
    pub redirect_uri_supplied: bool,
    #[serde(default)]
    pub pkce: Option<PkceChallenge>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl AuthorizationCodeRecord {
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// Hash a token value using SHA-256.
///
/// This is used both when storing new tokens and when looking up
/// tokens for validation.
#[must_use]
pub fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a cryptographically secure random token.
///
/// Returns a 256-bit random value encoded as base64url (43 characters).
#[must_use]
pub fn generate_token() -> String {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
