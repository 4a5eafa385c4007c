//! Access token and ID token rendering.
//!
//! [`AccessTokenFactory`] turns a [`TokenRecord`] into a bearer string,
//! either an opaque random identifier or a signed `at+jwt`, and persists it
//! by hash so it can be introspected and revoked.

use std::sync::Arc;

use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::config::{AccessTokenFormat, AuthConfig};
use crate::storage::TokenRepository;
use crate::token::jwt::{AccessTokenClaims, IdTokenClaims, JwtService};
use crate::types::{StoredAccessToken, TokenRecord, generate_token, hash_token};

/// Media type a client sends in `Accept` to ask for a JWT access token.
pub const JWT_ACCESS_TOKEN_MEDIA_TYPE: &str = "application/at+jwt";

/// Claims the token body sets itself; user claims of the same name are dropped.
const REGISTERED_CLAIMS: &[&str] = &[
    "iss",
    "sub",
    "aud",
    "exp",
    "iat",
    "nbf",
    "jti",
    "client_id",
    "scope",
    "nonce",
    "auth_time",
    "acr",
];

/// Rendering of an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderedFormat {
    Opaque,
    Jwt,
}

/// A freshly minted access token.
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub value: String,
    pub format: RenderedFormat,
    pub expires_in: u64,
}

/// Renders and persists access tokens and signs ID tokens.
pub struct AccessTokenFactory {
    config: Arc<AuthConfig>,
    jwt: Arc<JwtService>,
    tokens: Arc<dyn TokenRepository>,
}

impl AccessTokenFactory {
    #[must_use]
    pub fn new(
        config: Arc<AuthConfig>,
        jwt: Arc<JwtService>,
        tokens: Arc<dyn TokenRepository>,
    ) -> Self {
        Self {
            config,
            jwt,
            tokens,
        }
    }

    /// Picks the rendering for `record`.
    ///
    /// With the `as_requested` format a JWT is produced when the client asked
    /// for [`JWT_ACCESS_TOKEN_MEDIA_TYPE`] or wants claims in the token.
    #[must_use]
    pub fn format_for(&self, record: &TokenRecord, jwt_requested: bool) -> RenderedFormat {
        match self.config.tokens.access_token_format {
            AccessTokenFormat::Opaque => RenderedFormat::Opaque,
            AccessTokenFormat::Jwt => RenderedFormat::Jwt,
            AccessTokenFormat::AsRequested if jwt_requested || record.claims_in_tokens.token => {
                RenderedFormat::Jwt
            }
            AccessTokenFormat::AsRequested => RenderedFormat::Opaque,
        }
    }

    /// Mints an access token for `record` and stores it.
    ///
    /// `family_id` links the token to the refresh token family it was issued
    /// with, so that revoking the family also revokes it.
    ///
    /// # Errors
    ///
    /// Returns an error if signing or storage fails.
    pub async fn issue_access_token(
        &self,
        record: &TokenRecord,
        jwt_requested: bool,
        family_id: Option<Uuid>,
        now: OffsetDateTime,
    ) -> AuthResult<IssuedAccessToken> {
        let lifetime = self.config.tokens.access_token_lifetime;
        let expires_at = now + lifetime;
        let format = self.format_for(record, jwt_requested);

        let value = match format {
            RenderedFormat::Opaque => generate_token(),
            RenderedFormat::Jwt => {
                let claims = AccessTokenClaims {
                    iss: record.issuer.clone(),
                    sub: record.subject.clone(),
                    aud: record.audience.clone(),
                    exp: expires_at.unix_timestamp(),
                    iat: now.unix_timestamp(),
                    jti: Uuid::new_v4().to_string(),
                    client_id: record.client_id.clone(),
                    scope: record.scope_string(),
                    extra: if record.claims_in_tokens.token {
                        user_claims(record)
                    } else {
                        Map::new()
                    },
                };
                self.jwt.encode_access_token(&claims)?
            }
        };

        self.tokens
            .store_access_token(&StoredAccessToken {
                token_hash: hash_token(&value),
                record: record.clone(),
                issued_at: now,
                expires_at,
                family_id,
                revoked: false,
            })
            .await?;

        tracing::info!(
            client_id = %record.client_id,
            format = ?format,
            scope = %record.scope_string(),
            "Access token issued"
        );

        Ok(IssuedAccessToken {
            value,
            format,
            expires_in: lifetime.as_secs(),
        })
    }

    /// Signs an ID token for `record`, addressed to its client.
    ///
    /// User claims are embedded when `with_claims` is set, or when the record
    /// asked for claims in the ID token.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue_id_token(
        &self,
        record: &TokenRecord,
        with_claims: bool,
        now: OffsetDateTime,
    ) -> AuthResult<String> {
        self.sign_id_token(record, vec![record.client_id.clone()], with_claims, now)
    }

    /// Signs an ID token addressed to the record's audience (token exchange).
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue_exchanged_id_token(
        &self,
        record: &TokenRecord,
        now: OffsetDateTime,
    ) -> AuthResult<String> {
        self.sign_id_token(record, record.audience.clone(), false, now)
    }

    fn sign_id_token(
        &self,
        record: &TokenRecord,
        aud: Vec<String>,
        with_claims: bool,
        now: OffsetDateTime,
    ) -> AuthResult<String> {
        let expires_at = now + self.config.tokens.id_token_lifetime;
        let claims = IdTokenClaims {
            iss: record.issuer.clone(),
            sub: record.subject.clone(),
            aud,
            exp: expires_at.unix_timestamp(),
            iat: now.unix_timestamp(),
            nonce: record.nonce.clone(),
            auth_time: record.auth_time,
            acr: record.acr.clone(),
            extra: if with_claims || record.claims_in_tokens.id_token {
                user_claims(record)
            } else {
                Map::new()
            },
        };
        Ok(self.jwt.encode(&claims)?)
    }

    /// Lifetime of ID tokens in seconds.
    #[must_use]
    pub fn id_token_lifetime_secs(&self) -> u64 {
        self.config.tokens.id_token_lifetime.as_secs()
    }
}

/// The record's user claims restricted by its claim filters, minus claims
/// the token sets itself.
fn user_claims(record: &TokenRecord) -> Map<String, Value> {
    let mut claims = record.user_info.clone();
    record.claim_filters.apply_to_claims(&mut claims);
    claims.retain(|name, _| !REGISTERED_CLAIMS.contains(&name.as_str()));
    claims
}
