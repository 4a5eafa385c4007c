//! Token introspection (RFC 7662)
//!
//! # Security Considerations
//!
//! - Introspection requires client authentication
//! - Never reveal why a token is inactive (expired vs revoked vs unknown)
//!
//! # References
//!
//! - [RFC 7662 - OAuth 2.0 Token Introspection](https://tools.ietf.org/html/rfc7662)

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::client_auth::AuthenticatedClient;
use crate::storage::TokenRepository;
use crate::token::revocation::{FoundToken, TokenTypeHint, find_token};
use crate::types::TokenRecord;

/// Token introspection request per RFC 7662.
#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectionRequest {
    pub token: String,

    /// Optional hint about the token type. Unknown values are ignored.
    #[serde(default)]
    pub token_type_hint: Option<String>,
}

/// Token introspection response per RFC 7662.
///
/// An inactive token serializes as `{"active":false}` only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// `Bearer` for access tokens, `refresh_token` for refresh tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl IntrospectionResponse {
    /// Response for any token that is not usable.
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }

    fn active(
        record: &TokenRecord,
        token_type: &str,
        issued_at: OffsetDateTime,
        expires_at: Option<OffsetDateTime>,
    ) -> Self {
        Self {
            active: true,
            scope: Some(record.scope_string()),
            client_id: Some(record.client_id.clone()),
            token_type: Some(token_type.to_string()),
            exp: expires_at.map(OffsetDateTime::unix_timestamp),
            iat: Some(issued_at.unix_timestamp()),
            nbf: Some(issued_at.unix_timestamp()),
            sub: Some(record.subject.clone()),
            aud: Some(record.audience.clone()),
            iss: Some(record.issuer.clone()),
        }
    }
}

/// Introspection endpoint service.
pub struct IntrospectionService {
    tokens: Arc<dyn TokenRepository>,
}

impl IntrospectionService {
    #[must_use]
    pub fn new(tokens: Arc<dyn TokenRepository>) -> Self {
        Self { tokens }
    }

    /// Reports the state of the presented token.
    ///
    /// # Errors
    ///
    /// Returns `invalid_client` if the caller did not authenticate, or a
    /// storage error.
    pub async fn introspect(
        &self,
        request: &IntrospectionRequest,
        caller: &AuthenticatedClient,
        now: OffsetDateTime,
    ) -> AuthResult<IntrospectionResponse> {
        if !caller.is_authenticated() {
            return Err(AuthError::invalid_client(
                "introspection requires client authentication",
            ));
        }

        let hint = request.token_type_hint.as_deref().and_then(TokenTypeHint::parse);
        let response = match find_token(self.tokens.as_ref(), &request.token, hint).await? {
            Some(FoundToken::Access(token)) if token.is_active_at(now) => {
                IntrospectionResponse::active(
                    &token.record,
                    "Bearer",
                    token.issued_at,
                    Some(token.expires_at),
                )
            }
            Some(FoundToken::Refresh(token)) if token.is_active_at(now) => {
                IntrospectionResponse::active(
                    &token.record,
                    "refresh_token",
                    token.created_at,
                    token.expires_at,
                )
            }
            _ => IntrospectionResponse::inactive(),
        };

        tracing::debug!(
            client_id = %caller.client.client_id,
            active = response.active,
            "Token introspected"
        );
        Ok(response)
    }
}
