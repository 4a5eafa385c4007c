//! Token endpoint service.
//!
//! [`TokenService`] dispatches a token request to one of the four grant
//! handlers, each of which produces a [`GrantOutcome`]: the new
//! [`TokenRecord`] plus what should be issued for it. The outcome is then
//! rendered through the [`AccessTokenFactory`].
//!
//! # Usage
//!
//! ```ignore
//! use keygate_auth::token::TokenService;
//!
//! let service = TokenService::new(config, scopes, tokens, attributes, factory);
//! let response = service.handle(&request, &client, jwt_requested, OffsetDateTime::now_utc()).await?;
//! ```

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::claims::{ClaimFilters, attributes_to_claims, filter_attributes};
use crate::config::{AuthConfig, RefreshIssuePolicy};
use crate::error::AuthError;
use crate::oauth::client_auth::AuthenticatedClient;
use crate::oauth::token::{
    ACCESS_TOKEN_TYPE_URN, GRANT_AUTHORIZATION_CODE, GRANT_CLIENT_CREDENTIALS, GRANT_REFRESH_TOKEN,
    GRANT_TOKEN_EXCHANGE, ID_TOKEN_TYPE_URN, TokenRequest, TokenResponse,
};
use crate::scope::{EffectiveScope, OFFLINE_ACCESS_SCOPE, ScopeRegistry};
use crate::storage::{AttributeQuery, TokenRepository, UserAttributeSource};
use crate::token::factory::AccessTokenFactory;
use crate::types::{StoredRefreshToken, TokenRecord, generate_token, hash_token};

/// What a grant handler decided to issue.
#[derive(Debug, Clone)]
pub struct GrantOutcome {
    pub record: TokenRecord,
    /// Plaintext refresh token to return, if one was minted.
    pub refresh_token: Option<String>,
    /// Refresh token family the access token belongs to.
    pub family_id: Option<Uuid>,
    /// Whether to add an ID token next to the access token.
    pub id_token: bool,
    pub issued: IssuedTokenType,
}

/// Primary token of the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuedTokenType {
    AccessToken,
    /// Access token, reported with `issued_token_type` (token exchange).
    ExchangedAccessToken,
    /// Only an ID token (token exchange to `id_token`).
    ExchangedIdToken,
}

impl GrantOutcome {
    pub(crate) fn access_token(record: TokenRecord) -> Self {
        Self {
            record,
            refresh_token: None,
            family_id: None,
            id_token: false,
            issued: IssuedTokenType::AccessToken,
        }
    }
}

/// Token endpoint service.
pub struct TokenService {
    pub(crate) config: Arc<AuthConfig>,
    pub(crate) scopes: Arc<ScopeRegistry>,
    pub(crate) tokens: Arc<dyn TokenRepository>,
    pub(crate) attributes: Arc<dyn UserAttributeSource>,
    pub(crate) factory: Arc<AccessTokenFactory>,
}

impl TokenService {
    #[must_use]
    pub fn new(
        config: Arc<AuthConfig>,
        scopes: Arc<ScopeRegistry>,
        tokens: Arc<dyn TokenRepository>,
        attributes: Arc<dyn UserAttributeSource>,
        factory: Arc<AccessTokenFactory>,
    ) -> Self {
        Self {
            config,
            scopes,
            tokens,
            attributes,
            factory,
        }
    }

    /// Processes a token request from an authenticated client.
    ///
    /// `jwt_requested` is set when the client asked for a JWT access token
    /// through the `Accept` header.
    ///
    /// # Errors
    ///
    /// Returns the OAuth error of the failed grant.
    pub async fn handle(
        &self,
        request: &TokenRequest,
        client: &AuthenticatedClient,
        jwt_requested: bool,
        now: OffsetDateTime,
    ) -> AuthResult<TokenResponse> {
        let outcome = match request.grant_type.as_str() {
            "" => return Err(AuthError::invalid_request("Missing grant_type parameter")),
            GRANT_AUTHORIZATION_CODE => self.exchange_code(request, client, now).await,
            GRANT_REFRESH_TOKEN => self.refresh(request, client, now).await,
            GRANT_TOKEN_EXCHANGE => self.exchange_token(request, client, now).await,
            GRANT_CLIENT_CREDENTIALS => self.client_credentials(request, client),
            other => Err(AuthError::unsupported_grant_type(other)),
        };

        let outcome = outcome.inspect_err(|err| {
            if err.is_server_error() {
                tracing::error!(grant_type = %request.grant_type, error = %err, "Token request failed");
            } else {
                tracing::warn!(
                    grant_type = %request.grant_type,
                    client_id = %client.client.client_id,
                    error = %err,
                    "Token request rejected"
                );
            }
        })?;

        self.respond(outcome, jwt_requested, now).await
    }

    async fn respond(
        &self,
        outcome: GrantOutcome,
        jwt_requested: bool,
        now: OffsetDateTime,
    ) -> AuthResult<TokenResponse> {
        let scope = outcome.record.scope_string();

        if outcome.issued == IssuedTokenType::ExchangedIdToken {
            let id_token = self.factory.issue_exchanged_id_token(&outcome.record, now)?;
            let mut response =
                TokenResponse::new(id_token, self.factory.id_token_lifetime_secs(), scope)
                    .with_issued_token_type(ID_TOKEN_TYPE_URN);
            response.token_type = "N_A".to_string();
            return Ok(response);
        }

        let access = self
            .factory
            .issue_access_token(&outcome.record, jwt_requested, outcome.family_id, now)
            .await?;
        let mut response = TokenResponse::new(access.value, access.expires_in, scope);

        if let Some(refresh_token) = outcome.refresh_token {
            response = response.with_refresh_token(refresh_token);
        }
        if outcome.id_token {
            response =
                response.with_id_token(self.factory.issue_id_token(&outcome.record, false, now)?);
        }
        if outcome.issued == IssuedTokenType::ExchangedAccessToken {
            response = response.with_issued_token_type(ACCESS_TOKEN_TYPE_URN);
        }
        Ok(response)
    }

    /// Whether a new grant for `record` gets a refresh token.
    pub(crate) fn should_issue_refresh(&self, record: &TokenRecord) -> bool {
        let by_policy = match self.config.refresh.issue_policy {
            RefreshIssuePolicy::Always => true,
            RefreshIssuePolicy::Never => false,
            RefreshIssuePolicy::OfflineScopeBased => record.has_scope(OFFLINE_ACCESS_SCOPE),
        };
        // public clients only hold refresh tokens that rotate
        by_policy
            && (!record.client_type.is_public() || self.config.refresh.rotation.applies_to(true))
    }

    pub(crate) fn refresh_expiry(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        Some(now + self.config.refresh.lifetime)
    }

    /// Starts a new rotation family for `record`.
    pub(crate) async fn mint_refresh_family(
        &self,
        record: &TokenRecord,
        now: OffsetDateTime,
    ) -> AuthResult<(String, Uuid)> {
        let value = generate_token();
        let stored = StoredRefreshToken::new_family(
            hash_token(&value),
            record.clone(),
            now,
            self.refresh_expiry(now),
        );
        self.tokens.store_refresh_token(&stored).await?;
        tracing::info!(
            client_id = %record.client_id,
            family_id = %stored.family_id,
            "Refresh token issued"
        );
        Ok((value, stored.family_id))
    }

    /// Looks up the current attributes of the record's subject and renders
    /// them as claims, restricted to `scopes` and `filters`.
    pub(crate) async fn live_user_info(
        &self,
        record: &TokenRecord,
        client_id: &str,
        scopes: &[EffectiveScope],
        filters: &ClaimFilters,
    ) -> AuthResult<serde_json::Map<String, serde_json::Value>> {
        let group = record
            .group
            .as_deref()
            .unwrap_or(&self.config.authorize.users_group);
        let attributes = self
            .attributes
            .resolve(AttributeQuery {
                subject: &record.subject,
                client_id,
                group,
                translation_profile: record.translation_profile.as_deref(),
            })
            .await
            .map_err(|err| match err {
                AuthError::AccessDenied { message } => AuthError::invalid_grant(message),
                other => other,
            })?;
        Ok(attributes_to_claims(&filter_attributes(
            &attributes,
            scopes,
            filters,
        )))
    }
}
