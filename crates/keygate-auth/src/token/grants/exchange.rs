//! Token exchange grant (RFC 8693).
//!
//! A confidential client holding an access token that carries the exchange
//! scope may trade it for a new access token or ID token addressed to
//! another audience. The exchange can only narrow the granted scopes or
//! concretize a pattern scope; actor tokens (impersonation) are refused.

use time::OffsetDateTime;

use crate::AuthResult;
use crate::claims::split_claim_filters;
use crate::error::AuthError;
use crate::oauth::client_auth::AuthenticatedClient;
use crate::oauth::token::{ACCESS_TOKEN_TYPE_URN, ID_TOKEN_TYPE_URN, TokenRequest};
use crate::scope::{EffectiveScope, OPENID_SCOPE, is_subset_of_pattern, parse_scope_param};
use crate::token::service::{GrantOutcome, IssuedTokenType, TokenService};
use crate::types::{TokenRecord, hash_token};

impl TokenService {
    /// Exchanges a subject access token for a new token.
    ///
    /// # Errors
    ///
    /// - `unauthorized_client` for public callers
    /// - `invalid_request` for unsupported token types, actor tokens, an
    ///   invalid subject token, or a subject token without the exchange scope
    /// - `invalid_scope` when a requested scope was not granted to the
    ///   subject token
    pub(crate) async fn exchange_token(
        &self,
        request: &TokenRequest,
        client: &AuthenticatedClient,
        now: OffsetDateTime,
    ) -> AuthResult<GrantOutcome> {
        if client.client.is_public() || !client.is_authenticated() {
            return Err(AuthError::unauthorized_client(
                "Only confidential clients may exchange tokens",
            ));
        }
        let caller = client.client.client_id.as_str();

        let subject_token = request
            .subject_token
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("Missing subject_token parameter"))?;
        if request.subject_token_type.as_deref() != Some(ACCESS_TOKEN_TYPE_URN) {
            return Err(AuthError::invalid_request("unsupported subject_token_type"));
        }
        let issued = match request.requested_token_type.as_deref() {
            None | Some(ACCESS_TOKEN_TYPE_URN) => IssuedTokenType::ExchangedAccessToken,
            Some(ID_TOKEN_TYPE_URN) => IssuedTokenType::ExchangedIdToken,
            Some(_) => return Err(AuthError::invalid_request("unsupported requested_token_type")),
        };
        if request.actor_token.is_some() {
            return Err(AuthError::invalid_request("unsupported actor_token"));
        }
        if request.actor_token_type.is_some() {
            return Err(AuthError::invalid_request("unsupported actor_token_type"));
        }

        let old = self
            .tokens
            .find_access_token(&hash_token(subject_token))
            .await?
            .filter(|t| t.is_active_at(now))
            .ok_or_else(|| AuthError::invalid_request("wrong subject_token"))?
            .record;

        if !old.requested_scopes.contains(&self.config.exchange_scope) {
            return Err(AuthError::invalid_request(format!(
                "subject_token must have the {} scope",
                self.config.exchange_scope
            )));
        }

        let mut requested = parse_scope_param(request.scope.as_deref());
        requested.retain(|s| s != &self.config.exchange_scope);
        let (names, filters) = split_claim_filters(&requested);

        let effective_scopes = if names.is_empty() {
            old.effective_scopes
                .iter()
                .filter(|s| s.name != self.config.exchange_scope)
                .cloned()
                .collect()
        } else {
            concretize(&old.effective_scopes, &names)?
        };

        if issued == IssuedTokenType::ExchangedIdToken {
            if !effective_scopes.iter().any(|s| s.name == OPENID_SCOPE) {
                return Err(AuthError::invalid_scope(
                    "openid scope is required for an ID token",
                ));
            }
            if !request.audience.is_empty() && !request.audience.iter().any(|a| a == caller) {
                return Err(AuthError::invalid_request("wrong audience"));
            }
        }

        let claim_filters = old.claim_filters.merge(&filters);
        let user_info = self
            .live_user_info(&old, caller, &effective_scopes, &claim_filters)
            .await?;

        let mut audience: Vec<String> = Vec::new();
        // Only an ID token falls back to the caller as its audience
        let requested_audience = if request.audience.is_empty()
            && issued == IssuedTokenType::ExchangedIdToken
        {
            std::slice::from_ref(&client.client.client_id)
        } else {
            request.audience.as_slice()
        };
        for value in requested_audience.iter().chain(&request.resource) {
            if !audience.contains(value) {
                audience.push(value.clone());
            }
        }

        let record = TokenRecord {
            issuer: self.config.issuer.clone(),
            client_id: caller.to_string(),
            client_type: client.client.client_type,
            requested_scopes: if names.is_empty() {
                old.requested_scopes.clone()
            } else {
                names
            },
            effective_scopes,
            audience,
            claim_filters,
            user_info,
            ..old
        };

        tracing::info!(
            client_id = %caller,
            subject = %record.subject,
            issued = ?issued,
            "Token exchanged"
        );

        let mut outcome = GrantOutcome::access_token(record);
        outcome.issued = issued;
        Ok(outcome)
    }
}

/// Maps each requested scope onto a previously granted one: an exact name
/// match, or a full match of a granted pattern scope. The result records the
/// concrete requested strings.
fn concretize(
    granted: &[EffectiveScope],
    requested: &[String],
) -> AuthResult<Vec<EffectiveScope>> {
    let mut result: Vec<EffectiveScope> = Vec::new();
    for name in requested {
        if result.iter().any(|s| &s.name == name) {
            continue;
        }
        let source = granted
            .iter()
            .find(|s| !s.pattern && &s.name == name)
            .or_else(|| {
                granted
                    .iter()
                    .find(|s| s.pattern && is_subset_of_pattern(name, &s.name))
            })
            .ok_or_else(|| {
                AuthError::invalid_scope(format!("Scope '{name}' exceeds the subject token"))
            })?;
        result.push(EffectiveScope {
            name: name.clone(),
            definition: source.definition.clone(),
            attributes: source.attributes.clone(),
            pattern: false,
        });
    }
    Ok(result)
}
