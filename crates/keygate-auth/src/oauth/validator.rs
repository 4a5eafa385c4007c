//! Authorization request validation.
//!
//! Turns raw authorization parameters and the resolved client record into an
//! [`AuthorizationContext`]. Checks run in a fixed order; the first violation
//! ends validation. Failures detected before the redirect URI is trusted are
//! reported without a redirect target and must be rendered locally.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::claims::split_claim_filters;
use crate::config::AuthConfig;
use crate::error::AuthorizationRejection;
use crate::oauth::authorize::{
    AuthorizationRequest, RedirectTarget, ResponseMode, ResponseTypes, essential_acr_values,
};
use crate::oauth::context::{AuthorizationContext, ContextHandle, Prompt};
use crate::oauth::pkce::{PkceChallenge, PkceChallengeMethod};
use crate::oauth::redirect::resolve_redirect_uri;
use crate::scope::{OFFLINE_ACCESS_SCOPE, OPENID_SCOPE, ScopeRegistry, parse_scope_param};
use crate::types::{ClaimsInTokens, Client, GrantFlow};

/// A rejected authorization request and, when already resolved, where to
/// deliver the error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRequest {
    pub rejection: AuthorizationRejection,
    pub redirect: Option<RedirectTarget>,
}

impl RejectedRequest {
    fn local(rejection: AuthorizationRejection) -> Self {
        Self {
            rejection,
            redirect: None,
        }
    }
}

/// Validates authorization requests against the client registration, the
/// scope registry and the deployment configuration.
#[derive(Debug, Clone)]
pub struct AuthorizationRequestValidator {
    config: Arc<AuthConfig>,
    scopes: Arc<ScopeRegistry>,
}

impl AuthorizationRequestValidator {
    pub fn new(config: Arc<AuthConfig>, scopes: Arc<ScopeRegistry>) -> Self {
        Self { config, scopes }
    }

    /// Validates `request` for `client` (as resolved from `client_id`).
    pub fn validate(
        &self,
        request: &AuthorizationRequest,
        client: Option<&Client>,
        now: OffsetDateTime,
    ) -> Result<AuthorizationContext, RejectedRequest> {
        // Client
        let client = match (request.client_id.as_deref(), client) {
            (None, _) => {
                return Err(RejectedRequest::local(
                    AuthorizationRejection::client_resolution("client_id is required"),
                ));
            }
            (Some(id), None) => {
                tracing::warn!(client_id = %id, "Authorization request for unknown client");
                return Err(RejectedRequest::local(
                    AuthorizationRejection::client_resolution("unknown client"),
                ));
            }
            (Some(_), Some(client)) if !client.active => {
                return Err(RejectedRequest::local(
                    AuthorizationRejection::client_resolution("client is disabled"),
                ));
            }
            (Some(_), Some(client)) if client.redirect_uris.is_empty() => {
                return Err(RejectedRequest::local(
                    AuthorizationRejection::client_resolution(
                        "client has no registered redirect URI",
                    ),
                ));
            }
            (Some(_), Some(client)) => client,
        };

        // Redirect URI; from here on errors are redirected
        let redirect_uri = resolve_redirect_uri(
            client,
            request.redirect_uri.as_deref(),
            self.config.authorize.allow_wildcard_redirects,
        )
        .map_err(RejectedRequest::local)?;

        let parsed_types = request
            .response_type
            .as_deref()
            .map(ResponseTypes::parse)
            .transpose();
        let implied_mode = match &parsed_types {
            Ok(Some(types)) => ResponseMode::implied_by(types),
            _ => ResponseMode::Query,
        };
        let mut target = RedirectTarget {
            redirect_uri,
            mode: implied_mode,
            state: request.state.clone(),
        };
        let reject = |target: &RedirectTarget, rejection: AuthorizationRejection| {
            tracing::debug!(
                client_id = %client.client_id,
                error = rejection.oauth_error_code(),
                "Rejecting authorization request"
            );
            RejectedRequest {
                rejection,
                redirect: Some(target.clone()),
            }
        };

        if let Some(mode) = request.response_mode.as_deref() {
            match ResponseMode::parse(mode) {
                Some(mode) => target.mode = mode,
                None => {
                    return Err(reject(
                        &target,
                        AuthorizationRejection::invalid_request(format!(
                            "unsupported response_mode '{mode}'"
                        )),
                    ));
                }
            }
        }

        // Response type and flow
        let response_types = match parsed_types {
            Ok(Some(types)) if !types.is_empty() => types,
            Ok(_) => {
                return Err(reject(
                    &target,
                    AuthorizationRejection::invalid_request("response_type is required"),
                ));
            }
            Err(unknown) => {
                return Err(reject(
                    &target,
                    AuthorizationRejection::unsupported_response_type(format!(
                        "unknown response type '{unknown}'"
                    )),
                ));
            }
        };
        if target.mode == ResponseMode::Query && !response_types.is_code_only() {
            return Err(reject(
                &target,
                AuthorizationRejection::invalid_request(
                    "tokens cannot be returned with response_mode=query",
                ),
            ));
        }

        let raw_scopes = parse_scope_param(request.scope.as_deref());
        let openid = raw_scopes.iter().any(|s| s == OPENID_SCOPE);
        if openid && response_types.is_token_only() {
            return Err(reject(
                &target,
                AuthorizationRejection::invalid_request(
                    "response_type=token is not allowed for OpenID Connect requests",
                ),
            ));
        }
        if !openid && response_types.id_token {
            return Err(reject(
                &target,
                AuthorizationRejection::invalid_request(
                    "id_token requires the openid scope",
                ),
            ));
        }

        let flow = if response_types.is_code_only() {
            GrantFlow::AuthorizationCode
        } else if response_types.code {
            if !openid {
                return Err(reject(
                    &target,
                    AuthorizationRejection::invalid_request(
                        "the hybrid flow requires the openid scope",
                    ),
                ));
            }
            GrantFlow::Hybrid
        } else {
            GrantFlow::Implicit
        };
        if !client.is_flow_allowed(flow) {
            return Err(reject(
                &target,
                AuthorizationRejection::unauthorized_client(format!(
                    "the {flow} flow is not allowed for this client"
                )),
            ));
        }

        let prompt = Prompt::parse(request.prompt.as_deref())
            .map_err(|msg| reject(&target, AuthorizationRejection::invalid_request(msg)))?;

        // Scopes
        let (scope_names, claim_filters) = split_claim_filters(&raw_scopes);
        let mut effective_scopes: Vec<_> = self
            .scopes
            .resolve_all(&scope_names)
            .into_iter()
            .filter(|s| client.is_scope_allowed(&s.definition))
            .filter(|s| s.name != OFFLINE_ACCESS_SCOPE || prompt.consent)
            .collect();
        if !self.config.authorize.openid_enabled {
            effective_scopes.retain(|s| s.name != OPENID_SCOPE);
        }
        if openid && !effective_scopes.iter().any(|s| s.name == OPENID_SCOPE) {
            return Err(reject(
                &target,
                AuthorizationRejection::scope("the openid scope is not available"),
            ));
        }

        let mut additional_audience = Vec::new();
        for resource in &request.resource {
            if url::Url::parse(resource).is_err() {
                return Err(reject(
                    &target,
                    AuthorizationRejection::invalid_request(format!(
                        "resource '{resource}' is not an absolute URI"
                    )),
                ));
            }
            if !additional_audience.contains(resource) {
                additional_audience.push(resource.clone());
            }
        }

        let claims_in_tokens = self
            .parse_claims_in_tokens(request.claims_in_tokens.as_deref())
            .map_err(|msg| reject(&target, AuthorizationRejection::invalid_request(msg)))?;

        // PKCE
        let pkce = match request.code_challenge.clone() {
            Some(challenge) => {
                let method = match request.code_challenge_method.as_deref() {
                    Some(method) => PkceChallengeMethod::parse(method),
                    None => Ok(PkceChallengeMethod::default()),
                };
                let challenge = method
                    .and_then(|method| PkceChallenge::new(challenge, method))
                    .map_err(|e| reject(&target, AuthorizationRejection::pkce(e.to_string())))?;
                Some(challenge)
            }
            None if client.is_public() && flow == GrantFlow::AuthorizationCode => {
                return Err(reject(
                    &target,
                    AuthorizationRejection::pkce("code_challenge is required for public clients"),
                ));
            }
            None => None,
        };

        if openid && response_types.id_token && request.nonce.is_none() {
            return Err(reject(
                &target,
                AuthorizationRejection::invalid_request(
                    "nonce is required when an id_token is returned from the authorization endpoint",
                ),
            ));
        }

        // ACR
        let essential_acr = match request.claims.as_deref() {
            Some(claims) => essential_acr_values(claims).map_err(|_| {
                reject(
                    &target,
                    AuthorizationRejection::invalid_request("malformed claims parameter"),
                )
            })?,
            None => Vec::new(),
        };
        let acr_values = parse_scope_param(request.acr_values.as_deref());

        let context = AuthorizationContext {
            handle: ContextHandle::generate(),
            response_types,
            flow,
            openid,
            client_id: client.client_id.clone(),
            client_type: client.client_type,
            client_name: client.name.clone(),
            client_logo: client.logo.clone(),
            redirect: target,
            redirect_uri_supplied: request.redirect_uri.is_some(),
            requested_scopes: raw_scopes,
            effective_scopes,
            claim_filters,
            additional_audience,
            pkce,
            nonce: request.nonce.clone(),
            prompt,
            essential_acr,
            acr_values,
            claims_in_tokens,
            users_group: client
                .target_group
                .clone()
                .unwrap_or_else(|| self.config.authorize.users_group.clone()),
            translation_profile: self.config.authorize.translation_profile.clone(),
            created_at: now,
            expires_at: now + self.config.authorize.context_timeout,
        };

        tracing::debug!(
            client_id = %context.client_id,
            flow = %context.flow,
            scopes = context.effective_scopes.len(),
            "Authorization request accepted"
        );
        Ok(context)
    }

    fn parse_claims_in_tokens(&self, value: Option<&str>) -> Result<ClaimsInTokens, String> {
        let mut parsed = ClaimsInTokens::default();
        for member in value.unwrap_or_default().split_whitespace() {
            match member {
                "token" => {
                    if !self.config.tokens.access_token_format.supports_jwt() {
                        return Err(
                            "claims_in_tokens=token requires JWT access tokens".to_string()
                        );
                    }
                    parsed.token = true;
                }
                "id_token" => {
                    if !self.config.authorize.openid_enabled {
                        return Err(
                            "claims_in_tokens=id_token requires OpenID Connect".to_string()
                        );
                    }
                    parsed.id_token = true;
                }
                other => return Err(format!("unknown claims_in_tokens value '{other}'")),
            }
        }
        Ok(parsed)
    }
}
