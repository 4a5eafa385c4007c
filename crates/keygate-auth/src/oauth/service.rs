//! Authorization endpoint service.
//!
//! Drives an authorization request through its lifecycle:
//!
//! 1. [`AuthorizationService::begin`] validates the request and stores an
//!    [`AuthorizationContext`] under a fresh handle.
//! 2. Once the user has authenticated, [`AuthorizationService::resume`] runs
//!    the consent decision. It either asks for the consent screen or finishes
//!    silently.
//! 3. [`AuthorizationService::finish`] consumes the context, resolves the
//!    user's attributes and produces the flow-specific redirect.
//!
//! Every failure after validation is returned as a [`RejectedRequest`] whose
//! redirect target is the context's resolved redirect URI.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::claims::{ACR_ATTRIBUTE, attributes_to_claims, filter_attributes};
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthorizationRejection};
use crate::oauth::acr::check_essential_acr;
use crate::oauth::authorize::{AuthorizationRequest, AuthorizationResponse};
use crate::oauth::consent::{
    ConsentAction, ConsentDecision, ConsentPreference, PendingObligations, decide,
};
use crate::oauth::context::{AuthorizationContext, ContextHandle};
use crate::oauth::validator::{AuthorizationRequestValidator, RejectedRequest};
use crate::scope::ScopeRegistry;
use crate::storage::{
    AttributeQuery, AuthorizationContextStore, ClientDirectory, ConsentPreferenceStorage,
    ObligationSource, TokenRepository, UserAttributeSource,
};
use crate::token::factory::AccessTokenFactory;
use crate::types::{AuthorizationCodeRecord, TokenRecord, generate_token, hash_token};

/// Collaborators of the authorization endpoint.
#[derive(Clone)]
pub struct AuthorizationStores {
    pub clients: Arc<dyn ClientDirectory>,
    pub contexts: Arc<dyn AuthorizationContextStore>,
    pub consents: Arc<dyn ConsentPreferenceStorage>,
    pub obligations: Arc<dyn ObligationSource>,
    pub attributes: Arc<dyn UserAttributeSource>,
    pub tokens: Arc<dyn TokenRepository>,
}

/// The authenticated end user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub subject: String,
    pub auth_time: OffsetDateTime,
}

/// The user's answer on the consent screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsentAnswer {
    pub accept: bool,
    /// Store the answer and skip the screen next time.
    pub remember: bool,
}

/// Result of resuming an authorization after authentication.
#[derive(Debug, Clone)]
pub enum ResumeOutcome {
    /// The consent screen must be shown for this context.
    ConsentRequired(Box<AuthorizationContext>),
    /// The request was answered silently; send the user agent here.
    Redirect(String),
}

/// Authorization endpoint service.
pub struct AuthorizationService {
    config: Arc<AuthConfig>,
    validator: AuthorizationRequestValidator,
    stores: AuthorizationStores,
    factory: Arc<AccessTokenFactory>,
}

impl AuthorizationService {
    #[must_use]
    pub fn new(
        config: Arc<AuthConfig>,
        scopes: Arc<ScopeRegistry>,
        stores: AuthorizationStores,
        factory: Arc<AccessTokenFactory>,
    ) -> Self {
        Self {
            validator: AuthorizationRequestValidator::new(config.clone(), scopes),
            config,
            stores,
            factory,
        }
    }

    /// Validates an authorization request and stores its context.
    ///
    /// # Errors
    ///
    /// Returns the validation failure, with a redirect target once the
    /// redirect URI has been resolved.
    pub async fn begin(
        &self,
        request: &AuthorizationRequest,
        now: OffsetDateTime,
    ) -> Result<AuthorizationContext, RejectedRequest> {
        let client = match request.client_id.as_deref() {
            Some(client_id) => self
                .stores
                .clients
                .find_by_client_id(client_id)
                .await
                .map_err(|err| local(server_rejection(&err)))?,
            None => None,
        };

        let context = self.validator.validate(request, client.as_ref(), now)?;
        self.stores
            .contexts
            .put(context.clone())
            .await
            .map_err(|err| local(server_rejection(&err)))?;
        Ok(context)
    }

    /// Returns the context for `handle` while it is still usable.
    ///
    /// An expired context is reported as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the context store fails.
    pub async fn pending(
        &self,
        handle: &ContextHandle,
        now: OffsetDateTime,
    ) -> Result<Option<AuthorizationContext>, AuthError> {
        Ok(self
            .stores
            .contexts
            .get(handle)
            .await?
            .filter(|c| !c.is_expired_at(now)))
    }

    /// Runs the consent decision for an authenticated user.
    ///
    /// # Errors
    ///
    /// Returns a local rejection if the context is unknown or expired, and a
    /// redirected one if `prompt=none` cannot be satisfied.
    pub async fn resume(
        &self,
        handle: &ContextHandle,
        user: &AuthenticatedUser,
        now: OffsetDateTime,
    ) -> Result<ResumeOutcome, RejectedRequest> {
        let context = self
            .pending(handle, now)
            .await
            .map_err(|err| local(server_rejection(&err)))?
            .ok_or_else(context_not_found)?;
        let redirect = |rejection| RejectedRequest {
            rejection,
            redirect: Some(context.redirect.clone()),
        };

        let preference = self
            .stores
            .consents
            .find(&user.subject, &context.client_id)
            .await
            .map_err(|err| redirect(server_rejection(&err)))?;
        let obligations = self
            .obligations(&context, &user.subject)
            .await
            .map_err(|err| redirect(server_rejection(&err)))?;
        let skip_consent = self.config.consent.skips_consent(&context.client_id);

        match decide(preference.as_ref(), &context, &obligations, skip_consent) {
            Ok(ConsentDecision::Interactive) => {
                tracing::debug!(client_id = %context.client_id, "Consent screen required");
                Ok(ResumeOutcome::ConsentRequired(Box::new(context)))
            }
            Ok(ConsentDecision::Silent(action)) => {
                tracing::debug!(
                    client_id = %context.client_id,
                    action = ?action,
                    "Consent answered without interaction"
                );
                let answer = ConsentAnswer {
                    accept: action == ConsentAction::Accept,
                    remember: false,
                };
                self.finish(handle, user, answer, now)
                    .await
                    .map(ResumeOutcome::Redirect)
            }
            Err(rejection) => {
                self.discard(handle).await;
                Err(redirect(rejection))
            }
        }
    }

    /// Consumes the context and produces the authorization response.
    ///
    /// # Errors
    ///
    /// Returns a local rejection if the context is unknown or expired;
    /// every other failure is redirected.
    pub async fn finish(
        &self,
        handle: &ContextHandle,
        user: &AuthenticatedUser,
        answer: ConsentAnswer,
        now: OffsetDateTime,
    ) -> Result<String, RejectedRequest> {
        let context = self
            .stores
            .contexts
            .take(handle)
            .await
            .map_err(|err| local(server_rejection(&err)))?
            .filter(|c| !c.is_expired_at(now))
            .ok_or_else(context_not_found)?;
        let redirect = |rejection| RejectedRequest {
            rejection,
            redirect: Some(context.redirect.clone()),
        };

        if answer.remember {
            let preference = ConsentPreference::remember(&context, answer.accept, now);
            self.stores
                .consents
                .save(&user.subject, &context.client_id, &preference)
                .await
                .map_err(|err| redirect(server_rejection(&err)))?;
        }

        if !answer.accept {
            tracing::info!(client_id = %context.client_id, "Authorization declined");
            return Err(redirect(AuthorizationRejection::access_denied(
                "the user declined the request",
            )));
        }

        let record = self.build_record(&context, user).await.map_err(redirect)?;
        let response = self
            .respond(&context, record, now)
            .await
            .map_err(|err| redirect(server_rejection(&err)))?;

        tracing::info!(
            client_id = %context.client_id,
            flow = %context.flow,
            "Authorization granted"
        );
        response
            .to_redirect_url(&context.redirect)
            .map_err(|err| local(AuthorizationRejection::server(err.to_string())))
    }

    async fn obligations(
        &self,
        context: &AuthorizationContext,
        subject: &str,
    ) -> Result<PendingObligations, AuthError> {
        Ok(PendingObligations {
            active_value_selection: self
                .config
                .consent
                .has_active_value_selection(&context.client_id),
            pending_enquiry: self.stores.obligations.has_pending_enquiry(subject).await?,
            unaccepted_policy: self
                .stores
                .obligations
                .has_unaccepted_policy(subject, &context.client_id)
                .await?,
        })
    }

    async fn build_record(
        &self,
        context: &AuthorizationContext,
        user: &AuthenticatedUser,
    ) -> Result<TokenRecord, AuthorizationRejection> {
        let attributes = self
            .stores
            .attributes
            .resolve(AttributeQuery {
                subject: &user.subject,
                client_id: &context.client_id,
                group: &context.users_group,
                translation_profile: context.translation_profile.as_deref(),
            })
            .await
            .map_err(|err| match err {
                AuthError::AccessDenied { message } => {
                    AuthorizationRejection::access_denied(message)
                }
                other => server_rejection(&other),
            })?;

        check_essential_acr(&context.essential_acr, &attributes)?;
        let acr = attributes
            .get(ACR_ATTRIBUTE)
            .and_then(|values| {
                context
                    .essential_acr
                    .iter()
                    .chain(&context.acr_values)
                    .find(|wanted| values.contains(wanted))
                    .or_else(|| values.first())
            })
            .cloned();

        let released = filter_attributes(
            &attributes,
            &context.effective_scopes,
            &context.claim_filters,
        );

        Ok(TokenRecord {
            subject: user.subject.clone(),
            issuer: self.config.issuer.clone(),
            client_id: context.client_id.clone(),
            client_type: context.client_type,
            requested_scopes: context.requested_scopes.clone(),
            effective_scopes: context.effective_scopes.clone(),
            audience: context.audience(),
            claim_filters: context.claim_filters.clone(),
            user_info: attributes_to_claims(&released),
            acr,
            auth_time: Some(user.auth_time.unix_timestamp()),
            claims_in_tokens: context.claims_in_tokens,
            nonce: context.nonce.clone(),
            group: Some(context.users_group.clone()),
            translation_profile: context.translation_profile.clone(),
        })
    }

    async fn respond(
        &self,
        context: &AuthorizationContext,
        record: TokenRecord,
        now: OffsetDateTime,
    ) -> Result<AuthorizationResponse, AuthError> {
        let types = context.response_types;
        let mut response = AuthorizationResponse::default();

        if types.code {
            let code = generate_token();
            self.stores
                .tokens
                .store_authorization_code(&AuthorizationCodeRecord {
                    code_hash: hash_token(&code),
                    record: record.clone(),
                    redirect_uri: context.redirect.redirect_uri.clone(),
                    redirect_uri_supplied: context.redirect_uri_supplied,
                    pkce: context.pkce.clone(),
                    created_at: now,
                    expires_at: now + self.config.authorize.code_lifetime,
                })
                .await?;
            response.code = Some(code);
        }

        if types.token {
            let access = self
                .factory
                .issue_access_token(&record, false, None, now)
                .await?;
            response.access_token = Some(access.value);
            response.token_type = Some("Bearer".to_string());
            response.expires_in = Some(access.expires_in);
            response.scope = Some(record.scope_string());
        }

        if types.id_token {
            // without an access token the ID token is the only carrier of claims
            let with_claims = types.is_id_token_only();
            response.id_token = Some(self.factory.issue_id_token(&record, with_claims, now)?);
        }

        Ok(response)
    }

    async fn discard(&self, handle: &ContextHandle) {
        if let Err(err) = self.stores.contexts.take(handle).await {
            tracing::error!(error = %err, "Failed to discard authorization context");
        }
    }
}

fn local(rejection: AuthorizationRejection) -> RejectedRequest {
    RejectedRequest {
        rejection,
        redirect: None,
    }
}

fn context_not_found() -> RejectedRequest {
    local(AuthorizationRejection::invalid_request(
        "unknown or expired authorization request",
    ))
}

fn server_rejection(err: &AuthError) -> AuthorizationRejection {
    tracing::error!(error = %err, "Authorization processing failed");
    AuthorizationRejection::server("internal server error")
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;
    use crate::oauth::pkce::{PkceChallenge, PkceVerifier};
    use crate::oauth::token::{GRANT_AUTHORIZATION_CODE, TokenRequest};
    use crate::testing::TestHarness;
    use crate::token::jwt::IdTokenClaims;
    use crate::types::ClientType;

    fn request(pairs: &[(&str, &str)]) -> AuthorizationRequest {
        AuthorizationRequest::from_pairs(pairs.iter().copied())
    }

    fn alice(now: OffsetDateTime) -> AuthenticatedUser {
        AuthenticatedUser {
            subject: "alice".to_string(),
            auth_time: now,
        }
    }

    fn accept() -> ConsentAnswer {
        ConsentAnswer {
            accept: true,
            remember: false,
        }
    }

    fn query_param(url: &str, name: &str) -> Option<String> {
        let url = url::Url::parse(url).unwrap();
        let pairs = match url.fragment() {
            Some(fragment) => url::form_urlencoded::parse(fragment.as_bytes())
                .into_owned()
                .collect::<Vec<_>>(),
            None => url.query_pairs().into_owned().collect(),
        };
        pairs.into_iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    #[tokio::test]
    async fn test_code_flow_end_to_end() {
        let harness = TestHarness::new();
        harness
            .attributes
            .set("alice", &[("email", &["alice@example.com"])]);
        let now = OffsetDateTime::now_utc();

        let context = harness
            .authorization
            .begin(
                &request(&[
                    ("response_type", "code"),
                    ("client_id", "client"),
                    ("scope", "openid profile"),
                    ("state", "xyz"),
                    ("nonce", "n1"),
                ]),
                now,
            )
            .await
            .unwrap();

        let outcome = harness
            .authorization
            .resume(&context.handle, &alice(now), now)
            .await
            .unwrap();
        assert!(matches!(outcome, ResumeOutcome::ConsentRequired(_)));

        let url = harness
            .authorization
            .finish(&context.handle, &alice(now), accept(), now)
            .await
            .unwrap();
        assert!(url.starts_with("https://app.example.com/cb?"));
        assert_eq!(query_param(&url, "state").as_deref(), Some("xyz"));
        let code = query_param(&url, "code").unwrap();

        let response = harness
            .service
            .handle(
                &TokenRequest {
                    grant_type: GRANT_AUTHORIZATION_CODE.to_string(),
                    code: Some(code),
                    ..Default::default()
                },
                &harness.confidential_client(),
                false,
                now,
            )
            .await
            .unwrap();
        let claims = harness
            .jwt
            .decode::<IdTokenClaims>(&response.id_token.unwrap())
            .unwrap()
            .claims;
        assert_eq!(claims.nonce.as_deref(), Some("n1"));
        assert_eq!(claims.auth_time, Some(now.unix_timestamp()));
    }

    #[tokio::test]
    async fn test_context_is_single_use() {
        let harness = TestHarness::new();
        let now = OffsetDateTime::now_utc();
        let context = harness
            .authorization
            .begin(
                &request(&[("response_type", "code"), ("client_id", "client")]),
                now,
            )
            .await
            .unwrap();

        tokio_test::assert_ok!(
            harness
                .authorization
                .finish(&context.handle, &alice(now), accept(), now)
                .await
        );
        let err = harness
            .authorization
            .finish(&context.handle, &alice(now), accept(), now)
            .await
            .unwrap_err();
        assert!(err.redirect.is_none());
    }

    #[tokio::test]
    async fn test_expired_context_treated_as_missing() {
        let harness = TestHarness::new();
        let now = OffsetDateTime::now_utc();
        let context = harness
            .authorization
            .begin(
                &request(&[("response_type", "code"), ("client_id", "client")]),
                now,
            )
            .await
            .unwrap();

        let later = now + Duration::seconds(901);
        assert!(
            harness
                .authorization
                .pending(&context.handle, later)
                .await
                .unwrap()
                .is_none()
        );
        let err = harness
            .authorization
            .finish(&context.handle, &alice(now), accept(), later)
            .await
            .unwrap_err();
        assert!(err.redirect.is_none());
    }

    #[tokio::test]
    async fn test_unknown_client_rendered_locally() {
        let harness = TestHarness::new();
        let err = harness
            .authorization
            .begin(
                &request(&[("response_type", "code"), ("client_id", "nobody")]),
                OffsetDateTime::now_utc(),
            )
            .await
            .unwrap_err();
        assert!(err.redirect.is_none());
        assert!(!err.rejection.is_redirectable());
    }

    #[tokio::test]
    async fn test_decline_redirects_access_denied() {
        let harness = TestHarness::new();
        let now = OffsetDateTime::now_utc();
        let context = harness
            .authorization
            .begin(
                &request(&[
                    ("response_type", "code"),
                    ("client_id", "client"),
                    ("state", "s"),
                ]),
                now,
            )
            .await
            .unwrap();

        let err = harness
            .authorization
            .finish(
                &context.handle,
                &alice(now),
                ConsentAnswer {
                    accept: false,
                    remember: true,
                },
                now,
            )
            .await
            .unwrap_err();
        assert_eq!(err.rejection.oauth_error_code(), "access_denied");
        let url = err.redirect.unwrap().error_url(&err.rejection).unwrap();
        assert_eq!(query_param(&url, "state").as_deref(), Some("s"));

        let stored = harness.consents.find("alice", "client").await.unwrap().unwrap();
        assert!(stored.do_not_ask);
        assert!(!stored.default_accept);
    }

    #[tokio::test]
    async fn test_remembered_consent_answers_silently() {
        let harness = TestHarness::new();
        let now = OffsetDateTime::now_utc();
        let begin = || async {
            harness
                .authorization
                .begin(
                    &request(&[
                        ("response_type", "code"),
                        ("client_id", "client"),
                        ("scope", "profile"),
                    ]),
                    now,
                )
                .await
                .unwrap()
        };

        let first = begin().await;
        harness
            .authorization
            .finish(
                &first.handle,
                &alice(now),
                ConsentAnswer {
                    accept: true,
                    remember: true,
                },
                now,
            )
            .await
            .unwrap();

        let second = begin().await;
        let outcome = harness
            .authorization
            .resume(&second.handle, &alice(now), now)
            .await
            .unwrap();
        let ResumeOutcome::Redirect(url) = outcome else {
            panic!("expected a silent answer");
        };
        assert!(query_param(&url, "code").is_some());
    }

    #[tokio::test]
    async fn test_public_client_remembered_consent_still_interactive() {
        let harness = TestHarness::new();
        let now = OffsetDateTime::now_utc();
        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);
        let context = harness
            .authorization
            .begin(
                &request(&[
                    ("response_type", "code"),
                    ("client_id", "public"),
                    ("code_challenge", challenge.as_str()),
                    ("code_challenge_method", "S256"),
                ]),
                now,
            )
            .await
            .unwrap();
        assert_eq!(context.client_type, ClientType::Public);
        harness
            .consents
            .save(
                "alice",
                "public",
                &ConsentPreference::remember(&context, true, now),
            )
            .await
            .unwrap();

        let outcome = harness
            .authorization
            .resume(&context.handle, &alice(now), now)
            .await
            .unwrap();
        assert!(matches!(outcome, ResumeOutcome::ConsentRequired(_)));
    }

    #[tokio::test]
    async fn test_prompt_none_with_pending_enquiry() {
        let harness = TestHarness::new();
        harness.obligations.add_enquiry("alice");
        let now = OffsetDateTime::now_utc();
        let context = harness
            .authorization
            .begin(
                &request(&[
                    ("response_type", "code"),
                    ("client_id", "client"),
                    ("prompt", "none"),
                ]),
                now,
            )
            .await
            .unwrap();

        let err = harness
            .authorization
            .resume(&context.handle, &alice(now), now)
            .await
            .unwrap_err();
        assert_eq!(err.rejection.oauth_error_code(), "interaction_required");
        assert!(err.redirect.is_some());
        // the context is gone after the error was delivered
        assert!(
            harness
                .authorization
                .pending(&context.handle, now)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_essential_acr_mismatch_redirects() {
        let harness = TestHarness::new();
        harness.attributes.set("alice", &[("acr", &["urn:acr:pwd"])]);
        let now = OffsetDateTime::now_utc();
        let claims = r#"{"id_token":{"acr":{"essential":true,"values":["urn:acr:mfa"]}}}"#;
        let context = harness
            .authorization
            .begin(
                &request(&[
                    ("response_type", "code"),
                    ("client_id", "client"),
                    ("scope", "openid"),
                    ("claims", claims),
                ]),
                now,
            )
            .await
            .unwrap();

        let err = harness
            .authorization
            .finish(&context.handle, &alice(now), accept(), now)
            .await
            .unwrap_err();
        assert_eq!(err.rejection.oauth_error_code(), "invalid_request");
        assert!(err.redirect.is_some());
    }

    #[tokio::test]
    async fn test_user_not_allowed_for_client() {
        let harness = TestHarness::new();
        harness.attributes.deny("alice");
        let now = OffsetDateTime::now_utc();
        let context = harness
            .authorization
            .begin(
                &request(&[("response_type", "code"), ("client_id", "client")]),
                now,
            )
            .await
            .unwrap();

        let err = harness
            .authorization
            .finish(&context.handle, &alice(now), accept(), now)
            .await
            .unwrap_err();
        assert_eq!(err.rejection.oauth_error_code(), "access_denied");
    }

    #[tokio::test]
    async fn test_implicit_id_token_only_embeds_claims() {
        let harness = TestHarness::new();
        harness
            .attributes
            .set("alice", &[("email", &["alice@example.com"])]);
        let now = OffsetDateTime::now_utc();
        let context = harness
            .authorization
            .begin(
                &request(&[
                    ("response_type", "id_token"),
                    ("client_id", "client"),
                    ("scope", "openid profile"),
                    ("nonce", "n"),
                ]),
                now,
            )
            .await
            .unwrap();

        let url = harness
            .authorization
            .finish(&context.handle, &alice(now), accept(), now)
            .await
            .unwrap();
        assert!(url.contains('#'));
        assert!(query_param(&url, "access_token").is_none());
        let id_token = query_param(&url, "id_token").unwrap();
        let claims = harness.jwt.decode::<IdTokenClaims>(&id_token).unwrap().claims;
        assert_eq!(claims.extra["email"], "alice@example.com");
    }

    #[tokio::test]
    async fn test_hybrid_flow_returns_code_and_token() {
        let harness = TestHarness::new();
        let now = OffsetDateTime::now_utc();
        let context = harness
            .authorization
            .begin(
                &request(&[
                    ("response_type", "code id_token token"),
                    ("client_id", "client"),
                    ("scope", "openid"),
                    ("nonce", "n"),
                ]),
                now,
            )
            .await
            .unwrap();

        let url = harness
            .authorization
            .finish(&context.handle, &alice(now), accept(), now)
            .await
            .unwrap();
        assert!(query_param(&url, "code").is_some());
        assert!(query_param(&url, "access_token").is_some());
        assert!(query_param(&url, "id_token").is_some());
        assert_eq!(query_param(&url, "token_type").as_deref(), Some("Bearer"));
    }
}
