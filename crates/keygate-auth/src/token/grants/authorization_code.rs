//! `authorization_code` grant.

use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::client_auth::AuthenticatedClient;
use crate::oauth::pkce::check_verifier;
use crate::oauth::token::TokenRequest;
use crate::token::service::{GrantOutcome, TokenService};
use crate::types::hash_token;

impl TokenService {
    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant` if:
    /// - The code is unknown, already used, or expired
    /// - The code was issued to another client
    /// - `redirect_uri` does not repeat the one of the authorization request
    /// - PKCE verification fails
    ///
    /// # Security
    ///
    /// - Codes are consumed atomically before any other check, so a failed
    ///   attempt also burns the code
    /// - Codes and verifiers are never logged
    pub(crate) async fn exchange_code(
        &self,
        request: &TokenRequest,
        client: &AuthenticatedClient,
        now: OffsetDateTime,
    ) -> AuthResult<GrantOutcome> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("Missing code parameter"))?;

        let stored = self
            .tokens
            .consume_authorization_code(&hash_token(code))
            .await?
            .ok_or_else(|| AuthError::invalid_grant("Invalid or already used authorization code"))?;

        if stored.is_expired_at(now) {
            return Err(AuthError::invalid_grant("Authorization code expired"));
        }

        if stored.record.client_id != client.client.client_id {
            tracing::warn!(
                client_id = %client.client.client_id,
                code_client_id = %stored.record.client_id,
                "Authorization code presented by another client"
            );
            return Err(AuthError::invalid_grant(
                "Authorization code was issued to another client",
            ));
        }

        match request.redirect_uri.as_deref() {
            None if stored.redirect_uri_supplied => {
                return Err(AuthError::invalid_grant("Missing redirect_uri parameter"));
            }
            Some(uri) if uri != stored.redirect_uri => {
                return Err(AuthError::invalid_grant("redirect_uri mismatch"));
            }
            _ => {}
        }

        check_verifier(stored.pkce.as_ref(), request.code_verifier.as_deref())
            .map_err(|e| AuthError::invalid_grant(e.to_string()))?;

        let record = stored.record;
        let mut outcome = GrantOutcome::access_token(record);
        outcome.id_token = outcome.record.is_openid();

        if self.should_issue_refresh(&outcome.record) {
            let (value, family_id) = self.mint_refresh_family(&outcome.record, now).await?;
            outcome.refresh_token = Some(value);
            outcome.family_id = Some(family_id);
        }

        tracing::debug!(
            client_id = %outcome.record.client_id,
            refresh = outcome.refresh_token.is_some(),
            "Authorization code exchanged"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use crate::config::{RefreshIssuePolicy, RefreshRotation};
    use crate::oauth::pkce::{PkceChallenge, PkceChallengeMethod, PkceVerifier};
    use crate::oauth::token::{GRANT_AUTHORIZATION_CODE, TokenRequest};
    use crate::storage::TokenRepository;
    use crate::testing::TestHarness;
    use crate::token::jwt::IdTokenClaims;
    use crate::types::token::tests::sample_record;
    use crate::types::{AuthorizationCodeRecord, ClientType, hash_token};
    use time::OffsetDateTime;

    const REDIRECT: &str = "https://app.example.com/cb";

    async fn store_code(
        harness: &TestHarness,
        code: &str,
        pkce: Option<PkceChallenge>,
        now: OffsetDateTime,
    ) {
        let mut record = sample_record();
        record.nonce = Some("nonce-1".to_string());
        harness
            .tokens
            .store_authorization_code(&AuthorizationCodeRecord {
                code_hash: hash_token(code),
                record,
                redirect_uri: REDIRECT.to_string(),
                redirect_uri_supplied: true,
                pkce,
                created_at: now,
                expires_at: now + Duration::minutes(10),
            })
            .await
            .unwrap();
    }

    fn code_request(code: &str, verifier: Option<&str>) -> TokenRequest {
        TokenRequest {
            grant_type: GRANT_AUTHORIZATION_CODE.to_string(),
            code: Some(code.to_string()),
            redirect_uri: Some(REDIRECT.to_string()),
            code_verifier: verifier.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let harness = TestHarness::new();
        let now = OffsetDateTime::now_utc();
        store_code(&harness, "code-1", None, now).await;

        let response = harness
            .service
            .handle(
                &code_request("code-1", None),
                &harness.confidential_client(),
                false,
                now,
            )
            .await
            .unwrap();

        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.scope, "openid profile");
        assert_eq!(response.expires_in, 3600);
        // default policy needs offline_access
        assert!(response.refresh_token.is_none());

        let id_token = response.id_token.unwrap();
        let claims = harness
            .jwt
            .decode::<IdTokenClaims>(&id_token)
            .unwrap()
            .claims;
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.nonce.as_deref(), Some("nonce-1"));

        let stored = harness
            .tokens
            .find_access_token(&hash_token(&response.access_token))
            .await
            .unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let harness = TestHarness::new();
        let now = OffsetDateTime::now_utc();
        store_code(&harness, "code-1", None, now).await;
        let client = harness.confidential_client();

        tokio_test::assert_ok!(
            harness
                .service
                .handle(&code_request("code-1", None), &client, false, now)
                .await
        );
        let err = harness
            .service
            .handle(&code_request("code-1", None), &client, false, now)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let harness = TestHarness::new();
        let now = OffsetDateTime::now_utc();
        store_code(&harness, "code-1", None, now).await;

        let err = harness
            .service
            .handle(
                &code_request("code-1", None),
                &harness.confidential_client(),
                false,
                now + Duration::minutes(11),
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_client_mismatch_rejected() {
        let harness = TestHarness::new();
        let now = OffsetDateTime::now_utc();
        store_code(&harness, "code-1", None, now).await;

        let err = harness
            .service
            .handle(
                &code_request("code-1", None),
                &harness.public_client(),
                false,
                now,
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_redirect_uri_must_be_repeated() {
        let harness = TestHarness::new();
        let now = OffsetDateTime::now_utc();
        let client = harness.confidential_client();

        store_code(&harness, "code-1", None, now).await;
        let mut request = code_request("code-1", None);
        request.redirect_uri = None;
        tokio_test::assert_err!(harness.service.handle(&request, &client, false, now).await);

        store_code(&harness, "code-2", None, now).await;
        let mut request = code_request("code-2", None);
        request.redirect_uri = Some(format!("{REDIRECT}/"));
        tokio_test::assert_err!(harness.service.handle(&request, &client, false, now).await);
    }

    #[tokio::test]
    async fn test_pkce_round_trip() {
        let harness = TestHarness::new();
        let now = OffsetDateTime::now_utc();
        let client = harness.confidential_client();
        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);

        store_code(&harness, "code-1", Some(challenge.clone()), now).await;
        let wrong = PkceVerifier::generate();
        let err = harness
            .service
            .handle(&code_request("code-1", Some(wrong.as_str())), &client, false, now)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");

        store_code(&harness, "code-2", Some(challenge.clone()), now).await;
        let err = harness
            .service
            .handle(&code_request("code-2", None), &client, false, now)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");

        store_code(&harness, "code-3", Some(challenge), now).await;
        tokio_test::assert_ok!(
            harness
                .service
                .handle(&code_request("code-3", Some(verifier.as_str())), &client, false, now)
                .await
        );
    }

    #[tokio::test]
    async fn test_plain_pkce_and_unexpected_verifier() {
        let harness = TestHarness::new();
        let now = OffsetDateTime::now_utc();
        let client = harness.confidential_client();
        let verifier = "a".repeat(43);

        let plain = PkceChallenge::new(verifier.clone(), PkceChallengeMethod::Plain).unwrap();
        store_code(&harness, "code-1", Some(plain), now).await;
        tokio_test::assert_ok!(
            harness
                .service
                .handle(&code_request("code-1", Some(&verifier)), &client, false, now)
                .await
        );

        store_code(&harness, "code-2", None, now).await;
        let err = harness
            .service
            .handle(&code_request("code-2", Some(&verifier)), &client, false, now)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_refresh_token_issued_by_policy() {
        let mut harness = TestHarness::new();
        harness.set_config(|c| c.refresh.issue_policy = RefreshIssuePolicy::Always);
        let now = OffsetDateTime::now_utc();
        store_code(&harness, "code-1", None, now).await;

        let response = harness
            .service
            .handle(
                &code_request("code-1", None),
                &harness.confidential_client(),
                false,
                now,
            )
            .await
            .unwrap();
        let refresh = response.refresh_token.unwrap();
        let stored = harness
            .tokens
            .find_refresh_token(&hash_token(&refresh))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.family_id, stored.id);

        let access = harness
            .tokens
            .find_access_token(&hash_token(&response.access_token))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(access.family_id, Some(stored.family_id));
    }

    #[tokio::test]
    async fn test_public_client_without_rotation_gets_no_refresh() {
        let mut harness = TestHarness::new();
        harness.set_config(|c| {
            c.refresh.issue_policy = RefreshIssuePolicy::Always;
            c.refresh.rotation = RefreshRotation::Never;
        });
        let now = OffsetDateTime::now_utc();
        let mut record = sample_record();
        record.client_id = "public".to_string();
        record.client_type = ClientType::Public;
        harness
            .tokens
            .store_authorization_code(&AuthorizationCodeRecord {
                code_hash: hash_token("code-1"),
                record,
                redirect_uri: REDIRECT.to_string(),
                redirect_uri_supplied: false,
                pkce: None,
                created_at: now,
                expires_at: now + Duration::minutes(10),
            })
            .await
            .unwrap();

        let mut request = code_request("code-1", None);
        request.redirect_uri = None;
        let response = harness
            .service
            .handle(&request, &harness.public_client(), false, now)
            .await
            .unwrap();
        assert!(response.refresh_token.is_none());
    }
}
