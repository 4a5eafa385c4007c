//! `refresh_token` grant with rotation and reuse detection.
//!
//! A refresh token that was already rotated is never deleted; it stays in
//! the repository in the `Used` state. Presenting it again is treated as
//! theft: the whole rotation family, and the access tokens minted with it,
//! is revoked and the request fails.

use time::OffsetDateTime;

use crate::AuthResult;
use crate::claims::split_claim_filters;
use crate::error::AuthError;
use crate::oauth::client_auth::AuthenticatedClient;
use crate::oauth::token::TokenRequest;
use crate::scope::{EffectiveScope, parse_scope_param};
use crate::storage::RotationOutcome;
use crate::token::service::{GrantOutcome, TokenService};
use crate::types::{
    RefreshTokenState, StoredRefreshToken, TokenRecord, generate_token, hash_token,
};

impl TokenService {
    /// Refreshes an access token.
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant` if the refresh token is unknown, expired,
    /// revoked, reused, or belongs to another client, and `invalid_scope` if
    /// the requested scopes are not a subset of the original ones.
    pub(crate) async fn refresh(
        &self,
        request: &TokenRequest,
        client: &AuthenticatedClient,
        now: OffsetDateTime,
    ) -> AuthResult<GrantOutcome> {
        let value = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("Missing refresh_token parameter"))?;
        let presented_hash = hash_token(value);
        let client_id = client.client.client_id.as_str();

        let stored = self
            .tokens
            .find_refresh_token(&presented_hash)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("Unknown refresh token"))?;

        if stored.record.client_id != client_id {
            tracing::warn!(
                client_id = %client_id,
                token_client_id = %stored.record.client_id,
                "Refresh token presented by another client"
            );
            return Err(AuthError::invalid_grant(
                "Refresh token was issued to another client",
            ));
        }

        match stored.state {
            RefreshTokenState::Revoked => {
                return Err(AuthError::invalid_grant("Refresh token revoked"));
            }
            RefreshTokenState::Used { .. } => {
                return Err(self.reuse_detected(&stored).await);
            }
            RefreshTokenState::Active if stored.is_expired_at(now) => {
                return Err(AuthError::invalid_grant("Refresh token expired"));
            }
            RefreshTokenState::Active => {}
        }

        let record = self.refreshed_record(&stored.record, request, client_id).await?;
        let id_token = record.is_openid();

        if !self.config.refresh.rotation.applies_to(client.client.is_public()) {
            let mut outcome = GrantOutcome::access_token(record);
            outcome.family_id = Some(stored.family_id);
            outcome.id_token = id_token;
            return Ok(outcome);
        }

        let new_value = generate_token();
        let replacement = stored.successor(
            hash_token(&new_value),
            record.clone(),
            now,
            self.refresh_expiry(now),
        );
        match self
            .tokens
            .rotate_refresh_token(&presented_hash, replacement)
            .await?
        {
            RotationOutcome::Rotated(new_token) => {
                tracing::info!(
                    client_id = %client_id,
                    family_id = %new_token.family_id,
                    "Refresh token rotated"
                );
                let mut outcome = GrantOutcome::access_token(record);
                outcome.refresh_token = Some(new_value);
                outcome.family_id = Some(new_token.family_id);
                outcome.id_token = id_token;
                Ok(outcome)
            }
            // lost a race against a concurrent rotation; the repository has
            // already revoked the family
            RotationOutcome::ReuseDetected { family_id, .. } => {
                tracing::warn!(
                    client_id = %client_id,
                    family_id = %family_id,
                    "Refresh token reuse detected, family revoked"
                );
                Err(AuthError::invalid_grant("Refresh token reuse detected"))
            }
            RotationOutcome::Revoked => Err(AuthError::invalid_grant("Refresh token revoked")),
            RotationOutcome::NotFound => Err(AuthError::invalid_grant("Unknown refresh token")),
        }
    }

    async fn reuse_detected(&self, stored: &StoredRefreshToken) -> AuthError {
        match self
            .tokens
            .revoke_refresh_family(stored.family_id, &stored.record.client_id)
            .await
        {
            Ok(revoked) => {
                tracing::warn!(
                    client_id = %stored.record.client_id,
                    family_id = %stored.family_id,
                    revoked,
                    "Refresh token reuse detected, family revoked"
                );
                AuthError::invalid_grant("Refresh token reuse detected")
            }
            Err(err) => {
                tracing::error!(
                    family_id = %stored.family_id,
                    error = %err,
                    "Failed to revoke refresh token family"
                );
                err
            }
        }
    }

    /// Builds the record of the refreshed grant: narrowed scopes, merged
    /// claim filters and freshly looked up claims, with authentication
    /// metadata carried over.
    async fn refreshed_record(
        &self,
        old: &TokenRecord,
        request: &TokenRequest,
        client_id: &str,
    ) -> AuthResult<TokenRecord> {
        let requested = parse_scope_param(request.scope.as_deref());
        let (names, filters) = split_claim_filters(&requested);

        let (requested_scopes, effective_scopes) = if names.is_empty() {
            (old.requested_scopes.clone(), old.effective_scopes.clone())
        } else {
            (names.clone(), narrow_exact(&old.effective_scopes, &names)?)
        };

        let claim_filters = old.claim_filters.merge(&filters);
        let user_info = self
            .live_user_info(old, client_id, &effective_scopes, &claim_filters)
            .await?;

        Ok(TokenRecord {
            requested_scopes,
            effective_scopes,
            claim_filters,
            user_info,
            nonce: None,
            ..old.clone()
        })
    }
}

/// Keeps the previously granted scopes named in `requested`. Every requested
/// name must have been granted exactly.
fn narrow_exact(
    granted: &[EffectiveScope],
    requested: &[String],
) -> AuthResult<Vec<EffectiveScope>> {
    if let Some(extra) = requested
        .iter()
        .find(|name| !granted.iter().any(|s| &s.name == *name))
    {
        return Err(AuthError::invalid_scope(format!(
            "Scope '{extra}' was not granted to the refresh token"
        )));
    }
    Ok(granted
        .iter()
        .filter(|s| requested.contains(&s.name))
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use time::{Duration, OffsetDateTime};
    use uuid::Uuid;

    use super::*;
    use crate::config::RefreshRotation;
    use crate::oauth::token::GRANT_REFRESH_TOKEN;
    use crate::storage::TokenRepository;
    use crate::testing::TestHarness;
    use crate::types::ClientType;
    use crate::types::token::tests::sample_record;

    async fn store_refresh(harness: &TestHarness, value: &str, record: TokenRecord) -> Uuid {
        let now = OffsetDateTime::now_utc();
        let token = StoredRefreshToken::new_family(
            hash_token(value),
            record,
            now,
            Some(now + Duration::days(1)),
        );
        harness.tokens.store_refresh_token(&token).await.unwrap();
        token.family_id
    }

    fn refresh_request(value: &str, scope: Option<&str>) -> TokenRequest {
        TokenRequest {
            grant_type: GRANT_REFRESH_TOKEN.to_string(),
            refresh_token: Some(value.to_string()),
            scope: scope.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_refresh_rotates_token() {
        let harness = TestHarness::new();
        let family = store_refresh(&harness, "r1", sample_record()).await;
        let now = OffsetDateTime::now_utc();

        let response = harness
            .service
            .handle(
                &refresh_request("r1", None),
                &harness.confidential_client(),
                false,
                now,
            )
            .await
            .unwrap();
        let r2 = response.refresh_token.unwrap();
        assert_ne!(r2, "r1");
        assert_eq!(response.scope, "openid profile");
        assert!(response.id_token.is_some());

        let old = harness
            .tokens
            .find_refresh_token(&hash_token("r1"))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(old.state, RefreshTokenState::Used { .. }));
        let new = harness
            .tokens
            .find_refresh_token(&hash_token(&r2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(new.family_id, family);
        assert!(new.is_active_at(now));
    }

    #[tokio::test]
    async fn test_reuse_revokes_family() {
        let harness = TestHarness::new();
        store_refresh(&harness, "r1", sample_record()).await;
        let client = harness.confidential_client();
        let now = OffsetDateTime::now_utc();

        let first = harness
            .service
            .handle(&refresh_request("r1", None), &client, false, now)
            .await
            .unwrap();
        let r2 = first.refresh_token.unwrap();

        let err = harness
            .service
            .handle(&refresh_request("r1", None), &client, false, now)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
        assert_eq!(err.http_status().as_u16(), 400);

        // the successor is unusable
        let err = harness
            .service
            .handle(&refresh_request(&r2, None), &client, false, now)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");

        // and so is the access token minted with it
        let access = harness
            .tokens
            .find_access_token(&hash_token(&first.access_token))
            .await
            .unwrap()
            .unwrap();
        assert!(access.revoked);
    }

    #[tokio::test]
    async fn test_scope_narrowing_exact_only() {
        let harness = TestHarness::new();
        let client = harness.confidential_client();
        let now = OffsetDateTime::now_utc();

        store_refresh(&harness, "r1", sample_record()).await;
        let response = harness
            .service
            .handle(&refresh_request("r1", Some("profile")), &client, false, now)
            .await
            .unwrap();
        assert_eq!(response.scope, "profile");
        assert!(response.id_token.is_none());

        store_refresh(&harness, "r2", sample_record()).await;
        let err = harness
            .service
            .handle(&refresh_request("r2", Some("profile email")), &client, false, now)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_scope");
    }

    #[tokio::test]
    async fn test_claims_recomputed_and_filtered() {
        let harness = TestHarness::new();
        harness
            .attributes
            .set("alice", &[("email", &["new@example.com", "old@example.com"])]);
        let mut record = sample_record();
        record.acr = Some("urn:acr:mfa".to_string());
        record.auth_time = Some(1_700_000_000);
        record.claim_filters.insert("email", "old@example.com");
        store_refresh(&harness, "r1", record).await;

        harness
            .service
            .handle(
                &refresh_request("r1", Some("openid profile")),
                &harness.confidential_client(),
                false,
                OffsetDateTime::now_utc(),
            )
            .await
            .unwrap();

        let stored = harness.tokens.refresh_tokens();
        let new = stored
            .iter()
            .find(|t| t.state == RefreshTokenState::Active)
            .unwrap();
        assert_eq!(
            new.record.user_info["email"],
            Value::String("old@example.com".into())
        );
        assert_eq!(new.record.acr.as_deref(), Some("urn:acr:mfa"));
        assert_eq!(new.record.auth_time, Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_newer_claim_filter_replaces_older() {
        let harness = TestHarness::new();
        harness
            .attributes
            .set("alice", &[("email", &["new@example.com", "old@example.com"])]);
        let mut record = sample_record();
        record.claim_filters.insert("email", "old@example.com");
        store_refresh(&harness, "r1", record).await;

        harness
            .service
            .handle(
                &refresh_request("r1", Some("profile claim_filter:email:new@example.com")),
                &harness.confidential_client(),
                false,
                OffsetDateTime::now_utc(),
            )
            .await
            .unwrap();

        let stored = harness.tokens.refresh_tokens();
        let new = stored
            .iter()
            .find(|t| t.state == RefreshTokenState::Active)
            .unwrap();
        assert_eq!(new.record.user_info["email"], "new@example.com");
        assert_eq!(new.record.scope_string(), "profile");
    }

    #[tokio::test]
    async fn test_wrong_client_expired_and_revoked() {
        let harness = TestHarness::new();
        let now = OffsetDateTime::now_utc();

        store_refresh(&harness, "r1", sample_record()).await;
        let err = harness
            .service
            .handle(&refresh_request("r1", None), &harness.public_client(), false, now)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");

        let err = harness
            .service
            .handle(
                &refresh_request("r1", None),
                &harness.confidential_client(),
                false,
                now + Duration::days(2),
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");

        let family = store_refresh(&harness, "r2", sample_record()).await;
        harness
            .tokens
            .revoke_refresh_family(family, "client")
            .await
            .unwrap();
        let err = harness
            .service
            .handle(
                &refresh_request("r2", None),
                &harness.confidential_client(),
                false,
                now,
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");

        tokio_test::assert_err!(
            harness
                .service
                .handle(
                    &refresh_request("unknown", None),
                    &harness.confidential_client(),
                    false,
                    now
                )
                .await
        );
    }

    #[tokio::test]
    async fn test_without_rotation_token_stays_valid() {
        let mut harness = TestHarness::new();
        harness.set_config(|c| c.refresh.rotation = RefreshRotation::PublicClients);
        store_refresh(&harness, "r1", sample_record()).await;
        let client = harness.confidential_client();
        let now = OffsetDateTime::now_utc();

        for _ in 0..2 {
            let response = harness
                .service
                .handle(&refresh_request("r1", None), &client, false, now)
                .await
                .unwrap();
            assert!(response.refresh_token.is_none());
        }
    }

    #[tokio::test]
    async fn test_access_denied_lookup_is_invalid_grant() {
        let harness = TestHarness::new();
        harness.attributes.deny("alice");
        store_refresh(&harness, "r1", sample_record()).await;

        let err = harness
            .service
            .handle(
                &refresh_request("r1", None),
                &harness.confidential_client(),
                false,
                OffsetDateTime::now_utc(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_public_client_rotation() {
        let mut harness = TestHarness::new();
        harness.set_config(|c| c.refresh.rotation = RefreshRotation::PublicClients);
        let mut record = sample_record();
        record.client_id = "public".to_string();
        record.client_type = ClientType::Public;
        store_refresh(&harness, "r1", record).await;

        let response = harness
            .service
            .handle(
                &refresh_request("r1", None),
                &harness.public_client(),
                false,
                OffsetDateTime::now_utc(),
            )
            .await
            .unwrap();
        assert!(response.refresh_token.is_some());
    }
}
