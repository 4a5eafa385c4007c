//! `client_credentials` grant.

use serde_json::Map;

use crate::AuthResult;
use crate::claims::ClaimFilters;
use crate::error::AuthError;
use crate::oauth::client_auth::AuthenticatedClient;
use crate::oauth::token::TokenRequest;
use crate::scope::parse_scope_param;
use crate::token::service::{GrantOutcome, TokenService};
use crate::types::{ClaimsInTokens, GrantFlow, TokenRecord};

impl TokenService {
    /// Issues a token to the client itself.
    ///
    /// Requested scopes are resolved through the registry and the client's
    /// allow list; unknown ones are dropped. No refresh token is issued.
    ///
    /// # Errors
    ///
    /// Returns `unauthorized_client` if the client may not use this grant.
    pub(crate) fn client_credentials(
        &self,
        request: &TokenRequest,
        client: &AuthenticatedClient,
    ) -> AuthResult<GrantOutcome> {
        if !client.is_authenticated() || !client.client.is_flow_allowed(GrantFlow::ClientCredentials)
        {
            return Err(AuthError::unauthorized_client(
                "Client is not allowed to use the client_credentials grant",
            ));
        }

        let requested = parse_scope_param(request.scope.as_deref());
        let effective_scopes = self
            .scopes
            .resolve_all(&requested)
            .into_iter()
            .filter(|s| client.client.is_scope_allowed(&s.definition))
            .collect();

        let client_id = client.client.client_id.clone();
        let record = TokenRecord {
            subject: client_id.clone(),
            issuer: self.config.issuer.clone(),
            client_id: client_id.clone(),
            client_type: client.client.client_type,
            requested_scopes: requested,
            effective_scopes,
            audience: vec![client_id],
            claim_filters: ClaimFilters::default(),
            user_info: Map::new(),
            acr: None,
            auth_time: None,
            claims_in_tokens: ClaimsInTokens::default(),
            nonce: None,
            group: None,
            translation_profile: None,
        };

        tracing::debug!(client_id = %record.client_id, "Client credentials grant");
        Ok(GrantOutcome::access_token(record))
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use crate::oauth::token::{GRANT_CLIENT_CREDENTIALS, TokenRequest};
    use crate::storage::TokenRepository;
    use crate::testing::TestHarness;
    use crate::types::hash_token;

    fn request(scope: Option<&str>) -> TokenRequest {
        TokenRequest {
            grant_type: GRANT_CLIENT_CREDENTIALS.to_string(),
            scope: scope.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_client_credentials_success() {
        let harness = TestHarness::new();
        let response = harness
            .service
            .handle(
                &request(Some("profile unknown")),
                &harness.service_client(),
                false,
                OffsetDateTime::now_utc(),
            )
            .await
            .unwrap();
        assert_eq!(response.scope, "profile");
        assert!(response.refresh_token.is_none());
        assert!(response.id_token.is_none());

        let stored = harness
            .tokens
            .find_access_token(&hash_token(&response.access_token))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.record.subject, "service");
        assert!(stored.record.user_info.is_empty());
    }

    #[tokio::test]
    async fn test_flow_must_be_allowed() {
        let harness = TestHarness::new();
        let err = harness
            .service
            .handle(
                &request(None),
                &harness.confidential_client(),
                false,
                OffsetDateTime::now_utc(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "unauthorized_client");
    }
}
