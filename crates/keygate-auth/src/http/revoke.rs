//! Token revocation endpoint (RFC 7009).
//!
//! A caller presenting a secret is authenticated first. Without a secret
//! the `client_id` parameter identifies the caller; the revocation service
//! decides whether that is enough for the token at hand.

use axum::{
    Form,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::{AuthState, extract_credentials, oauth_error_response};
use crate::oauth::client_auth::authenticate_client;
use crate::token::revocation::{RevocationCaller, RevocationRequest};

/// Form body of a revocation request.
#[derive(Debug, Deserialize)]
pub struct RevocationForm {
    pub token: String,

    #[serde(default)]
    pub token_type_hint: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Revocation endpoint handler.
///
/// Returns 200 with an empty body on success, including for unknown tokens.
pub async fn revoke_handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    Form(form): Form<RevocationForm>,
) -> Response {
    let credentials =
        match extract_credentials(&headers, form.client_id.clone(), form.client_secret.clone()) {
            Ok(credentials) => credentials,
            Err(err) => return oauth_error_response(&err),
        };

    let caller = if credentials.has_secret() {
        match authenticate_client(&credentials, state.clients.as_ref()).await {
            Ok(client) => RevocationCaller {
                client_id: Some(client.client.client_id),
                authenticated: true,
            },
            Err(err) => {
                tracing::debug!(error = %err, "Revocation: client authentication failed");
                return oauth_error_response(&err);
            }
        }
    } else {
        RevocationCaller {
            client_id: form.client_id,
            authenticated: false,
        }
    };

    let request = RevocationRequest {
        token: form.token,
        token_type_hint: form.token_type_hint,
    };
    match state.revocation.revoke(&request, &caller).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => oauth_error_response(&err),
    }
}
