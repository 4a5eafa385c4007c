//! Token introspection endpoint (RFC 7662).

use axum::{
    Form, Json,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::warn;

use super::{AuthState, extract_credentials, no_store_headers, oauth_error_response};
use crate::oauth::client_auth::authenticate_client;
use crate::token::introspection::IntrospectionRequest;

/// Form body of an introspection request.
#[derive(Debug, Deserialize)]
pub struct IntrospectionForm {
    pub token: String,
    #[serde(default)]
    pub token_type_hint: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Introspection endpoint handler. The caller must authenticate.
pub async fn introspect_handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    Form(form): Form<IntrospectionForm>,
) -> Response {
    let credentials = match extract_credentials(&headers, form.client_id, form.client_secret) {
        Ok(credentials) => credentials,
        Err(err) => return oauth_error_response(&err),
    };
    let caller = match authenticate_client(&credentials, state.clients.as_ref()).await {
        Ok(caller) => caller,
        Err(err) => {
            warn!(error = %err, "Introspection caller authentication failed");
            return oauth_error_response(&err);
        }
    };

    let request = IntrospectionRequest {
        token: form.token,
        token_type_hint: form.token_type_hint,
    };
    match state
        .introspection
        .introspect(&request, &caller, OffsetDateTime::now_utc())
        .await
    {
        Ok(response) => (no_store_headers(), Json(response)).into_response(),
        Err(err) => oauth_error_response(&err),
    }
}
