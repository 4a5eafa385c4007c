//! OAuth 2.0 Token endpoint handler.
//!
//! Supported grant types:
//!
//! - `authorization_code` - Exchange an authorization code for tokens
//! - `refresh_token` - Refresh an access token
//! - `urn:ietf:params:oauth:grant-type:token-exchange` - RFC 8693 exchange
//! - `client_credentials` - Machine-to-machine authentication
//!
//! # Example
//!
//! ```ignore
//! POST /oauth2/token
//! Content-Type: application/x-www-form-urlencoded
//! Authorization: Basic <base64(client_id:client_secret)>
//!
//! grant_type=authorization_code
//! &code=SplxlOBeZQQYbYS6WxSbIA
//! &redirect_uri=https://app.example.com/callback
//! &code_verifier=dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk
//! ```

use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::{AuthState, extract_credentials, no_store_headers, oauth_error_response};
use crate::oauth::client_auth::authenticate_client;
use crate::oauth::token::TokenRequest;
use crate::token::factory::JWT_ACCESS_TOKEN_MEDIA_TYPE;

/// OAuth 2.0 token endpoint handler.
///
/// Clients authenticate with HTTP Basic, with `client_id`/`client_secret`
/// in the body, or as public clients with `client_id` alone. An `Accept`
/// header naming `application/at+jwt` asks for a JWT access token.
pub async fn token_handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Response {
    let request = TokenRequest::from_pairs(params);
    debug!(
        grant_type = %request.grant_type,
        client_id = ?request.client_id,
        "Processing token request"
    );

    let credentials = match extract_credentials(
        &headers,
        request.client_id.clone(),
        request.client_secret.clone(),
    ) {
        Ok(credentials) => credentials,
        Err(err) => return oauth_error_response(&err),
    };

    let client = match authenticate_client(&credentials, state.clients.as_ref()).await {
        Ok(client) => client,
        Err(err) => {
            warn!(
                client_id = ?credentials.claimed_client_id(),
                error = %err,
                "Client authentication failed"
            );
            return oauth_error_response(&err);
        }
    };

    let jwt_requested = accepts_jwt(&headers);
    match state
        .tokens
        .handle(&request, &client, jwt_requested, OffsetDateTime::now_utc())
        .await
    {
        Ok(response) => (no_store_headers(), Json(response)).into_response(),
        Err(err) => oauth_error_response(&err),
    }
}

fn accepts_jwt(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|media| {
            media
                .split(';')
                .next()
                .is_some_and(|m| m.trim().eq_ignore_ascii_case(JWT_ACCESS_TOKEN_MEDIA_TYPE))
        })
}
