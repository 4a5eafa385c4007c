//! HTTP handlers for the OAuth 2.0 / OpenID Connect endpoints.
//!
//! # Available Handlers
//!
//! - [`authorize`] - Authorization endpoint and the consent decision
//! - [`token`] - Token endpoint
//! - [`introspect`] - Token introspection endpoint (RFC 7662)
//! - [`revoke`] - Token revocation endpoint (RFC 7009)
//! - [`jwks`] - Published signing keys
//!
//! [`router`] mounts all of them under `/oauth2`.

pub mod authorize;
pub mod introspect;
pub mod jwks;
pub mod pages;
pub mod revoke;
pub mod token;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::oauth::client_auth::{ClientCredentials, parse_basic_auth};
use crate::oauth::service::AuthorizationService;
use crate::oauth::token::TokenError;
use crate::storage::ClientDirectory;
use crate::token::introspection::IntrospectionService;
use crate::token::jwt::JwtService;
use crate::token::revocation::RevocationService;
use crate::token::service::TokenService;

pub use authorize::{authorize_handler, decision_handler, resume_handler};
pub use introspect::introspect_handler;
pub use jwks::jwks_handler;
pub use revoke::revoke_handler;
pub use token::token_handler;

/// Shared state of the OAuth endpoints.
#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<AuthConfig>,
    pub authorization: Arc<AuthorizationService>,
    pub tokens: Arc<TokenService>,
    pub introspection: Arc<IntrospectionService>,
    pub revocation: Arc<RevocationService>,
    pub clients: Arc<dyn ClientDirectory>,
    pub jwt: Arc<JwtService>,
}

/// Builds the OAuth router.
///
/// The interactive routes (`/oauth2/authorize/resume` and
/// `/oauth2/authorize/decision`) expect the deployment's authentication layer
/// to insert an [`AuthenticatedUser`](crate::oauth::AuthenticatedUser)
/// request extension.
pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/oauth2/authorize", get(authorize_handler))
        .route("/oauth2/authorize/resume", get(resume_handler))
        .route("/oauth2/authorize/decision", post(decision_handler))
        .route("/oauth2/token", post(token_handler))
        .route("/oauth2/introspect", post(introspect_handler))
        .route("/oauth2/revoke", post(revoke_handler))
        .route("/oauth2/jwks", get(jwks_handler))
        .with_state(state)
}

/// Collects client credentials from the `Authorization` header and the form.
///
/// A malformed `Authorization: Basic` header is an `invalid_client` error.
pub(crate) fn extract_credentials(
    headers: &HeaderMap,
    client_id: Option<String>,
    client_secret: Option<String>,
) -> Result<ClientCredentials, AuthError> {
    let basic = match headers.get(header::AUTHORIZATION) {
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| AuthError::invalid_client("Invalid Authorization header"))?;
            if value.starts_with("Basic ") {
                Some(parse_basic_auth(value).map_err(AuthError::invalid_client)?)
            } else {
                None
            }
        }
        None => None,
    };

    Ok(ClientCredentials {
        basic,
        client_id,
        client_secret,
    })
}

/// Renders an [`AuthError`] as an RFC 6749 JSON error response.
pub(crate) fn oauth_error_response(err: &AuthError) -> Response {
    let status = err.http_status();
    let mut response = (status, no_store_headers(), Json(TokenError::from(err))).into_response();
    if status.as_u16() == 401 {
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"oauth2\""),
        );
    }
    response
}

/// `Cache-Control: no-store` and `Pragma: no-cache`.
pub(crate) fn no_store_headers() -> [(header::HeaderName, &'static str); 2] {
    [
        (header::CACHE_CONTROL, "no-store"),
        (header::PRAGMA, "no-cache"),
    ]
}
