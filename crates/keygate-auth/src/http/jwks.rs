//! JWKS endpoint HTTP handler.
//!
//! Publishes the public half of the signing key so that ID tokens and JWT
//! access tokens can be verified elsewhere.
//!
//! # References
//!
//! - [RFC 7517 - JSON Web Key](https://tools.ietf.org/html/rfc7517)

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use super::AuthState;

/// Handler for `GET /oauth2/jwks`.
///
/// The response may be cached for an hour.
pub async fn jwks_handler(State(state): State<AuthState>) -> impl IntoResponse {
    let jwks = state.jwt.jwks();
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Json(jwks),
    )
}
