//! Token endpoint types.
//!
//! This module provides types for the OAuth 2.0 token endpoint,
//! including request parsing, response generation, and error handling.
//!
//! # Supported Grant Types
//!
//! - `authorization_code` - Exchange authorization code for tokens
//! - `refresh_token` - Refresh an access token
//! - `urn:ietf:params:oauth:grant-type:token-exchange` - RFC 8693 exchange
//! - `client_credentials` - Machine-to-machine authentication

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
pub const GRANT_TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
pub const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";

pub const ACCESS_TOKEN_TYPE_URN: &str = "urn:ietf:params:oauth:token-type:access_token";
pub const ID_TOKEN_TYPE_URN: &str = "urn:ietf:params:oauth:token-type:id_token";

/// Token request parameters.
///
/// Different fields are required depending on the `grant_type`:
///
/// - `authorization_code`: code, redirect_uri, code_verifier
/// - `refresh_token`: refresh_token, (optional) scope
/// - token exchange: subject_token, subject_token_type, (optional)
///   requested_token_type, audience, resource, scope
/// - `client_credentials`: (optional) scope
///
/// Client credentials (`client_id`, `client_secret`) travel separately in
/// [`ClientCredentials`](crate::oauth::client_auth::ClientCredentials).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRequest {
    pub grant_type: String,

    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,

    pub client_id: Option<String>,
    pub client_secret: Option<String>,

    pub refresh_token: Option<String>,
    pub scope: Option<String>,

    pub subject_token: Option<String>,
    pub subject_token_type: Option<String>,
    pub actor_token: Option<String>,
    pub actor_token_type: Option<String>,
    pub requested_token_type: Option<String>,
    /// Repeatable.
    pub audience: Vec<String>,
    /// Repeatable.
    pub resource: Vec<String>,
}

impl TokenRequest {
    /// Builds a request from form pairs. Single-valued parameters keep their
    /// first occurrence; `audience` and `resource` collect every occurrence.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut request = Self::default();
        let mut grant_type = None;
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "grant_type" => &mut grant_type,
                "code" => &mut request.code,
                "redirect_uri" => &mut request.redirect_uri,
                "code_verifier" => &mut request.code_verifier,
                "client_id" => &mut request.client_id,
                "client_secret" => &mut request.client_secret,
                "refresh_token" => &mut request.refresh_token,
                "scope" => &mut request.scope,
                "subject_token" => &mut request.subject_token,
                "subject_token_type" => &mut request.subject_token_type,
                "actor_token" => &mut request.actor_token,
                "actor_token_type" => &mut request.actor_token_type,
                "requested_token_type" => &mut request.requested_token_type,
                "audience" => {
                    request.audience.push(value.into());
                    continue;
                }
                "resource" => {
                    request.resource.push(value.into());
                    continue;
                }
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        request.grant_type = grant_type.unwrap_or_default();
        request
    }
}

/// Successful token response.
///
/// # Example Response
///
/// ```json
/// {
///   "access_token": "eyJhbG...",
///   "token_type": "Bearer",
///   "expires_in": 3600,
///   "scope": "openid profile",
///   "refresh_token": "abc123..."
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    /// `Bearer`, or `N_A` for exchanged ID tokens.
    pub token_type: String,

    /// Lifetime in seconds.
    pub expires_in: u64,

    /// Granted scopes (space-separated).
    pub scope: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Token type URN of a token exchange result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_token_type: Option<String>,
}

impl TokenResponse {
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, scope: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            scope,
            refresh_token: None,
            id_token: None,
            issued_token_type: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }

    #[must_use]
    pub fn with_id_token(mut self, token: String) -> Self {
        self.id_token = Some(token);
        self
    }

    #[must_use]
    pub fn with_issued_token_type(mut self, token_type: &str) -> Self {
        self.issued_token_type = Some(token_type.to_string());
        self
    }
}

/// Token error response.
///
/// ```json
/// {
///   "error": "invalid_grant",
///   "error_description": "Authorization code expired"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenError {
    pub error: TokenErrorCode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenError {
    #[must_use]
    pub fn with_description(error: TokenErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
        }
    }
}

impl From<&AuthError> for TokenError {
    fn from(err: &AuthError) -> Self {
        let code = match err {
            AuthError::InvalidClient { .. } => TokenErrorCode::InvalidClient,
            AuthError::InvalidGrant { .. }
            | AuthError::TokenExpired
            | AuthError::TokenRevoked
            | AuthError::AccessDenied { .. } => TokenErrorCode::InvalidGrant,
            AuthError::InvalidScope { .. } => TokenErrorCode::InvalidScope,
            AuthError::UnauthorizedClient { .. } => TokenErrorCode::UnauthorizedClient,
            AuthError::UnsupportedGrantType { .. } => TokenErrorCode::UnsupportedGrantType,
            AuthError::InvalidRequest { .. }
            | AuthError::UnsupportedResponseType { .. }
            | AuthError::UnsupportedTokenType { .. }
            | AuthError::ConsentRequired { .. } => TokenErrorCode::InvalidRequest,
            AuthError::Storage { .. }
            | AuthError::Configuration { .. }
            | AuthError::Internal { .. } => TokenErrorCode::ServerError,
        };
        // server-side details stay in the logs
        let description = if code == TokenErrorCode::ServerError {
            "internal server error".to_string()
        } else {
            err.to_string()
        };
        Self::with_description(code, description)
    }
}

/// OAuth 2.0 token error codes (RFC 6749 Section 5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenErrorCode {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnauthorizedClient,
    UnsupportedGrantType,
    InvalidScope,
    ServerError,
}

impl TokenErrorCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidScope => "invalid_scope",
            Self::ServerError => "server_error",
        }
    }

    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidClient => 401,
            Self::ServerError => 500,
            Self::InvalidRequest
            | Self::InvalidGrant
            | Self::UnauthorizedClient
            | Self::UnsupportedGrantType
            | Self::InvalidScope => 400,
        }
    }
}

impl fmt::Display for TokenErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs_authorization_code() {
        let request = TokenRequest::from_pairs([
            ("grant_type", "authorization_code"),
            ("code", "SplxlOBeZQQYbYS6WxSbIA"),
            ("redirect_uri", "https://app.example.com/callback"),
            ("code_verifier", "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            ("client_id", "my-app"),
            ("unknown", "ignored"),
        ]);
        assert_eq!(request.grant_type, "authorization_code");
        assert_eq!(request.code.as_deref(), Some("SplxlOBeZQQYbYS6WxSbIA"));
        assert_eq!(request.client_id.as_deref(), Some("my-app"));
        assert!(request.client_secret.is_none());
        assert!(request.refresh_token.is_none());
    }

    #[test]
    fn test_from_pairs_repeatable_parameters() {
        let request = TokenRequest::from_pairs([
            ("grant_type", GRANT_TOKEN_EXCHANGE),
            ("audience", "a"),
            ("audience", "b"),
            ("resource", "https://api.example.com"),
            ("scope", "first"),
            ("scope", "second"),
        ]);
        assert_eq!(request.audience, vec!["a", "b"]);
        assert_eq!(request.resource, vec!["https://api.example.com"]);
        assert_eq!(request.scope.as_deref(), Some("first"));
    }

    #[test]
    fn test_missing_grant_type_is_empty() {
        let request = TokenRequest::from_pairs(Vec::<(String, String)>::new());
        assert!(request.grant_type.is_empty());
    }

    #[test]
    fn test_token_response_serialization() {
        let response = TokenResponse::new("at".to_string(), 3600, "openid profile".to_string());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["expires_in"], 3600);
        assert!(json.get("refresh_token").is_none());
        assert!(json.get("id_token").is_none());
        assert!(json.get("issued_token_type").is_none());

        let json = serde_json::to_value(
            response
                .with_refresh_token("rt".to_string())
                .with_id_token("idt".to_string())
                .with_issued_token_type(ACCESS_TOKEN_TYPE_URN),
        )
        .unwrap();
        assert_eq!(json["refresh_token"], "rt");
        assert_eq!(json["id_token"], "idt");
        assert_eq!(json["issued_token_type"], ACCESS_TOKEN_TYPE_URN);
    }

    #[test]
    fn test_token_error_from_auth_error() {
        let error = TokenError::from(&AuthError::invalid_grant("Authorization code expired"));
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["error"], "invalid_grant");
        assert!(
            json["error_description"]
                .as_str()
                .unwrap()
                .contains("Authorization code expired")
        );

        assert_eq!(
            TokenError::from(&AuthError::invalid_client("x")).error,
            TokenErrorCode::InvalidClient
        );
        assert_eq!(
            TokenError::from(&AuthError::invalid_scope("x")).error,
            TokenErrorCode::InvalidScope
        );
        let server = TokenError::from(&AuthError::storage("connection reset"));
        assert_eq!(server.error, TokenErrorCode::ServerError);
        assert!(
            !server
                .error_description
                .unwrap()
                .contains("connection reset")
        );
    }

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(TokenErrorCode::InvalidRequest.http_status(), 400);
        assert_eq!(TokenErrorCode::InvalidClient.http_status(), 401);
        assert_eq!(TokenErrorCode::InvalidGrant.http_status(), 400);
        assert_eq!(TokenErrorCode::InvalidScope.http_status(), 400);
        assert_eq!(TokenErrorCode::ServerError.http_status(), 500);
        assert_eq!(TokenErrorCode::UnsupportedGrantType.to_string(), "unsupported_grant_type");
    }
}
