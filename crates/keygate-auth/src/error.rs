//! Authorization server error types.
//!
//! Two families of errors live here:
//!
//! - [`AuthError`] covers the back-channel (token, introspection and
//!   revocation endpoints) and every storage or signing failure. Each variant
//!   maps to an RFC 6749 error code and an HTTP status.
//! - [`AuthorizationRejection`] covers the front-channel authorization
//!   endpoint, where the decision that matters is whether the error may be
//!   delivered to the client through its redirect URI or must be rendered
//!   locally.

use std::fmt;

use axum::http::StatusCode;

/// Errors that can occur while serving OAuth 2.0 back-channel requests.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The client credentials are invalid or the client is not registered.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The authorization grant or refresh token is invalid, expired, used, or revoked.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The requested scope is outside the originally granted set.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of why the scope is invalid.
        message: String,
    },

    /// The request is missing a parameter or is otherwise malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The authenticated client is not allowed to use this grant.
    #[error("Unauthorized client: {message}")]
    UnauthorizedClient {
        /// Description of why the client is not authorized.
        message: String,
    },

    /// The resource owner or the translation profile denied the request.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of why access was denied.
        message: String,
    },

    /// Interaction is required but the request asked for none.
    #[error("Consent required: {message}")]
    ConsentRequired {
        /// Description of the pending interaction.
        message: String,
    },

    /// The presented token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The presented token has been revoked.
    #[error("Token revoked")]
    TokenRevoked,

    /// The grant type is not supported by this server.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// The response type is not supported by this server.
    #[error("Unsupported response type: {response_type}")]
    UnsupportedResponseType {
        /// The unsupported response type.
        response_type: String,
    },

    /// The token type is not supported for the requested operation.
    #[error("Unsupported token type: {token_type}")]
    UnsupportedTokenType {
        /// The unsupported token type.
        token_type: String,
    },

    /// An error occurred while storing or retrieving tokens or contexts.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The server configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `UnauthorizedClient` error.
    #[must_use]
    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::UnauthorizedClient {
            message: message.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a new `ConsentRequired` error.
    #[must_use]
    pub fn consent_required(message: impl Into<String>) -> Self {
        Self::ConsentRequired {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `UnsupportedResponseType` error.
    #[must_use]
    pub fn unsupported_response_type(response_type: impl Into<String>) -> Self {
        Self::UnsupportedResponseType {
            response_type: response_type.into(),
        }
    }

    /// Creates a new `UnsupportedTokenType` error.
    #[must_use]
    pub fn unsupported_token_type(token_type: impl Into<String>) -> Self {
        Self::UnsupportedTokenType {
            token_type: token_type.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns `true` if this error concerns a presented grant or token.
    #[must_use]
    pub fn is_grant_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidGrant { .. } | Self::TokenExpired | Self::TokenRevoked
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidClient { .. } | Self::UnauthorizedClient { .. } => {
                ErrorCategory::ClientAuthentication
            }
            Self::InvalidGrant { .. } | Self::TokenExpired | Self::TokenRevoked => {
                ErrorCategory::Grant
            }
            Self::InvalidScope { .. } => ErrorCategory::Scope,
            Self::InvalidRequest { .. }
            | Self::UnsupportedGrantType { .. }
            | Self::UnsupportedResponseType { .. }
            | Self::UnsupportedTokenType { .. } => ErrorCategory::RequestShape,
            Self::AccessDenied { .. } | Self::ConsentRequired { .. } => ErrorCategory::Consent,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::UnauthorizedClient { .. } => "unauthorized_client",
            Self::AccessDenied { .. } => "access_denied",
            Self::ConsentRequired { .. } => "consent_required",
            Self::TokenExpired | Self::TokenRevoked => "invalid_grant",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::UnsupportedResponseType { .. } => "unsupported_response_type",
            Self::UnsupportedTokenType { .. } => "unsupported_token_type",
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "server_error"
            }
        }
    }

    /// Returns the HTTP status used when this error is returned from a
    /// back-channel endpoint.
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::InvalidClient { .. } => StatusCode::UNAUTHORIZED,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Categories of errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Client authentication or authorization to use a grant.
    ClientAuthentication,
    /// Codes, refresh tokens and subject tokens.
    Grant,
    /// Scope narrowing and concretization.
    Scope,
    /// Malformed or unsupported request parameters.
    RequestShape,
    /// Consent and user decisions.
    Consent,
    /// Storage failures.
    Infrastructure,
    /// Configuration problems.
    Configuration,
    /// Anything else.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientAuthentication => write!(f, "client_authentication"),
            Self::Grant => write!(f, "grant"),
            Self::Scope => write!(f, "scope"),
            Self::RequestShape => write!(f, "request_shape"),
            Self::Consent => write!(f, "consent"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

// =============================================================================
// Authorization endpoint rejections
// =============================================================================

/// A failed authorization request.
///
/// `ClientResolution` and `RedirectUri` rejections happen before a redirect
/// target can be trusted and must be rendered locally. Every other kind is
/// delivered to the client's resolved redirect URI together with `state`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationRejection {
    /// The client is unknown, inactive, or has no usable registration.
    #[error("Client resolution failed: {message}")]
    ClientResolution {
        /// Description of the failure.
        message: String,
    },

    /// The requested redirect URI is not registered for the client.
    #[error("Redirect URI rejected: {message}")]
    RedirectUri {
        /// Description of the failure.
        message: String,
    },

    /// Response type, flow, prompt or parameter combination is invalid.
    #[error("Invalid request: {message}")]
    RequestShape {
        /// OAuth error code sent to the client.
        error: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// PKCE parameters are missing or malformed.
    #[error("PKCE error: {message}")]
    Pkce {
        /// Description of the failure.
        message: String,
    },

    /// Requested scopes cannot be satisfied.
    #[error("Invalid scope: {message}")]
    Scope {
        /// Description of the failure.
        message: String,
    },

    /// The authenticated result is inconsistent with the request (ACR).
    #[error("Inconsistent authentication: {message}")]
    Consistency {
        /// Description of the failure.
        message: String,
    },

    /// The user or a stored preference declined the request.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of the failure.
        message: String,
    },

    /// Interaction is required but `prompt=none` was requested.
    #[error("Interaction required: {message}")]
    InteractionRequired {
        /// OAuth error code sent to the client.
        error: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// Processing failed on the server side after the redirect was resolved.
    #[error("Server error: {message}")]
    Server {
        /// Description of the failure.
        message: String,
    },
}

impl AuthorizationRejection {
    /// Creates a new `ClientResolution` rejection.
    #[must_use]
    pub fn client_resolution(message: impl Into<String>) -> Self {
        Self::ClientResolution {
            message: message.into(),
        }
    }

    /// Creates a new `RedirectUri` rejection.
    #[must_use]
    pub fn redirect_uri(message: impl Into<String>) -> Self {
        Self::RedirectUri {
            message: message.into(),
        }
    }

    /// Creates a new `RequestShape` rejection reported as `invalid_request`.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::RequestShape {
            error: "invalid_request",
            message: message.into(),
        }
    }

    /// Creates a new `RequestShape` rejection reported as `unsupported_response_type`.
    #[must_use]
    pub fn unsupported_response_type(message: impl Into<String>) -> Self {
        Self::RequestShape {
            error: "unsupported_response_type",
            message: message.into(),
        }
    }

    /// Creates a new `RequestShape` rejection reported as `unauthorized_client`.
    #[must_use]
    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::RequestShape {
            error: "unauthorized_client",
            message: message.into(),
        }
    }

    /// Creates a new `Pkce` rejection.
    #[must_use]
    pub fn pkce(message: impl Into<String>) -> Self {
        Self::Pkce {
            message: message.into(),
        }
    }

    /// Creates a new `Scope` rejection.
    #[must_use]
    pub fn scope(message: impl Into<String>) -> Self {
        Self::Scope {
            message: message.into(),
        }
    }

    /// Creates a new `Consistency` rejection.
    #[must_use]
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Creates a new `AccessDenied` rejection.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a new `InteractionRequired` rejection.
    #[must_use]
    pub fn interaction_required(error: &'static str, message: impl Into<String>) -> Self {
        Self::InteractionRequired {
            error,
            message: message.into(),
        }
    }

    /// Creates a new `Server` rejection.
    #[must_use]
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Returns `true` if the rejection may be delivered through the redirect URI.
    #[must_use]
    pub fn is_redirectable(&self) -> bool {
        !matches!(
            self,
            Self::ClientResolution { .. } | Self::RedirectUri { .. }
        )
    }

    /// Returns the OAuth 2.0 error code for this rejection.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::ClientResolution { .. } => "invalid_client",
            Self::RedirectUri { .. } => "invalid_request",
            Self::RequestShape { error, .. } => error,
            Self::Pkce { .. } => "invalid_request",
            Self::Scope { .. } => "invalid_scope",
            Self::Consistency { .. } => "invalid_request",
            Self::AccessDenied { .. } => "access_denied",
            Self::InteractionRequired { error, .. } => error,
            Self::Server { .. } => "server_error",
        }
    }

    /// Returns the human readable description of the rejection.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::ClientResolution { message }
            | Self::RedirectUri { message }
            | Self::RequestShape { message, .. }
            | Self::Pkce { message }
            | Self::Scope { message }
            | Self::Consistency { message }
            | Self::AccessDenied { message }
            | Self::InteractionRequired { message, .. }
            | Self::Server { message } => message,
        }
    }
}

impl From<AuthError> for AuthorizationRejection {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AccessDenied { message } => Self::access_denied(message),
            AuthError::ConsentRequired { message } => {
                Self::interaction_required("consent_required", message)
            }
            AuthError::InvalidScope { message } => Self::scope(message),
            AuthError::InvalidRequest { message } => Self::invalid_request(message),
            other => Self::server(other.to_string()),
        }
    }
}
