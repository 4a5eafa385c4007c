//! # keygate-auth
//!
//! OAuth 2.0 / OpenID Connect Authorization Server core.
//!
//! This crate provides:
//! - Authorization request validation and the consent decision
//! - Authorization code, refresh token (with rotation and reuse detection),
//!   token exchange (RFC 8693) and client credentials grants
//! - Opaque and JWT access tokens, signed ID tokens and the JWKS document
//! - Token introspection (RFC 7662) and revocation (RFC 7009)
//! - Axum handlers for all endpoints
//!
//! Persistence and user data come from the collaborator traits in
//! [`storage`]; `keygate-auth-memory` provides in-memory implementations.
//!
//! ## Modules
//!
//! - [`config`] - Authorization server configuration
//! - [`scope`] - Scope registry and scope resolution
//! - [`claims`] - User attributes, claim filters and claim rendering
//! - [`oauth`] - Authorization endpoint and request types
//! - [`token`] - Token issuance, signing, introspection and revocation
//! - [`storage`] - Collaborator traits
//! - [`http`] - Axum HTTP handlers

pub mod claims;
pub mod config;
pub mod error;
pub mod http;
pub mod oauth;
pub mod scope;
pub mod storage;
pub mod token;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, AuthorizationRejection, ErrorCategory};
pub use http::{AuthState, router};
pub use scope::{EffectiveScope, ScopeConfig, ScopeDefinition, ScopeRegistry};
pub use types::{Client, ClientType, ClientValidationError, GrantFlow, TokenRecord};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use keygate_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, AuthorizationRejection, ErrorCategory};
    pub use crate::http::{AuthState, router};
    pub use crate::oauth::{
        AuthenticatedUser, AuthorizationService, AuthorizationStores, ConsentAnswer,
        ResumeOutcome,
    };
    pub use crate::scope::{ScopeDefinition, ScopeRegistry};
    pub use crate::storage::{
        AttributeQuery, AuthorizationContextStore, ClientDirectory, ConsentPreferenceStorage,
        ObligationSource, RotationOutcome, TokenRepository, UserAttributeSource,
    };
    pub use crate::token::{
        AccessTokenFactory, IntrospectionService, JwtService, RevocationService,
        SigningAlgorithm, SigningKeyPair, TokenService,
    };
    pub use crate::types::{Client, ClientType, GrantFlow};
}
