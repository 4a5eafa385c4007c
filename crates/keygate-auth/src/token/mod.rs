//! Token issuance, signing, introspection and revocation.
//!
//! - [`service`] - Token endpoint dispatch over the grant handlers
//! - [`factory`] - Access token and ID token rendering
//! - [`jwt`] - Signing keys and JWT encoding/decoding
//! - [`introspection`] - Token introspection (RFC 7662)
//! - [`revocation`] - Token revocation (RFC 7009)

pub mod factory;
mod grants;
pub mod introspection;
pub mod jwt;
pub mod revocation;
pub mod service;

pub use factory::{AccessTokenFactory, IssuedAccessToken, JWT_ACCESS_TOKEN_MEDIA_TYPE, RenderedFormat};
pub use introspection::{IntrospectionRequest, IntrospectionResponse, IntrospectionService};
pub use jwt::{
    AccessTokenClaims, IdTokenClaims, Jwk, Jwks, JwtError, JwtService, SigningAlgorithm,
    SigningKeyPair,
};
pub use revocation::{RevocationCaller, RevocationRequest, RevocationService, TokenTypeHint};
pub use service::{GrantOutcome, IssuedTokenType, TokenService};
