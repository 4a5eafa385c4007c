//! Common types used across the authorization server modules.
//!
//! ## Domain Types
//!
//! - [`Client`] - OAuth 2.0 client registration
//! - [`GrantFlow`] - Authorization flows a client may use
//! - [`TokenRecord`] - Materialized token content
//! - [`StoredRefreshToken`] - Refresh token with rotation state

pub mod client;
pub mod token;

pub use client::{Client, ClientType, ClientValidationError, GrantFlow};
pub use token::{
    AuthorizationCodeRecord, ClaimsInTokens, RefreshTokenState, StoredAccessToken,
    StoredRefreshToken, TokenRecord, generate_token, hash_token,
};
