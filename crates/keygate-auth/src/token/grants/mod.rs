//! Token issuance handlers, one per grant type.
//!
//! Each handler is an `impl` block on
//! [`TokenService`](crate::token::service::TokenService) returning a
//! [`GrantOutcome`](crate::token::service::GrantOutcome).

mod authorization_code;
mod client_credentials;
mod exchange;
mod refresh;
