//! OAuth 2.0 / OpenID Connect authorization endpoint and token endpoint
//! request types.
//!
//! The authorization flow is implemented across several submodules:
//!
//! - [`authorize`] - Request parsing and response building
//! - [`validator`] - Request validation into an [`AuthorizationContext`]
//! - [`context`] - The in-flight authorization state
//! - [`consent`] - Consent decision
//! - [`acr`] - Essential ACR check
//! - [`service`] - Lifecycle of an authorization request
//! - [`pkce`] - PKCE challenge/verifier implementation
//!
//! # Example
//!
//! ```ignore
//! use keygate_auth::oauth::{AuthorizationRequest, AuthorizationService};
//!
//! let context = service.begin(&request, now).await?;
//! // user authenticates
//! match service.resume(&context.handle, &user, now).await? {
//!     ResumeOutcome::ConsentRequired(context) => { /* render consent screen */ }
//!     ResumeOutcome::Redirect(url) => { /* 302 to url */ }
//! }
//! ```

pub mod acr;
pub mod authorize;
pub mod client_auth;
pub mod consent;
pub mod context;
pub mod pkce;
pub mod redirect;
pub mod service;
pub mod token;
pub mod validator;

pub use authorize::{
    AuthorizationRequest, AuthorizationResponse, RedirectTarget, ResponseMode, ResponseTypes,
};
pub use client_auth::{
    AuthenticatedClient, ClientCredentials, TokenEndpointAuthMethod, authenticate_client,
    parse_basic_auth,
};
pub use consent::{ConsentAction, ConsentDecision, ConsentPreference, PendingObligations};
pub use context::{AuthorizationContext, ContextHandle, Prompt};
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier};
pub use service::{
    AuthenticatedUser, AuthorizationService, AuthorizationStores, ConsentAnswer, ResumeOutcome,
};
pub use token::{TokenError, TokenErrorCode, TokenRequest, TokenResponse};
pub use validator::{AuthorizationRequestValidator, RejectedRequest};
