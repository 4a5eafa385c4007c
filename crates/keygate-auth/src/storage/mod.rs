//! Storage traits for the authorization server.
//!
//! This module defines the interfaces of the external collaborators:
//!
//! - OAuth client registrations
//! - In-flight authorization contexts
//! - Authorization codes, access tokens and refresh tokens
//! - Remembered consent decisions
//! - User attributes and pending obligations
//!
//! # Implementations
//!
//! - `keygate-auth-memory` - in-memory backend

pub mod attributes;
pub mod client;
pub mod consent;
pub mod context;
pub mod token;

pub use attributes::{AttributeQuery, ObligationSource, UserAttributeSource};
pub use client::ClientDirectory;
pub use consent::ConsentPreferenceStorage;
pub use context::AuthorizationContextStore;
pub use token::{RotationOutcome, TokenRepository};
