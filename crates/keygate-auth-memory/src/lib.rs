//! In-memory storage backend for keygate-auth
//!
//! Provides implementations of every collaborator trait:
//!
//! - OAuth clients, with Argon2-hashed secrets
//! - In-flight authorization contexts
//! - Authorization codes, access tokens and refresh tokens, with
//!   transactional refresh token rotation
//! - Remembered consent preferences
//! - Static user attributes and pending obligations
//!
//! Nothing survives a restart.
//!
//! # Example
//!
//! ```ignore
//! use keygate_auth_memory::MemoryAuthStorage;
//!
//! let storage = MemoryAuthStorage::new();
//! storage.clients.register(client, Some("secret"))?;
//! let stores = storage.stores();
//! ```

pub mod attributes;
pub mod client;
pub mod consent;
pub mod context;
pub mod secret;
pub mod token;

use std::sync::Arc;

use keygate_auth::oauth::AuthorizationStores;

pub use attributes::{MemoryObligationSource, StaticAttributeSource, StaticUser};
pub use client::MemoryClientDirectory;
pub use consent::MemoryConsentStorage;
pub use context::MemoryContextStore;
pub use secret::{hash_secret, verify_secret};
pub use token::MemoryTokenRepository;

/// All in-memory storages, shared behind `Arc`s.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuthStorage {
    pub clients: Arc<MemoryClientDirectory>,
    pub contexts: Arc<MemoryContextStore>,
    pub consents: Arc<MemoryConsentStorage>,
    pub tokens: Arc<MemoryTokenRepository>,
    pub attributes: Arc<StaticAttributeSource>,
    pub obligations: Arc<MemoryObligationSource>,
}

impl MemoryAuthStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The collaborators of the authorization endpoint.
    #[must_use]
    pub fn stores(&self) -> AuthorizationStores {
        AuthorizationStores {
            clients: self.clients.clone(),
            contexts: self.contexts.clone(),
            consents: self.consents.clone(),
            obligations: self.obligations.clone(),
            attributes: self.attributes.clone(),
            tokens: self.tokens.clone(),
        }
    }
}
