//! Consent preference storage trait.
//!
//! A preference records how a user answered the consent screen for a client
//! when they asked to be remembered. The consent decider compares it against
//! each new request.
//!
//! # Implementation Notes
//!
//! Implementations should:
//!
//! - Support efficient lookup by subject + client_id
//! - Replace any previous preference on save

use async_trait::async_trait;

use crate::AuthResult;
use crate::oauth::consent::ConsentPreference;

/// Storage trait for remembered consent decisions.
#[async_trait]
pub trait ConsentPreferenceStorage: Send + Sync {
    /// Returns the stored preference of `subject` for `client_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find(&self, subject: &str, client_id: &str) -> AuthResult<Option<ConsentPreference>>;

    /// Saves or replaces the preference of `subject` for `client_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the save operation fails.
    async fn save(
        &self,
        subject: &str,
        client_id: &str,
        preference: &ConsentPreference,
    ) -> AuthResult<()>;

    /// Forgets the preference, forcing the consent screen next time.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    async fn remove(&self, subject: &str, client_id: &str) -> AuthResult<()>;
}
