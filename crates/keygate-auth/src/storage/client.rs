//! Client directory trait.
//!
//! Client registrations are owned by the surrounding platform; the
//! authorization core only reads them.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Client;

// =============================================================================
// Client Directory Trait
// =============================================================================

/// Read access to OAuth 2.0 client registrations.
///
/// # Example
///
/// ```ignore
/// use keygate_auth::storage::ClientDirectory;
///
/// async fn example(clients: &impl ClientDirectory) -> keygate_auth::AuthResult<()> {
///     if let Some(client) = clients.find_by_client_id("my-app").await? {
///         println!("Found client: {}", client.name);
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// Find a client by its OAuth client_id.
    ///
    /// Inactive clients are returned too; callers check `active`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>>;

    /// Verify a client secret against the stored hash.
    ///
    /// Returns `false` for unknown clients and clients without a secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn verify_secret(&self, client_id: &str, secret: &str) -> AuthResult<bool>;
}
