//! Token repository trait.
//!
//! This module defines the storage interface for authorization codes, access
//! tokens and refresh tokens.
//!
//! # Security Considerations
//!
//! - Token values are stored as SHA-256 hashes only
//! - Code consumption and refresh rotation must be atomic
//! - Revocation must be immediate
//! - Expired records should be cleaned up periodically

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::{AuthorizationCodeRecord, StoredAccessToken, StoredRefreshToken};

/// Result of a refresh token rotation.
#[derive(Debug, Clone)]
pub enum RotationOutcome {
    /// The presented token was active and is now `Used`; the replacement is
    /// stored as the active token of the family.
    Rotated(Box<StoredRefreshToken>),
    /// The presented token had already been rotated. Its whole family, and
    /// the access tokens minted with it, are now revoked.
    ReuseDetected { family_id: Uuid, client_id: String },
    /// The presented token had been revoked.
    Revoked,
    NotFound,
}

/// Storage trait for codes and tokens.
///
/// Implementations must provide at-most-one-active-record-per-key
/// semantics: of several concurrent rotations of the same refresh token
/// exactly one observes it as active.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    // -------------------------------------------------------------------------
    // Authorization codes
    // -------------------------------------------------------------------------

    /// Stores a new authorization code.
    async fn store_authorization_code(&self, code: &AuthorizationCodeRecord) -> AuthResult<()>;

    /// Removes and returns the code with the given hash.
    ///
    /// Returns `None` if the code does not exist or was already consumed.
    /// Concurrent callers for the same hash see at most one `Some`.
    async fn consume_authorization_code(
        &self,
        code_hash: &str,
    ) -> AuthResult<Option<AuthorizationCodeRecord>>;

    // -------------------------------------------------------------------------
    // Access tokens
    // -------------------------------------------------------------------------

    async fn store_access_token(&self, token: &StoredAccessToken) -> AuthResult<()>;

    /// Finds an access token by hash, regardless of expiry or revocation.
    async fn find_access_token(&self, token_hash: &str) -> AuthResult<Option<StoredAccessToken>>;

    /// Marks an access token revoked. Unknown hashes are ignored.
    async fn revoke_access_token(&self, token_hash: &str) -> AuthResult<()>;

    // -------------------------------------------------------------------------
    // Refresh tokens
    // -------------------------------------------------------------------------

    async fn store_refresh_token(&self, token: &StoredRefreshToken) -> AuthResult<()>;

    /// Finds a refresh token by hash in any state.
    async fn find_refresh_token(&self, token_hash: &str) -> AuthResult<Option<StoredRefreshToken>>;

    /// Replaces the refresh token `presented_hash` with `replacement` in one
    /// transaction.
    ///
    /// If the presented token is `Used`, the family is revoked within the same
    /// transaction and [`RotationOutcome::ReuseDetected`] is returned.
    async fn rotate_refresh_token(
        &self,
        presented_hash: &str,
        replacement: StoredRefreshToken,
    ) -> AuthResult<RotationOutcome>;

    /// Revokes every refresh token of the family owned by `client_id`,
    /// together with the access tokens minted with them.
    ///
    /// Returns the number of refresh tokens revoked.
    async fn revoke_refresh_family(&self, family_id: Uuid, client_id: &str) -> AuthResult<usize>;

    // -------------------------------------------------------------------------
    // Maintenance
    // -------------------------------------------------------------------------

    /// Deletes codes and tokens that expired before `now`.
    ///
    /// Returns the number of records removed.
    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
