//! In-memory token repository.
//!
//! All three tables sit behind one async lock so that code consumption,
//! refresh rotation and family revocation are single transactions.
//! Concurrent rotations of the same refresh token have exactly one winner;
//! every other caller observes the `used` state and gets
//! [`RotationOutcome::ReuseDetected`].

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use keygate_auth::AuthResult;
use keygate_auth::storage::{RotationOutcome, TokenRepository};
use keygate_auth::types::{
    AuthorizationCodeRecord, RefreshTokenState, StoredAccessToken, StoredRefreshToken,
};

#[derive(Debug, Default)]
struct TokenTables {
    codes: HashMap<String, AuthorizationCodeRecord>,
    access: HashMap<String, StoredAccessToken>,
    refresh: HashMap<String, StoredRefreshToken>,
}

impl TokenTables {
    /// Revokes the family's refresh tokens owned by `client_id` and every
    /// access token minted from the family.
    fn revoke_family(&mut self, family_id: Uuid, client_id: &str) -> usize {
        let mut revoked = 0;
        for token in self.refresh.values_mut().filter(|t| {
            t.family_id == family_id
                && t.record.client_id == client_id
                && t.state != RefreshTokenState::Revoked
        }) {
            token.state = RefreshTokenState::Revoked;
            revoked += 1;
        }
        for token in self
            .access
            .values_mut()
            .filter(|t| t.family_id == Some(family_id))
        {
            token.revoked = true;
        }
        revoked
    }
}

/// Token repository keyed by token hash.
#[derive(Debug, Default)]
pub struct MemoryTokenRepository {
    tables: RwLock<TokenTables>,
}

impl MemoryTokenRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenRepository for MemoryTokenRepository {
    async fn store_authorization_code(&self, code: &AuthorizationCodeRecord) -> AuthResult<()> {
        self.tables
            .write()
            .await
            .codes
            .insert(code.code_hash.clone(), code.clone());
        Ok(())
    }

    async fn consume_authorization_code(
        &self,
        code_hash: &str,
    ) -> AuthResult<Option<AuthorizationCodeRecord>> {
        Ok(self.tables.write().await.codes.remove(code_hash))
    }

    async fn store_access_token(&self, token: &StoredAccessToken) -> AuthResult<()> {
        self.tables
            .write()
            .await
            .access
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_access_token(&self, token_hash: &str) -> AuthResult<Option<StoredAccessToken>> {
        Ok(self.tables.read().await.access.get(token_hash).cloned())
    }

    async fn revoke_access_token(&self, token_hash: &str) -> AuthResult<()> {
        if let Some(token) = self.tables.write().await.access.get_mut(token_hash) {
            token.revoked = true;
        }
        Ok(())
    }

    async fn store_refresh_token(&self, token: &StoredRefreshToken) -> AuthResult<()> {
        self.tables
            .write()
            .await
            .refresh
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_refresh_token(&self, token_hash: &str) -> AuthResult<Option<StoredRefreshToken>> {
        Ok(self.tables.read().await.refresh.get(token_hash).cloned())
    }

    async fn rotate_refresh_token(
        &self,
        presented_hash: &str,
        replacement: StoredRefreshToken,
    ) -> AuthResult<RotationOutcome> {
        let mut tables = self.tables.write().await;
        let Some(current) = tables.refresh.get_mut(presented_hash) else {
            return Ok(RotationOutcome::NotFound);
        };

        match current.state {
            RefreshTokenState::Active => {
                current.state = RefreshTokenState::Used {
                    superseded_by: replacement.id,
                };
                tables
                    .refresh
                    .insert(replacement.token_hash.clone(), replacement.clone());
                Ok(RotationOutcome::Rotated(Box::new(replacement)))
            }
            RefreshTokenState::Used { .. } => {
                let family_id = current.family_id;
                let client_id = current.record.client_id.clone();
                let revoked = tables.revoke_family(family_id, &client_id);
                tracing::debug!(%family_id, revoked, "Family revoked on reuse");
                Ok(RotationOutcome::ReuseDetected {
                    family_id,
                    client_id,
                })
            }
            RefreshTokenState::Revoked => Ok(RotationOutcome::Revoked),
        }
    }

    async fn revoke_refresh_family(&self, family_id: Uuid, client_id: &str) -> AuthResult<usize> {
        Ok(self
            .tables
            .write()
            .await
            .revoke_family(family_id, client_id))
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.codes.len() + tables.access.len() + tables.refresh.len();
        tables.codes.retain(|_, c| !c.is_expired_at(now));
        tables.access.retain(|_, t| !t.is_expired_at(now));
        tables.refresh.retain(|_, t| !t.is_expired_at(now));
        let after = tables.codes.len() + tables.access.len() + tables.refresh.len();

        let removed = (before - after) as u64;
        if removed > 0 {
            tracing::debug!(removed, "Expired tokens purged");
        }
        Ok(removed)
    }
}
