//! In-memory authorization context store.

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;

use keygate_auth::AuthResult;
use keygate_auth::oauth::{AuthorizationContext, ContextHandle};
use keygate_auth::storage::AuthorizationContextStore;

/// Authorization contexts keyed by handle.
///
/// `take` removes the entry atomically, so a context is consumed at most once.
#[derive(Debug, Default)]
pub struct MemoryContextStore {
    contexts: DashMap<ContextHandle, AuthorizationContext>,
}

impl MemoryContextStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops contexts that have expired. Returns how many were removed.
    pub fn purge_expired(&self, now: OffsetDateTime) -> usize {
        let before = self.contexts.len();
        self.contexts.retain(|_, context| !context.is_expired_at(now));
        before.saturating_sub(self.contexts.len())
    }
}

#[async_trait]
impl AuthorizationContextStore for MemoryContextStore {
    async fn put(&self, context: AuthorizationContext) -> AuthResult<()> {
        self.contexts.insert(context.handle, context);
        Ok(())
    }

    async fn get(&self, handle: &ContextHandle) -> AuthResult<Option<AuthorizationContext>> {
        Ok(self.contexts.get(handle).map(|entry| entry.value().clone()))
    }

    async fn take(&self, handle: &ContextHandle) -> AuthResult<Option<AuthorizationContext>> {
        Ok(self.contexts.remove(handle).map(|(_, context)| context))
    }
}
