//! Authorization context store trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::oauth::context::{AuthorizationContext, ContextHandle};

/// Keeps in-flight authorization contexts between the authorization request
/// and the response.
///
/// Contexts are single-use: [`take`](Self::take) removes the context, and a
/// context past its `expires_at` must be treated as absent by every method.
#[async_trait]
pub trait AuthorizationContextStore: Send + Sync {
    /// Stores a freshly validated context under its handle.
    async fn put(&self, context: AuthorizationContext) -> AuthResult<()>;

    /// Reads a context without consuming it.
    async fn get(&self, handle: &ContextHandle) -> AuthResult<Option<AuthorizationContext>>;

    /// Removes and returns a context. At most one caller receives it.
    async fn take(&self, handle: &ContextHandle) -> AuthResult<Option<AuthorizationContext>>;
}
