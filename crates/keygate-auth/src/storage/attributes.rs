//! User attribute and pending obligation lookups.
//!
//! Both are provided by the surrounding identity platform. The attribute
//! source stands for the translation engine that maps an authenticated
//! principal and its group membership onto attributes.

use async_trait::async_trait;

use crate::AuthResult;
use crate::claims::Attributes;

/// Parameters of an attribute lookup.
#[derive(Debug, Clone, Copy)]
pub struct AttributeQuery<'a> {
    pub subject: &'a str,
    pub client_id: &'a str,
    /// Group whose attribute statements apply.
    pub group: &'a str,
    pub translation_profile: Option<&'a str>,
}

/// Resolves the attributes of an authenticated principal.
#[async_trait]
pub trait UserAttributeSource: Send + Sync {
    /// Returns the attributes released for `query`.
    ///
    /// # Errors
    ///
    /// Fails with [`AuthError::AccessDenied`](crate::AuthError::AccessDenied)
    /// when the subject may not authorize (unknown, or not a group member).
    async fn resolve(&self, query: AttributeQuery<'_>) -> AuthResult<Attributes>;
}

/// Interactive steps, other than consent, that may be pending for a user.
#[async_trait]
pub trait ObligationSource: Send + Sync {
    /// Returns `true` if an enquiry awaits the user's answer.
    async fn has_pending_enquiry(&self, subject: &str) -> AuthResult<bool>;

    /// Returns `true` if a policy agreement applies to the user for this
    /// client and has not been accepted.
    async fn has_unaccepted_policy(&self, subject: &str, client_id: &str) -> AuthResult<bool>;
}
