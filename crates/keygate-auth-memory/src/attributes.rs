//! Static user attributes and pending obligations.
//!
//! [`StaticAttributeSource`] stands in for the translation engine: each user
//! has a fixed attribute set and a list of group memberships. A lookup for a
//! group the user does not belong to is denied.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use keygate_auth::claims::Attributes;
use keygate_auth::storage::{AttributeQuery, ObligationSource, UserAttributeSource};
use keygate_auth::{AuthError, AuthResult};

/// A user known to the static attribute source.
#[derive(Debug, Clone, Default)]
pub struct StaticUser {
    pub attributes: Attributes,
    /// Group paths such as `/staff/admins`. Membership of a group implies
    /// membership of its parents.
    pub groups: Vec<String>,
}

impl StaticUser {
    fn is_member_of(&self, group: &str) -> bool {
        let group = group.trim_end_matches('/');
        if group.is_empty() {
            return true;
        }
        self.groups.iter().any(|g| {
            g == group
                || g.strip_prefix(group)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// Attribute source over a fixed user table.
#[derive(Debug, Default)]
pub struct StaticAttributeSource {
    users: DashMap<String, StaticUser>,
}

impl StaticAttributeSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, subject: impl Into<String>, user: StaticUser) {
        self.users.insert(subject.into(), user);
    }
}

#[async_trait]
impl UserAttributeSource for StaticAttributeSource {
    async fn resolve(&self, query: AttributeQuery<'_>) -> AuthResult<Attributes> {
        let Some(user) = self.users.get(query.subject) else {
            tracing::warn!(subject = %query.subject, "Attributes requested for unknown user");
            return Err(AuthError::access_denied("unknown user"));
        };
        if !user.is_member_of(query.group) {
            tracing::warn!(
                subject = %query.subject,
                group = %query.group,
                client_id = %query.client_id,
                "User is not a member of the client's group"
            );
            return Err(AuthError::access_denied(
                "the user is not a member of the required group",
            ));
        }
        Ok(user.attributes.clone())
    }
}

/// Pending enquiries and unaccepted policy documents.
#[derive(Debug, Default)]
pub struct MemoryObligationSource {
    enquiries: DashSet<String>,
    policies: DashSet<(String, String)>,
}

impl MemoryObligationSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pending_enquiry(&self, subject: &str, pending: bool) {
        if pending {
            self.enquiries.insert(subject.to_string());
        } else {
            self.enquiries.remove(subject);
        }
    }

    pub fn set_unaccepted_policy(&self, subject: &str, client_id: &str, pending: bool) {
        let key = (subject.to_string(), client_id.to_string());
        if pending {
            self.policies.insert(key);
        } else {
            self.policies.remove(&key);
        }
    }
}

#[async_trait]
impl ObligationSource for MemoryObligationSource {
    async fn has_pending_enquiry(&self, subject: &str) -> AuthResult<bool> {
        Ok(self.enquiries.contains(subject))
    }

    async fn has_unaccepted_policy(&self, subject: &str, client_id: &str) -> AuthResult<bool> {
        Ok(self
            .policies
            .contains(&(subject.to_string(), client_id.to_string())))
    }
}
