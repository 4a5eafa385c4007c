//! Consent decision.
//!
//! [`decide`] is a pure function over the stored preference, the
//! authorization context and the pending obligations of the user. Rules, in
//! precedence order:
//!
//! 1. Any pending obligation (active value selection, enquiry, policy
//!    agreement) requires interaction.
//! 2. Unless `prompt=consent` was requested:
//!    - a confidential client with a stored "do not ask" preference is
//!      answered silently with the stored default, provided the requested
//!      scopes and audience were all granted before;
//!    - a client for which the deployment skips consent is accepted
//!      silently, provided no stored preference or a covering one.
//! 3. Otherwise interaction is required.
//!
//! Public clients never bypass the screen on a stored preference alone.
//! When interaction is required and `prompt=none` was sent, the request
//! fails.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AuthorizationRejection;
use crate::oauth::context::AuthorizationContext;

/// A remembered answer to the consent screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentPreference {
    pub do_not_ask: bool,
    pub default_accept: bool,
    pub granted_scopes: Vec<String>,
    pub granted_audience: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ConsentPreference {
    /// Records the user's answer for the request in `context`.
    #[must_use]
    pub fn remember(context: &AuthorizationContext, accept: bool, now: OffsetDateTime) -> Self {
        Self {
            do_not_ask: true,
            default_accept: accept,
            granted_scopes: context.effective_scope_names(),
            granted_audience: context.additional_audience.clone(),
            timestamp: now,
        }
    }

    /// Returns `true` if every requested scope and audience was granted.
    #[must_use]
    pub fn covers(&self, context: &AuthorizationContext) -> bool {
        context
            .effective_scopes
            .iter()
            .all(|s| self.granted_scopes.contains(&s.name))
            && context
                .additional_audience
                .iter()
                .all(|a| self.granted_audience.contains(a))
    }
}

/// Interactive steps other than consent that are pending for the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingObligations {
    pub active_value_selection: bool,
    pub pending_enquiry: bool,
    pub unaccepted_policy: bool,
}

impl PendingObligations {
    #[must_use]
    pub fn any(&self) -> bool {
        self.active_value_selection || self.pending_enquiry || self.unaccepted_policy
    }
}

/// What to do without asking the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentAction {
    Accept,
    Decline,
}

/// Outcome of the consent decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentDecision {
    Interactive,
    Silent(ConsentAction),
}

/// Decides whether the user must be shown an interactive step.
///
/// `skip_consent` is the deployment-level consent bypass for the client.
///
/// # Errors
///
/// Returns an `interaction_required` or `consent_required` rejection when
/// interaction is needed but `prompt=none` was requested.
pub fn decide(
    preference: Option<&ConsentPreference>,
    context: &AuthorizationContext,
    obligations: &PendingObligations,
    skip_consent: bool,
) -> Result<ConsentDecision, AuthorizationRejection> {
    if obligations.any() {
        return require_interaction(
            context,
            AuthorizationRejection::interaction_required(
                "interaction_required",
                "user interaction is required",
            ),
        );
    }

    if !context.prompt.consent {
        match preference {
            Some(pref) if pref.do_not_ask && !context.is_public_client() => {
                if pref.covers(context) {
                    let action = if pref.default_accept {
                        ConsentAction::Accept
                    } else {
                        ConsentAction::Decline
                    };
                    return Ok(ConsentDecision::Silent(action));
                }
            }
            _ if skip_consent && preference.is_none_or(|p| p.covers(context)) => {
                return Ok(ConsentDecision::Silent(ConsentAction::Accept));
            }
            _ => {}
        }
    }

    require_interaction(
        context,
        AuthorizationRejection::interaction_required("consent_required", "consent is required"),
    )
}

fn require_interaction(
    context: &AuthorizationContext,
    rejection: AuthorizationRejection,
) -> Result<ConsentDecision, AuthorizationRejection> {
    if context.prompt.none {
        Err(rejection)
    } else {
        Ok(ConsentDecision::Interactive)
    }
}
