//! In-flight authorization state.
//!
//! An [`AuthorizationContext`] is created once an authorization request has
//! been validated and lives until a response is sent or it times out. It is
//! addressed by an opaque [`ContextHandle`] and kept in an
//! [`AuthorizationContextStore`](crate::storage::AuthorizationContextStore),
//! which hands it out at most once.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::claims::ClaimFilters;
use crate::oauth::authorize::{RedirectTarget, ResponseTypes};
use crate::oauth::pkce::PkceChallenge;
use crate::scope::EffectiveScope;
use crate::types::{ClaimsInTokens, ClientType, GrantFlow};

/// Opaque reference to a stored authorization context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextHandle(Uuid);

impl ContextHandle {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContextHandle {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Parsed `prompt` directives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub none: bool,
    pub login: bool,
    pub consent: bool,
}

impl Prompt {
    /// Parses a space-separated prompt value.
    ///
    /// `select_account` and `create` are not supported, and `none` cannot be
    /// combined with any other value.
    pub fn parse(value: Option<&str>) -> Result<Self, String> {
        let mut prompt = Self::default();
        let mut count = 0;
        for member in value.unwrap_or_default().split_whitespace() {
            count += 1;
            match member {
                "none" => prompt.none = true,
                "login" => prompt.login = true,
                "consent" => prompt.consent = true,
                "select_account" | "create" => {
                    return Err(format!("prompt={member} is not supported"));
                }
                other => return Err(format!("unknown prompt value '{other}'")),
            }
        }
        if prompt.none && count > 1 {
            return Err("prompt=none cannot be combined with other values".to_string());
        }
        Ok(prompt)
    }
}

/// Validated authorization request awaiting authentication and consent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationContext {
    pub handle: ContextHandle,

    pub response_types: ResponseTypes,
    pub flow: GrantFlow,
    pub openid: bool,

    pub client_id: String,
    pub client_type: ClientType,
    pub client_name: String,
    pub client_logo: Option<String>,

    /// Chosen redirect URI, response mode and echoed state.
    pub redirect: RedirectTarget,
    /// Whether `redirect_uri` was sent explicitly.
    pub redirect_uri_supplied: bool,

    /// Scopes as sent by the client.
    pub requested_scopes: Vec<String>,
    pub effective_scopes: Vec<EffectiveScope>,
    pub claim_filters: ClaimFilters,
    /// Values of the `resource` parameter.
    pub additional_audience: Vec<String>,

    pub pkce: Option<PkceChallenge>,
    pub nonce: Option<String>,
    pub prompt: Prompt,
    /// Values the authenticator must have satisfied.
    pub essential_acr: Vec<String>,
    /// Voluntary `acr_values`.
    pub acr_values: Vec<String>,
    pub claims_in_tokens: ClaimsInTokens,

    pub users_group: String,
    pub translation_profile: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl AuthorizationContext {
    /// A context is usable only while `now < expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    #[must_use]
    pub fn is_public_client(&self) -> bool {
        self.client_type.is_public()
    }

    #[must_use]
    pub fn effective_scope_names(&self) -> Vec<String> {
        self.effective_scopes.iter().map(|s| s.name.clone()).collect()
    }

    /// Audience of tokens issued from this context.
    #[must_use]
    pub fn audience(&self) -> Vec<String> {
        let mut audience = vec![self.client_id.clone()];
        for resource in &self.additional_audience {
            if !audience.contains(resource) {
                audience.push(resource.clone());
            }
        }
        audience
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::oauth::authorize::ResponseMode;

    pub(crate) fn sample_context(now: OffsetDateTime) -> AuthorizationContext {
        AuthorizationContext {
            handle: ContextHandle::generate(),
            response_types: ResponseTypes {
                code: true,
                ..Default::default()
            },
            flow: GrantFlow::AuthorizationCode,
            openid: true,
            client_id: "client".to_string(),
            client_type: ClientType::Confidential,
            client_name: "Client".to_string(),
            client_logo: None,
            redirect: RedirectTarget {
                redirect_uri: "https://app.example.com/cb".to_string(),
                mode: ResponseMode::Query,
                state: Some("state".to_string()),
            },
            redirect_uri_supplied: true,
            requested_scopes: vec!["openid".to_string(), "profile".to_string()],
            effective_scopes: vec![
                EffectiveScope {
                    name: "openid".to_string(),
                    definition: "openid".to_string(),
                    attributes: vec![],
                    pattern: false,
                },
                EffectiveScope {
                    name: "profile".to_string(),
                    definition: "profile".to_string(),
                    attributes: vec!["email".to_string(), "name".to_string()],
                    pattern: false,
                },
            ],
            claim_filters: ClaimFilters::default(),
            additional_audience: vec![],
            pkce: None,
            nonce: Some("n-0S6_WzA2Mj".to_string()),
            prompt: Prompt::default(),
            essential_acr: vec![],
            acr_values: vec![],
            claims_in_tokens: ClaimsInTokens::default(),
            users_group: "/".to_string(),
            translation_profile: None,
            created_at: now,
            expires_at: now + time::Duration::seconds(900),
        }
    }

    #[test]
    fn test_context_expiry_boundary() {
        let now = OffsetDateTime::now_utc();
        let context = sample_context(now);
        assert!(!context.is_expired_at(now + time::Duration::seconds(899)));
        assert!(context.is_expired_at(now + time::Duration::seconds(900)));
        assert!(context.is_expired_at(now + time::Duration::seconds(901)));
    }

    #[test]
    fn test_context_serde_round_trip() {
        let context = sample_context(OffsetDateTime::now_utc());
        let json = serde_json::to_string(&context).unwrap();
        let back: AuthorizationContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back.handle, context.handle);
        assert_eq!(back.effective_scopes, context.effective_scopes);
    }

    #[test]
    fn test_handle_parse() {
        let handle = ContextHandle::generate();
        assert_eq!(handle.to_string().parse::<ContextHandle>().unwrap(), handle);
        assert!("not-a-handle".parse::<ContextHandle>().is_err());
    }

    #[test]
    fn test_audience_includes_resources_once() {
        let mut context = sample_context(OffsetDateTime::now_utc());
        context.additional_audience = vec!["https://api".to_string(), "client".to_string()];
        assert_eq!(context.audience(), vec!["client", "https://api"]);
    }

    #[test]
    fn test_prompt_parse() {
        let prompt = Prompt::parse(Some("login consent")).unwrap();
        assert!(prompt.login && prompt.consent && !prompt.none);
        assert!(Prompt::parse(None).unwrap() == Prompt::default());
        assert!(Prompt::parse(Some("none")).unwrap().none);
        assert!(Prompt::parse(Some("none consent")).is_err());
        assert!(Prompt::parse(Some("select_account")).is_err());
        assert!(Prompt::parse(Some("create")).is_err());
        assert!(Prompt::parse(Some("bogus")).is_err());
    }
}
