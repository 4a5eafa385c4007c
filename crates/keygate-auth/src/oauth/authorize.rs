//! Authorization endpoint request and response types.
//!
//! The request is parsed from raw query pairs because `resource` may be
//! repeated. Responses, successful or not, are delivered to the resolved
//! redirect URI in the query or the fragment depending on the response mode.

use serde::{Deserialize, Serialize};

use crate::error::AuthorizationRejection;

/// Authorization request parameters.
///
/// # Example
///
/// ```ignore
/// GET /authorize?
///   response_type=code
///   &client_id=my-app
///   &redirect_uri=https://app.example.com/callback
///   &scope=openid profile
///   &state=abc123xyz
///   &code_challenge=E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM
///   &code_challenge_method=S256
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// Space-separated prompt directives.
    pub prompt: Option<String>,
    pub acr_values: Option<String>,
    /// OIDC `claims` request parameter (JSON).
    pub claims: Option<String>,
    /// Space-separated subset of `token id_token`.
    pub claims_in_tokens: Option<String>,
    pub response_mode: Option<String>,
    /// RFC 8707 resource indicators.
    pub resource: Vec<String>,
}

impl AuthorizationRequest {
    /// Builds a request from query pairs. The first occurrence of a
    /// single-valued parameter wins; `resource` accumulates.
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut request = Self::default();
        for (key, value) in pairs {
            let value = value.into();
            let slot = match key.as_ref() {
                "response_type" => &mut request.response_type,
                "client_id" => &mut request.client_id,
                "redirect_uri" => &mut request.redirect_uri,
                "scope" => &mut request.scope,
                "state" => &mut request.state,
                "nonce" => &mut request.nonce,
                "code_challenge" => &mut request.code_challenge,
                "code_challenge_method" => &mut request.code_challenge_method,
                "prompt" => &mut request.prompt,
                "acr_values" => &mut request.acr_values,
                "claims" => &mut request.claims,
                "claims_in_tokens" => &mut request.claims_in_tokens,
                "response_mode" => &mut request.response_mode,
                "resource" => {
                    request.resource.push(value);
                    continue;
                }
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        request
    }
}

// =============================================================================
// Response Type
// =============================================================================

/// Parsed `response_type` value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTypes {
    pub code: bool,
    pub token: bool,
    pub id_token: bool,
}

impl ResponseTypes {
    /// Parses a space-separated response type.
    ///
    /// Returns the first unknown member as the error.
    pub fn parse(value: &str) -> Result<Self, String> {
        let mut parsed = Self::default();
        for member in value.split_whitespace() {
            match member {
                "code" => parsed.code = true,
                "token" => parsed.token = true,
                "id_token" => parsed.id_token = true,
                other => return Err(other.to_string()),
            }
        }
        Ok(parsed)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.code && !self.token && !self.id_token
    }

    /// `response_type=code`.
    #[must_use]
    pub fn is_code_only(&self) -> bool {
        self.code && !self.token && !self.id_token
    }

    /// `response_type=token`.
    #[must_use]
    pub fn is_token_only(&self) -> bool {
        self.token && !self.code && !self.id_token
    }

    /// `response_type=id_token`.
    #[must_use]
    pub fn is_id_token_only(&self) -> bool {
        self.id_token && !self.code && !self.token
    }
}

// =============================================================================
// Response Mode
// =============================================================================

/// Where response parameters are placed in the redirect URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    Query,
    Fragment,
}

impl ResponseMode {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "query" => Some(Self::Query),
            "fragment" => Some(Self::Fragment),
            _ => None,
        }
    }

    /// Default mode for a response type: query for the code flow,
    /// fragment for anything returning tokens from the front channel.
    #[must_use]
    pub fn implied_by(response_types: &ResponseTypes) -> Self {
        if response_types.is_code_only() {
            Self::Query
        } else {
            Self::Fragment
        }
    }
}

// =============================================================================
// Redirect Target
// =============================================================================

/// Resolved destination of an authorization response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectTarget {
    pub redirect_uri: String,
    pub mode: ResponseMode,
    pub state: Option<String>,
}

impl RedirectTarget {
    /// Builds the redirect URL carrying `params` and the echoed `state`.
    pub fn build(&self, params: &[(&str, &str)]) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(&self.redirect_uri)?;
        let state = self.state.as_deref().map(|s| ("state", s));
        let all = params.iter().copied().chain(state);
        match self.mode {
            ResponseMode::Query => {
                url.query_pairs_mut().extend_pairs(all);
            }
            ResponseMode::Fragment => {
                let fragment = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(all)
                    .finish();
                url.set_fragment(Some(&fragment));
            }
        }
        Ok(url.to_string())
    }

    /// Builds the redirect URL carrying an OAuth error.
    pub fn error_url(&self, rejection: &AuthorizationRejection) -> Result<String, url::ParseError> {
        self.build(&[
            ("error", rejection.oauth_error_code()),
            ("error_description", rejection.description()),
        ])
    }
}

/// Successful authorization response parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthorizationResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl AuthorizationResponse {
    /// Builds the redirect URL with response parameters.
    pub fn to_redirect_url(&self, target: &RedirectTarget) -> Result<String, url::ParseError> {
        let expires_in = self.expires_in.map(|e| e.to_string());
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(code) = &self.code {
            params.push(("code", code));
        }
        if let Some(token) = &self.access_token {
            params.push(("access_token", token));
        }
        if let Some(token_type) = &self.token_type {
            params.push(("token_type", token_type));
        }
        if let Some(expires_in) = &expires_in {
            params.push(("expires_in", expires_in));
        }
        if let Some(scope) = &self.scope {
            params.push(("scope", scope));
        }
        if let Some(id_token) = &self.id_token {
            params.push(("id_token", id_token));
        }
        target.build(&params)
    }
}

// =============================================================================
// Claims parameter
// =============================================================================

#[derive(Debug, Deserialize)]
struct ClaimsParameter {
    #[serde(default)]
    id_token: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    userinfo: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct ClaimRequest {
    #[serde(default)]
    essential: bool,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    values: Vec<String>,
}

/// Extracts essential `acr` values from an OIDC `claims` parameter.
///
/// Both the `id_token` and `userinfo` members are inspected.
pub fn essential_acr_values(claims: &str) -> Result<Vec<String>, serde_json::Error> {
    let parsed: ClaimsParameter = serde_json::from_str(claims)?;
    let mut values = Vec::new();
    for member in [parsed.id_token, parsed.userinfo].into_iter().flatten() {
        let Some(acr) = member.get("acr") else {
            continue;
        };
        if acr.is_null() {
            continue;
        }
        let request: ClaimRequest = serde_json::from_value(acr.clone())?;
        if !request.essential {
            continue;
        }
        for value in request.value.into_iter().chain(request.values) {
            if !values.contains(&value) {
                values.push(value);
            }
        }
    }
    Ok(values)
}
