//! OAuth 2.0 client domain types.
//!
//! Client records are read-only to the authorization core; they are
//! resolved through [`ClientDirectory`](crate::storage::ClientDirectory).

use serde::{Deserialize, Serialize};

// =============================================================================
// Client Type
// =============================================================================

/// OAuth 2.0 client type (RFC 6749 section 2.1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// Cannot keep a secret: native and browser applications.
    Public,
    /// Authenticates with a secret.
    #[default]
    Confidential,
}

impl ClientType {
    #[must_use]
    pub fn is_public(&self) -> bool {
        matches!(self, Self::Public)
    }
}

// =============================================================================
// Grant Flow
// =============================================================================

/// Authorization flows a client may be allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantFlow {
    /// `response_type=code`.
    AuthorizationCode,
    /// `response_type` without `code`.
    Implicit,
    /// `code` combined with `token` and/or `id_token`.
    Hybrid,
    /// Back-channel `client_credentials` grant.
    ClientCredentials,
}

impl GrantFlow {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::Implicit => "implicit",
            Self::Hybrid => "hybrid",
            Self::ClientCredentials => "client_credentials",
        }
    }
}

impl std::fmt::Display for GrantFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Client
// =============================================================================

/// OAuth 2.0 client registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier used in OAuth flows.
    pub client_id: String,

    /// Argon2 PHC hash of the client secret (confidential clients).
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,

    /// Human-readable display name.
    pub name: String,

    /// Logo shown on the consent screen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,

    #[serde(default)]
    pub client_type: ClientType,

    /// Registered redirect URIs. Entries may contain `*` wildcards, which are
    /// honoured only when the deployment enables wildcard matching.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Flows this client may use.
    #[serde(default)]
    pub allowed_flows: Vec<GrantFlow>,

    /// Scope definitions this client may request. `None` allows all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,

    /// Group whose members may authorize this client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group: Option<String>,

    /// Whether this client is currently active and can be used.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Client {
    /// Validates the client registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration is inconsistent.
    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if self.client_id.is_empty() {
            return Err(ClientValidationError::EmptyClientId);
        }

        if self.name.is_empty() {
            return Err(ClientValidationError::EmptyName);
        }

        if self.allowed_flows.is_empty() {
            return Err(ClientValidationError::NoFlows);
        }

        // Public clients cannot use client_credentials
        if self.client_type.is_public() && self.is_flow_allowed(GrantFlow::ClientCredentials) {
            return Err(ClientValidationError::PublicClientCredentials);
        }

        // Confidential clients must have a client secret
        if !self.client_type.is_public() && self.client_secret.is_none() {
            return Err(ClientValidationError::MissingSecret);
        }

        Ok(())
    }

    #[must_use]
    pub fn is_public(&self) -> bool {
        self.client_type.is_public()
    }

    #[must_use]
    pub fn is_flow_allowed(&self, flow: GrantFlow) -> bool {
        self.allowed_flows.contains(&flow)
    }

    /// Checks if a scope definition may be requested by this client.
    #[must_use]
    pub fn is_scope_allowed(&self, definition: &str) -> bool {
        match &self.scopes {
            None => true,
            Some(allowed) => allowed.iter().any(|s| s == definition),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Errors that can occur during client validation.
#[derive(Debug, thiserror::Error)]
pub enum ClientValidationError {
    #[error("Client ID cannot be empty")]
    EmptyClientId,

    #[error("Client name cannot be empty")]
    EmptyName,

    #[error("At least one flow is required")]
    NoFlows,

    #[error("Public clients cannot use client_credentials grant")]
    PublicClientCredentials,

    #[error("Confidential clients require a client secret")]
    MissingSecret,
}

// =============================================================================
// Tests
// =============================================================================
