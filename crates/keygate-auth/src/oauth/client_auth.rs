//! Client authentication for the token, introspection and revocation
//! endpoints.
//!
//! # Authentication Methods
//!
//! - `none` - Public clients (client_id only)
//! - `client_secret_basic` - HTTP Basic Auth with client_id:client_secret
//! - `client_secret_post` - client_id and client_secret in request body
//!
//! # Authentication Priority
//!
//! When multiple authentication methods are present, they are tried in order:
//! 1. HTTP Basic Auth header
//! 2. client_secret_post (body parameters)
//! 3. Public client (client_id only)

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::ClientDirectory;
use crate::types::Client;

/// Credentials presented by a caller, before verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientCredentials {
    /// Credentials from the `Authorization: Basic` header.
    pub basic: Option<(String, String)>,
    /// `client_id` form parameter.
    pub client_id: Option<String>,
    /// `client_secret` form parameter.
    pub client_secret: Option<String>,
}

impl ClientCredentials {
    /// Returns the client id the caller claims, from whichever source.
    #[must_use]
    pub fn claimed_client_id(&self) -> Option<&str> {
        self.basic
            .as_ref()
            .map(|(id, _)| id.as_str())
            .or(self.client_id.as_deref())
    }

    /// Returns `true` if any secret was presented.
    #[must_use]
    pub fn has_secret(&self) -> bool {
        self.basic.is_some() || self.client_secret.is_some()
    }
}

/// Result of successful client authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    pub client: Client,
    pub auth_method: TokenEndpointAuthMethod,
}

impl AuthenticatedClient {
    /// Returns `true` if the caller proved possession of a secret.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.auth_method != TokenEndpointAuthMethod::None
    }
}

/// Token endpoint authentication methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    None,
    ClientSecretBasic,
    ClientSecretPost,
}

impl TokenEndpointAuthMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
        }
    }
}

impl fmt::Display for TokenEndpointAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authenticates a client from the presented credentials.
///
/// # Errors
///
/// Returns `invalid_client` if:
/// - No client identifier is presented
/// - The client is unknown or inactive
/// - A confidential client presents no secret or a wrong one
/// - A public client presents a secret
pub async fn authenticate_client(
    credentials: &ClientCredentials,
    directory: &dyn ClientDirectory,
) -> AuthResult<AuthenticatedClient> {
    if let Some((client_id, secret)) = &credentials.basic {
        if credentials
            .client_id
            .as_deref()
            .is_some_and(|id| id != client_id)
        {
            return Err(AuthError::invalid_client(
                "client_id does not match the authenticated client",
            ));
        }
        return authenticate_with_secret(
            client_id,
            secret,
            TokenEndpointAuthMethod::ClientSecretBasic,
            directory,
        )
        .await;
    }

    if let (Some(client_id), Some(secret)) = (&credentials.client_id, &credentials.client_secret)
    {
        return authenticate_with_secret(
            client_id,
            secret,
            TokenEndpointAuthMethod::ClientSecretPost,
            directory,
        )
        .await;
    }

    if let Some(client_id) = &credentials.client_id {
        return authenticate_public(client_id, directory).await;
    }

    Err(AuthError::invalid_client("No client credentials provided"))
}

async fn find_active(client_id: &str, directory: &dyn ClientDirectory) -> AuthResult<Client> {
    let client = directory
        .find_by_client_id(client_id)
        .await?
        .ok_or_else(|| AuthError::invalid_client("Unknown client"))?;

    if !client.active {
        return Err(AuthError::invalid_client("Client is inactive"));
    }
    Ok(client)
}

async fn authenticate_with_secret(
    client_id: &str,
    secret: &str,
    method: TokenEndpointAuthMethod,
    directory: &dyn ClientDirectory,
) -> AuthResult<AuthenticatedClient> {
    let client = find_active(client_id, directory).await?;

    if client.is_public() {
        return Err(AuthError::invalid_client(format!(
            "Public clients cannot use {method} authentication"
        )));
    }

    if !directory.verify_secret(client_id, secret).await? {
        tracing::warn!(client_id = %client_id, method = %method, "Client secret rejected");
        return Err(AuthError::invalid_client("Invalid client secret"));
    }

    Ok(AuthenticatedClient {
        client,
        auth_method: method,
    })
}

async fn authenticate_public(
    client_id: &str,
    directory: &dyn ClientDirectory,
) -> AuthResult<AuthenticatedClient> {
    let client = find_active(client_id, directory).await?;

    if !client.is_public() {
        return Err(AuthError::invalid_client(
            "Confidential clients must provide client credentials",
        ));
    }

    Ok(AuthenticatedClient {
        client,
        auth_method: TokenEndpointAuthMethod::None,
    })
}

/// Parses an `Authorization: Basic` header value into `(client_id, secret)`.
///
/// # Errors
///
/// Returns a description of the malformation.
pub fn parse_basic_auth(header: &str) -> Result<(String, String), String> {
    let credentials = header
        .strip_prefix("Basic ")
        .ok_or_else(|| "Authorization header must start with 'Basic '".to_string())?;

    let decoded = STANDARD
        .decode(credentials.trim())
        .map_err(|_| "Invalid base64 encoding in Authorization header".to_string())?;

    let credentials_str = String::from_utf8(decoded)
        .map_err(|_| "Invalid UTF-8 in decoded credentials".to_string())?;

    let (client_id, secret) = credentials_str
        .split_once(':')
        .ok_or_else(|| "Credentials must be in format 'id:secret'".to_string())?;

    Ok((client_id.to_string(), secret.to_string()))
}
