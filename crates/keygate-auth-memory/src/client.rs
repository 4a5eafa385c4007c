//! In-memory client directory.

use async_trait::async_trait;
use dashmap::DashMap;

use keygate_auth::storage::ClientDirectory;
use keygate_auth::types::Client;
use keygate_auth::{AuthError, AuthResult};

use crate::secret::{hash_secret, verify_secret};

/// Client registrations keyed by client id.
#[derive(Debug, Default)]
pub struct MemoryClientDirectory {
    clients: DashMap<String, Client>,
}

impl MemoryClientDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client, hashing `secret` when one is given.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the registration is invalid and `Internal`
    /// if the secret cannot be hashed.
    pub fn register(&self, mut client: Client, secret: Option<&str>) -> AuthResult<()> {
        if let Some(secret) = secret {
            let hash = hash_secret(secret)
                .map_err(|e| AuthError::internal(format!("Failed to hash client secret: {e}")))?;
            client.client_secret = Some(hash);
        }
        client.validate().map_err(|e| {
            AuthError::configuration(format!("Client '{}': {e}", client.client_id))
        })?;

        tracing::debug!(
            client_id = %client.client_id,
            client_type = ?client.client_type,
            "Client registered"
        );
        self.clients.insert(client.client_id.clone(), client);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[async_trait]
impl ClientDirectory for MemoryClientDirectory {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.get(client_id).map(|entry| entry.value().clone()))
    }

    async fn verify_secret(&self, client_id: &str, secret: &str) -> AuthResult<bool> {
        let Some(hash) = self
            .clients
            .get(client_id)
            .and_then(|entry| entry.client_secret.clone())
        else {
            return Ok(false);
        };
        verify_secret(secret, &hash).map_err(|e| {
            tracing::error!(client_id = %client_id, error = %e, "Stored client secret is not a valid hash");
            AuthError::internal("invalid stored client secret")
        })
    }
}
