//! In-memory consent preference storage.

use async_trait::async_trait;
use dashmap::DashMap;

use keygate_auth::AuthResult;
use keygate_auth::oauth::ConsentPreference;
use keygate_auth::storage::ConsentPreferenceStorage;

/// Remembered consent answers keyed by (subject, client id).
#[derive(Debug, Default)]
pub struct MemoryConsentStorage {
    preferences: DashMap<(String, String), ConsentPreference>,
}

impl MemoryConsentStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(subject: &str, client_id: &str) -> (String, String) {
    (subject.to_string(), client_id.to_string())
}

#[async_trait]
impl ConsentPreferenceStorage for MemoryConsentStorage {
    async fn find(&self, subject: &str, client_id: &str) -> AuthResult<Option<ConsentPreference>> {
        Ok(self
            .preferences
            .get(&key(subject, client_id))
            .map(|entry| entry.value().clone()))
    }

    async fn save(
        &self,
        subject: &str,
        client_id: &str,
        preference: &ConsentPreference,
    ) -> AuthResult<()> {
        self.preferences
            .insert(key(subject, client_id), preference.clone());
        Ok(())
    }

    async fn remove(&self, subject: &str, client_id: &str) -> AuthResult<()> {
        self.preferences.remove(&key(subject, client_id));
        Ok(())
    }
}
