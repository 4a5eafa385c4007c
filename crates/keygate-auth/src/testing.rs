//! In-crate mocks of the storage collaborators and a harness wiring them
//! into the token and authorization services.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock, RwLock};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::claims::Attributes;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::http::AuthState;
use crate::oauth::client_auth::{AuthenticatedClient, TokenEndpointAuthMethod};
use crate::oauth::consent::ConsentPreference;
use crate::oauth::context::{AuthorizationContext, ContextHandle};
use crate::oauth::service::{AuthorizationService, AuthorizationStores};
use crate::scope::{ScopeDefinition, ScopeRegistry};
use crate::storage::{
    AttributeQuery, AuthorizationContextStore, ClientDirectory, ConsentPreferenceStorage,
    ObligationSource, RotationOutcome, TokenRepository, UserAttributeSource,
};
use crate::token::factory::AccessTokenFactory;
use crate::token::introspection::IntrospectionService;
use crate::token::jwt::{JwtService, SigningKeyPair};
use crate::token::revocation::RevocationService;
use crate::token::service::TokenService;
use crate::types::{
    AuthorizationCodeRecord, Client, ClientType, GrantFlow, RefreshTokenState, StoredAccessToken,
    StoredRefreshToken,
};

pub(crate) const TEST_ISSUER: &str = "https://idp.example.com";

/// Shared signer; key generation is too slow to repeat per test.
pub(crate) fn test_jwt_service() -> Arc<JwtService> {
    static SERVICE: OnceLock<Arc<JwtService>> = OnceLock::new();
    SERVICE
        .get_or_init(|| {
            let key = SigningKeyPair::generate_ec().unwrap();
            Arc::new(JwtService::new(key, TEST_ISSUER))
        })
        .clone()
}

// =============================================================================
// Clients
// =============================================================================

pub(crate) struct MockClientDirectory {
    clients: RwLock<HashMap<String, (Client, Option<String>)>>,
}

impl MockClientDirectory {
    pub(crate) fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn add(&self, client: Client, secret: Option<&str>) {
        self.clients.write().unwrap().insert(
            client.client_id.clone(),
            (client, secret.map(str::to_string)),
        );
    }
}

#[async_trait]
impl ClientDirectory for MockClientDirectory {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self
            .clients
            .read()
            .unwrap()
            .get(client_id)
            .map(|(client, _)| client.clone()))
    }

    async fn verify_secret(&self, client_id: &str, secret: &str) -> AuthResult<bool> {
        Ok(self
            .clients
            .read()
            .unwrap()
            .get(client_id)
            .and_then(|(_, stored)| stored.as_deref())
            .is_some_and(|stored| stored == secret))
    }
}

pub(crate) fn test_client(client_id: &str, client_type: ClientType) -> Client {
    Client {
        client_id: client_id.to_string(),
        client_secret: None,
        name: client_id.to_string(),
        logo: None,
        client_type,
        redirect_uris: vec!["https://app.example.com/cb".to_string()],
        allowed_flows: vec![
            GrantFlow::AuthorizationCode,
            GrantFlow::Implicit,
            GrantFlow::Hybrid,
        ],
        scopes: None,
        target_group: None,
        active: true,
    }
}

// =============================================================================
// Tokens
// =============================================================================

#[derive(Default)]
struct TokenTables {
    codes: HashMap<String, AuthorizationCodeRecord>,
    access: HashMap<String, StoredAccessToken>,
    refresh: HashMap<String, StoredRefreshToken>,
}

impl TokenTables {
    fn revoke_family(&mut self, family_id: Uuid, client_id: &str) -> usize {
        let mut revoked = 0;
        for token in self.refresh.values_mut() {
            if token.family_id == family_id
                && token.record.client_id == client_id
                && token.state != RefreshTokenState::Revoked
            {
                token.state = RefreshTokenState::Revoked;
                revoked += 1;
            }
        }
        for token in self.access.values_mut() {
            if token.family_id == Some(family_id) {
                token.revoked = true;
            }
        }
        revoked
    }
}

pub(crate) struct MockTokenRepository {
    tables: RwLock<TokenTables>,
}

impl MockTokenRepository {
    pub(crate) fn new() -> Self {
        Self {
            tables: RwLock::new(TokenTables::default()),
        }
    }

    pub(crate) fn refresh_tokens(&self) -> Vec<StoredRefreshToken> {
        self.tables.read().unwrap().refresh.values().cloned().collect()
    }
}

#[async_trait]
impl TokenRepository for MockTokenRepository {
    async fn store_authorization_code(&self, code: &AuthorizationCodeRecord) -> AuthResult<()> {
        self.tables
            .write()
            .unwrap()
            .codes
            .insert(code.code_hash.clone(), code.clone());
        Ok(())
    }

    async fn consume_authorization_code(
        &self,
        code_hash: &str,
    ) -> AuthResult<Option<AuthorizationCodeRecord>> {
        Ok(self.tables.write().unwrap().codes.remove(code_hash))
    }

    async fn store_access_token(&self, token: &StoredAccessToken) -> AuthResult<()> {
        self.tables
            .write()
            .unwrap()
            .access
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_access_token(&self, token_hash: &str) -> AuthResult<Option<StoredAccessToken>> {
        Ok(self.tables.read().unwrap().access.get(token_hash).cloned())
    }

    async fn revoke_access_token(&self, token_hash: &str) -> AuthResult<()> {
        if let Some(token) = self.tables.write().unwrap().access.get_mut(token_hash) {
            token.revoked = true;
        }
        Ok(())
    }

    async fn store_refresh_token(&self, token: &StoredRefreshToken) -> AuthResult<()> {
        self.tables
            .write()
            .unwrap()
            .refresh
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_refresh_token(&self, token_hash: &str) -> AuthResult<Option<StoredRefreshToken>> {
        Ok(self.tables.read().unwrap().refresh.get(token_hash).cloned())
    }

    async fn rotate_refresh_token(
        &self,
        presented_hash: &str,
        replacement: StoredRefreshToken,
    ) -> AuthResult<RotationOutcome> {
        let mut tables = self.tables.write().unwrap();
        let Some(current) = tables.refresh.get_mut(presented_hash) else {
            return Ok(RotationOutcome::NotFound);
        };
        match current.state {
            RefreshTokenState::Active => {
                current.state = RefreshTokenState::Used {
                    superseded_by: replacement.id,
                };
                tables
                    .refresh
                    .insert(replacement.token_hash.clone(), replacement.clone());
                Ok(RotationOutcome::Rotated(Box::new(replacement)))
            }
            RefreshTokenState::Used { .. } => {
                let family_id = current.family_id;
                let client_id = current.record.client_id.clone();
                tables.revoke_family(family_id, &client_id);
                Ok(RotationOutcome::ReuseDetected {
                    family_id,
                    client_id,
                })
            }
            RefreshTokenState::Revoked => Ok(RotationOutcome::Revoked),
        }
    }

    async fn revoke_refresh_family(&self, family_id: Uuid, client_id: &str) -> AuthResult<usize> {
        Ok(self.tables.write().unwrap().revoke_family(family_id, client_id))
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut tables = self.tables.write().unwrap();
        let before = tables.codes.len() + tables.access.len() + tables.refresh.len();
        tables.codes.retain(|_, c| !c.is_expired_at(now));
        tables.access.retain(|_, t| !t.is_expired_at(now));
        tables.refresh.retain(|_, t| !t.is_expired_at(now));
        let after = tables.codes.len() + tables.access.len() + tables.refresh.len();
        Ok((before - after) as u64)
    }
}

// =============================================================================
// Authorization contexts and consent
// =============================================================================

pub(crate) struct MockContextStore {
    contexts: RwLock<HashMap<ContextHandle, AuthorizationContext>>,
}

impl MockContextStore {
    pub(crate) fn new() -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl AuthorizationContextStore for MockContextStore {
    async fn put(&self, context: AuthorizationContext) -> AuthResult<()> {
        self.contexts
            .write()
            .unwrap()
            .insert(context.handle, context);
        Ok(())
    }

    async fn get(&self, handle: &ContextHandle) -> AuthResult<Option<AuthorizationContext>> {
        Ok(self.contexts.read().unwrap().get(handle).cloned())
    }

    async fn take(&self, handle: &ContextHandle) -> AuthResult<Option<AuthorizationContext>> {
        Ok(self.contexts.write().unwrap().remove(handle))
    }
}

pub(crate) struct MockConsentStorage {
    preferences: RwLock<HashMap<(String, String), ConsentPreference>>,
}

impl MockConsentStorage {
    pub(crate) fn new() -> Self {
        Self {
            preferences: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ConsentPreferenceStorage for MockConsentStorage {
    async fn find(&self, subject: &str, client_id: &str) -> AuthResult<Option<ConsentPreference>> {
        Ok(self
            .preferences
            .read()
            .unwrap()
            .get(&(subject.to_string(), client_id.to_string()))
            .cloned())
    }

    async fn save(
        &self,
        subject: &str,
        client_id: &str,
        preference: &ConsentPreference,
    ) -> AuthResult<()> {
        self.preferences.write().unwrap().insert(
            (subject.to_string(), client_id.to_string()),
            preference.clone(),
        );
        Ok(())
    }

    async fn remove(&self, subject: &str, client_id: &str) -> AuthResult<()> {
        self.preferences
            .write()
            .unwrap()
            .remove(&(subject.to_string(), client_id.to_string()));
        Ok(())
    }
}

// =============================================================================
// Users
// =============================================================================

pub(crate) struct MockAttributeSource {
    users: RwLock<HashMap<String, Attributes>>,
    denied: RwLock<HashSet<String>>,
}

impl MockAttributeSource {
    pub(crate) fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            denied: RwLock::new(HashSet::new()),
        }
    }

    pub(crate) fn set(&self, subject: &str, attributes: &[(&str, &[&str])]) {
        let attributes = attributes
            .iter()
            .map(|(name, values)| {
                (
                    (*name).to_string(),
                    values.iter().map(|v| (*v).to_string()).collect(),
                )
            })
            .collect();
        self.users
            .write()
            .unwrap()
            .insert(subject.to_string(), attributes);
    }

    pub(crate) fn deny(&self, subject: &str) {
        self.denied.write().unwrap().insert(subject.to_string());
    }
}

#[async_trait]
impl UserAttributeSource for MockAttributeSource {
    async fn resolve(&self, query: AttributeQuery<'_>) -> AuthResult<Attributes> {
        if self.denied.read().unwrap().contains(query.subject) {
            return Err(AuthError::access_denied(format!(
                "{} may not authorize {}",
                query.subject, query.client_id
            )));
        }
        Ok(self
            .users
            .read()
            .unwrap()
            .get(query.subject)
            .cloned()
            .unwrap_or_default())
    }
}

pub(crate) struct MockObligations {
    enquiries: RwLock<HashSet<String>>,
    policies: RwLock<HashSet<(String, String)>>,
}

impl MockObligations {
    pub(crate) fn new() -> Self {
        Self {
            enquiries: RwLock::new(HashSet::new()),
            policies: RwLock::new(HashSet::new()),
        }
    }

    pub(crate) fn add_enquiry(&self, subject: &str) {
        self.enquiries.write().unwrap().insert(subject.to_string());
    }

    pub(crate) fn add_policy(&self, subject: &str, client_id: &str) {
        self.policies
            .write()
            .unwrap()
            .insert((subject.to_string(), client_id.to_string()));
    }
}

#[async_trait]
impl ObligationSource for MockObligations {
    async fn has_pending_enquiry(&self, subject: &str) -> AuthResult<bool> {
        Ok(self.enquiries.read().unwrap().contains(subject))
    }

    async fn has_unaccepted_policy(&self, subject: &str, client_id: &str) -> AuthResult<bool> {
        Ok(self
            .policies
            .read()
            .unwrap()
            .contains(&(subject.to_string(), client_id.to_string())))
    }
}

// =============================================================================
// Harness
// =============================================================================

pub(crate) fn test_registry() -> ScopeRegistry {
    ScopeRegistry::new(vec![
        ScopeDefinition::exact("openid", &[]),
        ScopeDefinition::exact("profile", &["email", "name"]),
        ScopeDefinition::exact("offline_access", &[]),
        ScopeDefinition::exact("token-exchange", &[]),
        ScopeDefinition::exact("bar", &[]),
        ScopeDefinition::exact("foo", &[]),
        ScopeDefinition::pattern("read:files/.*", &[]).unwrap(),
    ])
}

/// Token and authorization services over fresh mocks.
pub(crate) struct TestHarness {
    pub(crate) config: AuthConfig,
    pub(crate) scopes: Arc<ScopeRegistry>,
    pub(crate) clients: Arc<MockClientDirectory>,
    pub(crate) tokens: Arc<MockTokenRepository>,
    pub(crate) contexts: Arc<MockContextStore>,
    pub(crate) consents: Arc<MockConsentStorage>,
    pub(crate) attributes: Arc<MockAttributeSource>,
    pub(crate) obligations: Arc<MockObligations>,
    pub(crate) jwt: Arc<JwtService>,
    pub(crate) service: Arc<TokenService>,
    pub(crate) authorization: Arc<AuthorizationService>,
}

impl TestHarness {
    pub(crate) fn new() -> Self {
        let mut config = AuthConfig::default();
        config.issuer = TEST_ISSUER.to_string();

        let clients = Arc::new(MockClientDirectory::new());
        clients.add(test_client("client", ClientType::Confidential), Some("secret"));
        clients.add(test_client("public", ClientType::Public), None);
        let mut service_client = test_client("service", ClientType::Confidential);
        service_client.allowed_flows = vec![GrantFlow::ClientCredentials];
        clients.add(service_client, Some("secret"));

        let scopes = Arc::new(test_registry());
        let tokens = Arc::new(MockTokenRepository::new());
        let contexts = Arc::new(MockContextStore::new());
        let consents = Arc::new(MockConsentStorage::new());
        let attributes = Arc::new(MockAttributeSource::new());
        let obligations = Arc::new(MockObligations::new());
        let jwt = test_jwt_service();
        let (service, authorization) = build(
            &config, &scopes, &clients, &tokens, &contexts, &consents, &attributes,
            &obligations, &jwt,
        );

        Self {
            config,
            scopes,
            clients,
            tokens,
            contexts,
            consents,
            attributes,
            obligations,
            jwt,
            service,
            authorization,
        }
    }

    /// Changes the configuration and rebuilds the services over the same
    /// storages.
    pub(crate) fn set_config(&mut self, change: impl FnOnce(&mut AuthConfig)) {
        change(&mut self.config);
        let (service, authorization) = build(
            &self.config,
            &self.scopes,
            &self.clients,
            &self.tokens,
            &self.contexts,
            &self.consents,
            &self.attributes,
            &self.obligations,
            &self.jwt,
        );
        self.service = service;
        self.authorization = authorization;
    }

    /// Endpoint state over the harness services and storages.
    pub(crate) fn state(&self) -> AuthState {
        let config = Arc::new(self.config.clone());
        AuthState {
            authorization: self.authorization.clone(),
            tokens: self.service.clone(),
            introspection: Arc::new(IntrospectionService::new(self.tokens.clone())),
            revocation: Arc::new(RevocationService::new(config.clone(), self.tokens.clone())),
            clients: self.clients.clone(),
            jwt: self.jwt.clone(),
            config,
        }
    }

    pub(crate) fn confidential_client(&self) -> AuthenticatedClient {
        AuthenticatedClient {
            client: test_client("client", ClientType::Confidential),
            auth_method: TokenEndpointAuthMethod::ClientSecretBasic,
        }
    }

    pub(crate) fn public_client(&self) -> AuthenticatedClient {
        AuthenticatedClient {
            client: test_client("public", ClientType::Public),
            auth_method: TokenEndpointAuthMethod::None,
        }
    }

    pub(crate) fn service_client(&self) -> AuthenticatedClient {
        let mut client = test_client("service", ClientType::Confidential);
        client.allowed_flows = vec![GrantFlow::ClientCredentials];
        AuthenticatedClient {
            client,
            auth_method: TokenEndpointAuthMethod::ClientSecretPost,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build(
    config: &AuthConfig,
    scopes: &Arc<ScopeRegistry>,
    clients: &Arc<MockClientDirectory>,
    tokens: &Arc<MockTokenRepository>,
    contexts: &Arc<MockContextStore>,
    consents: &Arc<MockConsentStorage>,
    attributes: &Arc<MockAttributeSource>,
    obligations: &Arc<MockObligations>,
    jwt: &Arc<JwtService>,
) -> (Arc<TokenService>, Arc<AuthorizationService>) {
    let config = Arc::new(config.clone());
    let factory = Arc::new(AccessTokenFactory::new(
        config.clone(),
        jwt.clone(),
        tokens.clone(),
    ));
    let service = TokenService::new(
        config.clone(),
        scopes.clone(),
        tokens.clone(),
        attributes.clone(),
        factory.clone(),
    );
    let authorization = AuthorizationService::new(
        config,
        scopes.clone(),
        AuthorizationStores {
            clients: clients.clone(),
            contexts: contexts.clone(),
            consents: consents.clone(),
            obligations: obligations.clone(),
            attributes: attributes.clone(),
            tokens: tokens.clone(),
        },
        factory,
    );
    (Arc::new(service), Arc::new(authorization))
}
