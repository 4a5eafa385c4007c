use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderMap, HeaderName},
    middleware::{self, Next},
    response::Response,
};
use keygate_auth::{
    AuthState, ScopeRegistry,
    oauth::{AuthenticatedUser, AuthorizationService},
    storage::TokenRepository,
    token::{
        AccessTokenFactory, IntrospectionService, JwtService, RevocationService,
        SigningAlgorithm, SigningKeyPair, TokenService,
    },
};
use keygate_auth_memory::{MemoryAuthStorage, StaticUser};
use time::OffsetDateTime;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;

/// Endpoint state plus the storage it runs on.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub storage: MemoryAuthStorage,
}

impl AppState {
    /// Wires the services over fresh in-memory storage seeded from `cfg`.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(cfg.auth.clone());
        let scopes = Arc::new(
            ScopeRegistry::from_configs(cfg.scopes.clone()).context("invalid scope definition")?,
        );

        let storage = MemoryAuthStorage::new();
        for settings in &cfg.clients {
            storage
                .clients
                .register(settings.to_client(), settings.secret.as_deref())
                .with_context(|| format!("registering client '{}'", settings.client_id))?;
        }
        for (subject, user) in &cfg.users {
            storage.attributes.insert(
                subject.clone(),
                StaticUser {
                    attributes: user.attributes.clone(),
                    groups: user.groups.clone(),
                },
            );
        }
        tracing::info!(
            clients = storage.clients.len(),
            users = cfg.users.len(),
            scopes = cfg.scopes.len(),
            "In-memory storage seeded"
        );

        let jwt = Arc::new(JwtService::new(load_signing_key(cfg)?, cfg.auth.issuer.clone()));
        let factory = Arc::new(AccessTokenFactory::new(
            config.clone(),
            jwt.clone(),
            storage.tokens.clone(),
        ));
        let tokens = Arc::new(TokenService::new(
            config.clone(),
            scopes.clone(),
            storage.tokens.clone(),
            storage.attributes.clone(),
            factory.clone(),
        ));
        let authorization = Arc::new(AuthorizationService::new(
            config.clone(),
            scopes,
            storage.stores(),
            factory,
        ));

        let auth = AuthState {
            introspection: Arc::new(IntrospectionService::new(storage.tokens.clone())),
            revocation: Arc::new(RevocationService::new(
                config.clone(),
                storage.tokens.clone(),
            )),
            clients: storage.clients.clone(),
            config,
            authorization,
            tokens,
            jwt,
        };
        Ok(Self { auth, storage })
    }
}

/// Reads the configured key, or generates an ephemeral one.
fn load_signing_key(cfg: &AppConfig) -> anyhow::Result<SigningKeyPair> {
    let algorithm = SigningAlgorithm::parse(&cfg.auth.tokens.signing_algorithm)?;
    let Some(private_path) = &cfg.signing.private_key_path else {
        tracing::warn!(
            algorithm = algorithm.as_str(),
            "No signing key configured, generating an ephemeral key"
        );
        return Ok(SigningKeyPair::generate(algorithm)?);
    };

    let private_pem = std::fs::read_to_string(private_path)
        .with_context(|| format!("reading {}", private_path.display()))?;
    let public_pem = cfg
        .signing
        .public_key_path
        .as_ref()
        .map(|path| {
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
        })
        .transpose()?;

    let key = SigningKeyPair::from_pem(
        cfg.signing.key_id.clone(),
        algorithm,
        &private_pem,
        public_pem.as_deref(),
    )
    .with_context(|| format!("loading signing key from {}", private_path.display()))?;
    tracing::info!(kid = %key.kid, algorithm = algorithm.as_str(), "Signing key loaded");
    Ok(key)
}

/// Names of the headers set by the fronting login service.
#[derive(Clone)]
struct TrustedHeaders {
    user: HeaderName,
    auth_time: HeaderName,
}

/// Turns the trusted user header into an [`AuthenticatedUser`] extension.
///
/// Any extension already present is dropped so only the header decides.
async fn authenticated_user(
    State(names): State<TrustedHeaders>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().remove::<AuthenticatedUser>();
    if let Some(user) = user_from_headers(&names, request.headers()) {
        tracing::debug!(subject = %user.subject, "Request carries an authenticated user");
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}

fn user_from_headers(names: &TrustedHeaders, headers: &HeaderMap) -> Option<AuthenticatedUser> {
    let subject = headers
        .get(&names.user)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())?;
    let auth_time = headers
        .get(&names.auth_time)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .unwrap_or_else(OffsetDateTime::now_utc);
    Some(AuthenticatedUser {
        subject: subject.to_string(),
        auth_time,
    })
}

pub fn build_app(cfg: &AppConfig, state: &AppState) -> anyhow::Result<Router> {
    let names = TrustedHeaders {
        user: HeaderName::from_bytes(cfg.server.trusted_user_header.as_bytes())
            .context("server.trusted_user_header is not a valid header name")?,
        auth_time: HeaderName::from_bytes(cfg.server.trusted_auth_time_header.as_bytes())
            .context("server.trusted_auth_time_header is not a valid header name")?,
    };

    Ok(keygate_auth::router(state.auth.clone())
        .layer(middleware::from_fn_with_state(names, authenticated_user))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    // Query strings carry codes and state; only the path is recorded
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        ))
}

/// Periodically drops expired tokens, codes and authorization contexts.
fn spawn_cleanup(storage: MemoryAuthStorage, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let now = OffsetDateTime::now_utc();
            let contexts = storage.contexts.purge_expired(now);
            match storage.tokens.cleanup_expired(now).await {
                Ok(tokens) if tokens > 0 || contexts > 0 => {
                    tracing::debug!(tokens, contexts, "Expired entries purged");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Token cleanup failed"),
            }
        }
    })
}

pub struct KeygateServer {
    addr: SocketAddr,
    app: Router,
    storage: MemoryAuthStorage,
    cleanup_interval: Duration,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> anyhow::Result<KeygateServer> {
        let state = AppState::from_config(&self.config)?;
        let app = build_app(&self.config, &state)?;

        Ok(KeygateServer {
            addr: self.addr,
            app,
            storage: state.storage,
            cleanup_interval: self.config.server.cleanup_interval,
        })
    }
}

impl KeygateServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let cleanup = spawn_cleanup(self.storage, self.cleanup_interval);
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;
        cleanup.abort();
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
