use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::PathBuf;

use keygate_auth::config::AuthConfig;
use keygate_auth::scope::ScopeConfig;
use keygate_auth::types::{Client, ClientType, GrantFlow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Authorization server core configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Token signing key material
    #[serde(default)]
    pub signing: SigningConfig,
    /// Scope registry, in matching order
    #[serde(default = "default_scopes")]
    pub scopes: Vec<ScopeConfig>,
    /// Registered OAuth clients
    #[serde(default)]
    pub clients: Vec<ClientSettings>,
    /// Static users served by the in-memory attribute source, keyed by subject
    #[serde(default)]
    pub users: BTreeMap<String, UserSettings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            auth: AuthConfig::default(),
            signing: SigningConfig::default(),
            scopes: default_scopes(),
            clients: Vec::new(),
            users: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.trusted_user_header.trim().is_empty() {
            return Err("server.trusted_user_header cannot be empty".into());
        }
        if self.server.cleanup_interval.is_zero() {
            return Err("server.cleanup_interval must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Core configuration
        self.auth.validate().map_err(|e| format!("auth: {e}"))?;
        // Signing material
        if self.signing.public_key_path.is_some() && self.signing.private_key_path.is_none() {
            return Err("signing.public_key_path requires signing.private_key_path".into());
        }
        if self.signing.key_id.trim().is_empty() {
            return Err("signing.key_id cannot be empty".into());
        }
        // Scopes
        let mut names = HashSet::new();
        for scope in &self.scopes {
            if !names.insert(scope.name.as_str()) {
                return Err(format!("scope '{}' is defined more than once", scope.name));
            }
        }
        // Clients
        let mut ids = HashSet::new();
        for client in &self.clients {
            if !ids.insert(client.client_id.as_str()) {
                return Err(format!(
                    "client '{}' is registered more than once",
                    client.client_id
                ));
            }
            match (client.client_type, client.secret.as_deref()) {
                (ClientType::Confidential, None | Some("")) => {
                    return Err(format!(
                        "confidential client '{}' requires a secret",
                        client.client_id
                    ));
                }
                (ClientType::Public, Some(_)) => {
                    return Err(format!(
                        "public client '{}' cannot have a secret",
                        client.client_id
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Header carrying the subject authenticated by the fronting login
    /// service. Requests without it reach the interactive endpoints as
    /// anonymous.
    #[serde(default = "default_trusted_user_header")]
    pub trusted_user_header: String,
    /// Optional companion header with the authentication instant in Unix
    /// seconds. The request time is used when it is absent.
    #[serde(default = "default_trusted_auth_time_header")]
    pub trusted_auth_time_header: String,
    /// How often expired tokens and authorization contexts are purged.
    #[serde(default = "default_cleanup_interval", with = "humantime_serde")]
    pub cleanup_interval: std::time::Duration,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_trusted_user_header() -> String {
    "x-authenticated-user".into()
}
fn default_trusted_auth_time_header() -> String {
    "x-authenticated-at".into()
}
fn default_cleanup_interval() -> std::time::Duration {
    std::time::Duration::from_secs(60)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            trusted_user_header: default_trusted_user_header(),
            trusted_auth_time_header: default_trusted_auth_time_header(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Signing key material.
///
/// The algorithm is `auth.tokens.signing_algorithm`. Without a private key
/// an ephemeral key is generated at start-up; tokens signed with it do not
/// survive a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// `kid` of a loaded key. Generated keys get a random id.
    #[serde(default = "default_key_id")]
    pub key_id: String,
    /// PKCS#8 PEM private key (SEC1 is also accepted for EC keys).
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    /// SPKI PEM public key; required for RSA keys.
    #[serde(default)]
    pub public_key_path: Option<PathBuf>,
}

fn default_key_id() -> String {
    "keygate-1".into()
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            key_id: default_key_id(),
            private_key_path: None,
            public_key_path: None,
        }
    }
}

fn default_scopes() -> Vec<ScopeConfig> {
    let scope = |name: &str, attributes: &[&str]| ScopeConfig {
        name: name.to_string(),
        description: String::new(),
        attributes: attributes.iter().map(|a| (*a).to_string()).collect(),
        pattern: false,
        enabled: true,
    };
    vec![
        scope("openid", &[]),
        scope("profile", &["name", "given_name", "family_name"]),
        scope("email", &["email", "email_verified"]),
        scope("offline_access", &[]),
        scope(keygate_auth::config::DEFAULT_EXCHANGE_SCOPE, &[]),
    ]
}

/// A client registration with its plaintext secret.
///
/// Only the Argon2 hash of the secret reaches the client directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub client_id: String,
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub client_type: ClientType,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default = "default_flows")]
    pub allowed_flows: Vec<GrantFlow>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(default)]
    pub target_group: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_flows() -> Vec<GrantFlow> {
    vec![GrantFlow::AuthorizationCode]
}
fn default_active() -> bool {
    true
}

impl ClientSettings {
    /// The registration without its secret.
    pub fn to_client(&self) -> Client {
        Client {
            client_id: self.client_id.clone(),
            client_secret: None,
            name: self.name.clone().unwrap_or_else(|| self.client_id.clone()),
            logo: self.logo.clone(),
            client_type: self.client_type,
            redirect_uris: self.redirect_uris.clone(),
            allowed_flows: self.allowed_flows.clone(),
            scopes: self.scopes.clone(),
            target_group: self.target_group.clone(),
            active: self.active,
        }
    }
}

/// A static user: attributes released through scopes, and group paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub groups: Vec<String>,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    pub const DEFAULT_CONFIG_PATH: &str = "keygate.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            return Err(format!("config file not found: {}", pathbuf.display()));
        }
        // Environment variable overrides, e.g., KEYGATE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("KEYGATE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
