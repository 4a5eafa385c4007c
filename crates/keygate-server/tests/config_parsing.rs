use std::{env, fs, time::Duration};

use keygate_auth::config::{AccessTokenFormat, RefreshRotation};
use keygate_auth::types::{ClientType, GrantFlow};
use keygate_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    // Create a temporary TOML configuration file
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("keygate.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081

[logging]
level = "debug"

[auth]
issuer = "https://idp.example.com"

[auth.tokens]
access_token_lifetime = "15m"
access_token_format = "jwt"
signing_algorithm = "ES384"

[auth.refresh]
rotation = "public_clients"

[[scopes]]
name = "openid"

[[scopes]]
name = "read:files/.*"
pattern = true
attributes = ["files"]

[[clients]]
client_id = "service"
secret = "s3cret"
allowed_flows = ["client_credentials"]

[[clients]]
client_id = "spa"
client_type = "public"
redirect_uris = ["https://spa.example.com/cb"]

[users.alice]
groups = ["/staff"]

[users.alice.attributes]
email = ["alice@example.com"]
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");
    assert_eq!(cfg.auth.issuer, "https://idp.example.com");
    assert_eq!(
        cfg.auth.tokens.access_token_lifetime,
        Duration::from_secs(15 * 60)
    );
    assert_eq!(cfg.auth.tokens.access_token_format, AccessTokenFormat::Jwt);
    assert_eq!(cfg.auth.refresh.rotation, RefreshRotation::PublicClients);
    // Unspecified sections keep their defaults
    assert_eq!(cfg.auth.authorize.code_lifetime, Duration::from_secs(600));
    assert_eq!(cfg.scopes.len(), 2);
    assert!(cfg.scopes[1].pattern);
    assert_eq!(cfg.clients.len(), 2);
    assert_eq!(cfg.clients[0].allowed_flows, vec![GrantFlow::ClientCredentials]);
    assert_eq!(cfg.clients[1].client_type, ClientType::Public);
    assert_eq!(
        cfg.users["alice"].attributes["email"],
        vec!["alice@example.com".to_string()]
    );

    // 2) Env override should win over file
    unsafe {
        env::set_var("KEYGATE__SERVER__PORT", "9090");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.server.port, 9090);
    // cleanup env var
    unsafe {
        env::remove_var("KEYGATE__SERVER__PORT");
    }

    // 3) Invalid config (confidential client without a secret) should error
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[[clients]]
client_id = "app"
redirect_uris = ["https://app.example.com/cb"]
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("requires a secret"));

    // 4) An explicitly named file must exist
    let missing = dir.path().join("missing.toml");
    let err = load_config(missing.to_str()).expect_err("expected missing file error");
    assert!(err.contains("not found"));
}
