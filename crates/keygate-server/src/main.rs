use std::path::PathBuf;

use clap::Parser;
use keygate_server::config::loader::{DEFAULT_CONFIG_PATH, load_config_with_default_path};
use keygate_server::{ServerBuilder, apply_logging_level, init_tracing};

#[derive(Debug, Parser)]
#[command(name = "keygate-server", version, about = "OAuth 2.0 / OpenID Connect authorization server")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "KEYGATE_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before clap reads KEYGATE_CONFIG
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();
    init_tracing();

    let source = cli
        .config
        .as_deref()
        .map_or_else(|| format!("{DEFAULT_CONFIG_PATH} (default)"), |p| p.display().to_string());
    let cfg = match load_config_with_default_path(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error ({source}): {e}");
            std::process::exit(2);
        }
    };
    apply_logging_level(&cfg.logging.level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("KEYGATE_GIT_COMMIT"),
        config = %source,
        issuer = %cfg.auth.issuer,
        "Configuration loaded"
    );

    let server = ServerBuilder::new().with_config(cfg).build()?;
    server.run().await
}
