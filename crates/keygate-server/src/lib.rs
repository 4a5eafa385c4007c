//! Keygate authorization server binary support.
//!
//! Loads [`AppConfig`], seeds the in-memory storage, loads or generates the
//! signing key and serves the OAuth 2.0 endpoints. End users are
//! authenticated upstream; the login service forwards the subject in a
//! trusted header.

pub mod config;
pub mod observability;
pub mod server;

pub use config::{AppConfig, ClientSettings, LoggingConfig, ServerConfig, SigningConfig, UserSettings};
pub use observability::{apply_logging_level, init_tracing};
pub use server::{AppState, KeygateServer, ServerBuilder, build_app};
