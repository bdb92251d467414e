//! HTTP server assembly for the session store.
//!
//! Wraps [`simstore_api::api_router`] with the transport layers the binaries
//! need (CORS, request tracing) and owns the runtime configuration.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::Router;
use serde::Deserialize;
use simstore_store_sqlite::SqliteStore;
use tower_http::{
  cors::{Any, CorsLayer},
  trace::TraceLayer,
};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `SIMSTORE_*` environment variables. Every field is optional.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub database_path:      PathBuf,
  pub default_list_limit: usize,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:               "127.0.0.1".to_string(),
      port:               8000,
      database_path:      PathBuf::from("sessions.db"),
      default_list_limit: simstore_api::DEFAULT_LIST_LIMIT,
    }
  }
}

impl ServerConfig {
  /// Layer the optional TOML file at `path` under `SIMSTORE_*` variables.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("SIMSTORE"))
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router: the JSON API behind permissive CORS
/// and per-request tracing.
pub fn router(store: Arc<SqliteStore>, config: &ServerConfig) -> Router {
  let cors = CorsLayer::new()
    .allow_origin(Any)
    .allow_methods(Any)
    .allow_headers(Any);

  simstore_api::api_router(store, config.default_list_limit)
    .layer(cors)
    .layer(TraceLayer::new_for_http())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
