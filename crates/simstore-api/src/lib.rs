//! JSON REST API for the session store.
//!
//! Exposes an axum [`Router`] backed by any [`simstore_core::store::SessionStore`].
//! CORS, tracing and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .merge(simstore_api::api_router(store.clone(), 100))
//! ```

pub mod error;
pub mod sessions;

use std::sync::Arc;

use axum::{
  Json, Router,
  routing::{get, post},
};
use serde_json::{Value, json};
use simstore_core::store::SessionStore;

pub use error::ApiError;

/// Number of summaries `GET /sessions` returns when no `limit` is given.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// State shared by every handler.
#[derive(Clone)]
pub struct ApiState<S> {
  pub store:         Arc<S>,
  pub default_limit: usize,
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>, default_limit: usize) -> Router<()>
where
  S: SessionStore + Clone + Send + Sync + 'static,
{
  Router::new()
    .route("/health", get(health))
    // Collection
    .route("/sessions", get(sessions::list::<S>).post(sessions::create::<S>))
    .route("/sessions/normalize", post(sessions::normalize_all::<S>))
    // Latest
    .route("/sessions/latest", get(sessions::latest::<S>))
    .route("/sessions/latest/normalized", get(sessions::latest_normalized::<S>))
    // Single session
    .route(
      "/sessions/{id}",
      get(sessions::get_one::<S>).delete(sessions::delete_one::<S>),
    )
    .route("/sessions/{id}/normalized", get(sessions::get_normalized::<S>))
    .route("/sessions/{id}/normalize", post(sessions::normalize_one::<S>))
    .with_state(ApiState { store, default_limit })
}

/// `GET /health`
async fn health() -> Json<Value> { Json(json!({ "ok": true })) }
