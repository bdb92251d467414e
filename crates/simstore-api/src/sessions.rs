//! Handlers for `/sessions` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/sessions` | Optional `?limit=N`, newest first |
//! | `POST`   | `/sessions` | Body: full session document; 400 without `session_metadata.session_id` |
//! | `POST`   | `/sessions/normalize` | Re-normalizes every stored session |
//! | `GET`    | `/sessions/latest` | Summary of the newest session; 404 if empty |
//! | `GET`    | `/sessions/latest/normalized` | Projection of the newest session; 404 if empty |
//! | `GET`    | `/sessions/{id}` | Raw document; 404 if not found |
//! | `DELETE` | `/sessions/{id}` | Removes the session and its derived rows; 404 if not found |
//! | `GET`    | `/sessions/{id}/normalized` | Relational projection; 404 if not found |
//! | `POST`   | `/sessions/{id}/normalize` | Re-normalizes from the stored payload; 404 if not found |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use simstore_core::{
  document::require_session_id,
  session::{IngestOutcome, NormalizeCounts, NormalizedSession, SessionSummary},
  store::SessionStore,
};

use crate::{ApiState, error::ApiError};

/// Body returned by the single-session write endpoints.
#[derive(Debug, Serialize)]
pub struct NormalizeResponse {
  pub ok:         bool,
  pub session_id: String,
  pub counts:     NormalizeCounts,
}

impl From<IngestOutcome> for NormalizeResponse {
  fn from(outcome: IngestOutcome) -> Self {
    Self { ok: true, session_id: outcome.session_id, counts: outcome.counts }
  }
}

/// Body returned by `POST /sessions/normalize`.
#[derive(Debug, Serialize)]
pub struct NormalizeAllResponse {
  pub ok:        bool,
  pub processed: usize,
  pub results:   Vec<IngestOutcome>,
}

fn not_found(session_id: &str) -> ApiError {
  ApiError::NotFound(format!("session {session_id} not found"))
}

fn empty_store() -> ApiError { ApiError::NotFound("no sessions stored".into()) }

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub limit: Option<usize>,
}

/// `GET /sessions[?limit=N]`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<SessionSummary>>, ApiError>
where
  S: SessionStore,
{
  let limit = params.limit.unwrap_or(state.default_limit);
  let summaries = state
    .store
    .list_summaries(limit)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(summaries))
}

// ─── Ingest ───────────────────────────────────────────────────────────────────

/// `POST /sessions`. Body: a full session document.
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(document): Json<Value>,
) -> Result<Json<NormalizeResponse>, ApiError>
where
  S: SessionStore,
{
  // Validate before any storage write.
  require_session_id(&document)?;

  let outcome = state.store.ingest(document).await.map_err(ApiError::store)?;
  tracing::info!(session_id = %outcome.session_id, "ingested session");
  Ok(Json(outcome.into()))
}

// ─── Re-normalize ─────────────────────────────────────────────────────────────

/// `POST /sessions/normalize`
pub async fn normalize_all<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<NormalizeAllResponse>, ApiError>
where
  S: SessionStore,
{
  let results = state.store.normalize_all().await.map_err(ApiError::store)?;
  Ok(Json(NormalizeAllResponse { ok: true, processed: results.len(), results }))
}

/// `POST /sessions/{id}/normalize`
pub async fn normalize_one<S>(
  State(state): State<ApiState<S>>,
  Path(session_id): Path<String>,
) -> Result<Json<NormalizeResponse>, ApiError>
where
  S: SessionStore,
{
  let counts = state
    .store
    .normalize_existing(&session_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| not_found(&session_id))?;
  Ok(Json(NormalizeResponse { ok: true, session_id, counts }))
}

// ─── Single session ───────────────────────────────────────────────────────────

/// `GET /sessions/{id}`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError>
where
  S: SessionStore,
{
  state
    .store
    .get_raw(&session_id)
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| not_found(&session_id))
}

/// `GET /sessions/{id}/normalized`
pub async fn get_normalized<S>(
  State(state): State<ApiState<S>>,
  Path(session_id): Path<String>,
) -> Result<Json<NormalizedSession>, ApiError>
where
  S: SessionStore,
{
  state
    .store
    .get_normalized(&session_id)
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| not_found(&session_id))
}

/// `DELETE /sessions/{id}`
pub async fn delete_one<S>(
  State(state): State<ApiState<S>>,
  Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError>
where
  S: SessionStore,
{
  let deleted = state
    .store
    .delete_session(&session_id)
    .await
    .map_err(ApiError::store)?;
  if !deleted {
    return Err(not_found(&session_id));
  }
  tracing::info!(%session_id, "deleted session");
  Ok(Json(json!({ "ok": true })))
}

// ─── Latest ───────────────────────────────────────────────────────────────────

async fn latest_id<S>(store: &S) -> Result<String, ApiError>
where
  S: SessionStore,
{
  store
    .get_latest_summary()
    .await
    .map_err(ApiError::store)?
    .map(|summary| summary.session_id)
    .ok_or_else(empty_store)
}

/// `GET /sessions/latest`
pub async fn latest<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<SessionSummary>, ApiError>
where
  S: SessionStore,
{
  state
    .store
    .get_latest_summary()
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(empty_store)
}

/// `GET /sessions/latest/normalized`
pub async fn latest_normalized<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<NormalizedSession>, ApiError>
where
  S: SessionStore,
{
  let session_id = latest_id(state.store.as_ref()).await?;
  state
    .store
    .get_normalized(&session_id)
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(empty_store)
}
