//! The `SessionStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `simstore-store-sqlite`).
//! Higher layers (`simstore-api`, the server binary) depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::session::{
  IngestOutcome, Mechanic, NormalizeCounts, NormalizedSession, SessionSummary,
  Stakeholder, User, Version,
};

/// Abstraction over a session store backend.
///
/// Lookups of unknown sessions return `Ok(None)` rather than an error; the
/// caller decides whether that is a not-found condition.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait SessionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Persist `document` and replace all rows derived from it, atomically.
  ///
  /// `created_at` is recorded on the session row as given. Fails with a
  /// validation error if the document has no `session_metadata.session_id`.
  fn ingest_at(
    &self,
    document: Value,
    created_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<IngestOutcome, Self::Error>> + Send + '_;

  /// [`ingest_at`](Self::ingest_at) stamped with the current time.
  fn ingest(
    &self,
    document: Value,
  ) -> impl Future<Output = Result<IngestOutcome, Self::Error>> + Send + '_ {
    self.ingest_at(document, Utc::now())
  }

  /// Upsert only the raw payload row (and the user/version it references),
  /// leaving derived rows untouched.
  fn put_raw(
    &self,
    session_id: String,
    document: Value,
    created_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Re-derive a stored session from its own payload and original
  /// `created_at`. Returns `None` if the session is unknown.
  fn normalize_existing<'a>(
    &'a self,
    session_id: &'a str,
  ) -> impl Future<Output = Result<Option<NormalizeCounts>, Self::Error>> + Send + 'a;

  /// Re-derive every stored session in a single transaction.
  fn normalize_all(
    &self,
  ) -> impl Future<Output = Result<Vec<IngestOutcome>, Self::Error>> + Send + '_;

  /// Delete a session and, by cascade, every row derived from it. Returns
  /// `false` if the session did not exist.
  fn delete_session<'a>(
    &'a self,
    session_id: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  // ── Raw reads ─────────────────────────────────────────────────────────

  /// The stored payload, exactly as ingested.
  fn get_raw<'a>(
    &'a self,
    session_id: &'a str,
  ) -> impl Future<Output = Result<Option<Value>, Self::Error>> + Send + 'a;

  /// Up to `limit` summaries, most recently created first.
  fn list_summaries(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<SessionSummary>, Self::Error>> + Send + '_;

  /// The most recently created session, if any.
  fn get_latest_summary(
    &self,
  ) -> impl Future<Output = Result<Option<SessionSummary>, Self::Error>> + Send + '_;

  // ── Projection ────────────────────────────────────────────────────────

  /// Reassemble all normalized rows of a session.
  fn get_normalized<'a>(
    &'a self,
    session_id: &'a str,
  ) -> impl Future<Output = Result<Option<NormalizedSession>, Self::Error>> + Send + 'a;

  // ── Reference entities ────────────────────────────────────────────────

  fn get_user<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + 'a;

  fn get_version<'a>(
    &'a self,
    version_id: &'a str,
  ) -> impl Future<Output = Result<Option<Version>, Self::Error>> + Send + 'a;

  fn get_mechanic<'a>(
    &'a self,
    mechanic_id: &'a str,
  ) -> impl Future<Output = Result<Option<Mechanic>, Self::Error>> + Send + 'a;

  fn get_stakeholder<'a>(
    &'a self,
    stakeholder_id: &'a str,
  ) -> impl Future<Output = Result<Option<Stakeholder>, Self::Error>> + Send + 'a;
}
