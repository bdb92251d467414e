//! [`SqliteStore`]: the SQLite implementation of [`SessionStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;

use simstore_core::{
  document::require_session_id,
  session::{
    IngestOutcome, Mechanic, NormalizeCounts, NormalizedSession, SessionSummary,
    Stakeholder, User, Version,
  },
  store::SessionStore,
};

use crate::{
  Result,
  encode::encode_dt,
  normalize::normalize,
  project,
  schema::ensure_schema,
  session,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A session store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. The
/// connection is closed when the last clone is dropped.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Close the underlying connection, surfacing any error SQLite reports
  /// while doing so. Clones of this store fail after it is closed.
  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    Ok(())
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        ensure_schema(conn)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── SessionStore impl ───────────────────────────────────────────────────────

impl SessionStore for SqliteStore {
  type Error = crate::Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn ingest_at(&self, document: Value, created_at: DateTime<Utc>) -> Result<IngestOutcome> {
    let session_id = require_session_id(&document)?;
    let created_at = encode_dt(created_at);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let counts = normalize(&tx, &session_id, &document, &created_at)?;
        tx.commit()?;
        Ok(IngestOutcome { session_id, counts })
      })
      .await?;

    Ok(outcome)
  }

  async fn put_raw(
    &self,
    session_id: String,
    document: Value,
    created_at: DateTime<Utc>,
  ) -> Result<()> {
    let created_at = encode_dt(created_at);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        session::put_raw(&tx, &session_id, &document, &created_at)?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn normalize_existing(&self, session_id: &str) -> Result<Option<NormalizeCounts>> {
    let session_id = session_id.to_owned();

    let counts = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(stored) = session::get_raw(&tx, &session_id)? else {
          return Ok(None);
        };
        let counts = normalize(&tx, &session_id, &stored.document, &stored.created_at)?;
        tx.commit()?;
        Ok(Some(counts))
      })
      .await?;

    Ok(counts)
  }

  async fn normalize_all(&self) -> Result<Vec<IngestOutcome>> {
    let outcomes: Vec<IngestOutcome> = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        let mut outcomes = Vec::new();
        for session_id in session::list_ids(&tx)? {
          let Some(stored) = session::get_raw(&tx, &session_id)? else {
            continue;
          };
          let counts = normalize(&tx, &session_id, &stored.document, &stored.created_at)?;
          outcomes.push(IngestOutcome { session_id, counts });
        }
        tx.commit()?;
        Ok(outcomes)
      })
      .await?;

    tracing::info!(processed = outcomes.len(), "re-normalized all sessions");
    Ok(outcomes)
  }

  async fn delete_session(&self, session_id: &str) -> Result<bool> {
    let session_id = session_id.to_owned();
    let deleted = self
      .conn
      .call(move |conn| Ok(session::delete(conn, &session_id)?))
      .await?;
    Ok(deleted)
  }

  // ── Raw reads ─────────────────────────────────────────────────────────────

  async fn get_raw(&self, session_id: &str) -> Result<Option<Value>> {
    let session_id = session_id.to_owned();
    let stored = self
      .conn
      .call(move |conn| Ok(session::get_raw(conn, &session_id)?))
      .await?;
    Ok(stored.map(|s| s.document))
  }

  async fn list_summaries(&self, limit: usize) -> Result<Vec<SessionSummary>> {
    let summaries = self
      .conn
      .call(move |conn| Ok(session::list_summaries(conn, limit)?))
      .await?;
    Ok(summaries)
  }

  async fn get_latest_summary(&self) -> Result<Option<SessionSummary>> {
    let summary = self
      .conn
      .call(|conn| Ok(session::get_latest_summary(conn)?))
      .await?;
    Ok(summary)
  }

  // ── Projection ────────────────────────────────────────────────────────────

  async fn get_normalized(&self, session_id: &str) -> Result<Option<NormalizedSession>> {
    let session_id = session_id.to_owned();
    let view = self
      .conn
      .call(move |conn| {
        // One read transaction so the view is a single consistent snapshot.
        let tx = conn.transaction()?;
        let view = project::load_normalized(&tx, &session_id)?;
        tx.commit()?;
        Ok(view)
      })
      .await?;
    Ok(view)
  }

  // ── Reference entities ────────────────────────────────────────────────────

  async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
    let user_id = user_id.to_owned();
    Ok(self.conn.call(move |conn| Ok(project::get_user(conn, &user_id)?)).await?)
  }

  async fn get_version(&self, version_id: &str) -> Result<Option<Version>> {
    let version_id = version_id.to_owned();
    Ok(self.conn.call(move |conn| Ok(project::get_version(conn, &version_id)?)).await?)
  }

  async fn get_mechanic(&self, mechanic_id: &str) -> Result<Option<Mechanic>> {
    let mechanic_id = mechanic_id.to_owned();
    Ok(self.conn.call(move |conn| Ok(project::get_mechanic(conn, &mechanic_id)?)).await?)
  }

  async fn get_stakeholder(&self, stakeholder_id: &str) -> Result<Option<Stakeholder>> {
    let stakeholder_id = stakeholder_id.to_owned();
    Ok(
      self
        .conn
        .call(move |conn| Ok(project::get_stakeholder(conn, &stakeholder_id)?))
        .await?,
    )
  }
}
