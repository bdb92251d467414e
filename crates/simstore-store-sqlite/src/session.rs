//! The raw-payload table: one `sessions` row per session id.
//!
//! These functions run on a borrowed connection (or transaction) so the
//! normalization pass can combine them with its own writes.

use rusqlite::{Connection, OptionalExtension as _, params};
use serde_json::Value;
use simstore_core::{
  document::SessionMetadata,
  session::SessionSummary,
};

use crate::encode::{SUMMARY_COLUMNS, decode_payload, summary_from_row};

/// Upsert the session row for `session_id` together with the user and version
/// it references. Reference rows are only ever inserted, never overwritten.
///
/// Returns the metadata extracted from `document`.
pub fn put_raw(
  conn: &Connection,
  session_id: &str,
  document: &Value,
  created_at: &str,
) -> rusqlite::Result<SessionMetadata> {
  let meta = SessionMetadata::from_document(document);

  if let Some(user_id) = &meta.user_id {
    conn.execute(
      "INSERT OR IGNORE INTO users (user_id, name) VALUES (?1, ?1)",
      params![user_id],
    )?;
  }
  if let Some(version_id) = &meta.version_id {
    conn.execute(
      "INSERT OR IGNORE INTO versions (version_id, created_at) VALUES (?1, ?2)",
      params![version_id, created_at],
    )?;
  }

  conn.execute(
    "INSERT INTO sessions (
       session_id, user_id, version_id, start_time, end_time, created_at, payload
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT (session_id) DO UPDATE SET
       user_id    = excluded.user_id,
       version_id = excluded.version_id,
       start_time = excluded.start_time,
       end_time   = excluded.end_time,
       created_at = excluded.created_at,
       payload    = excluded.payload",
    params![
      session_id,
      meta.user_id,
      meta.version_id,
      meta.start_time,
      meta.end_time,
      created_at,
      document.to_string(),
    ],
  )?;

  Ok(meta)
}

/// A stored payload and the timestamp originally recorded with it.
pub struct StoredPayload {
  pub document:   Value,
  pub created_at: String,
}

/// Read back the payload of `session_id`. A row with an empty payload (left
/// behind by a legacy schema) is treated as absent.
pub fn get_raw(conn: &Connection, session_id: &str) -> rusqlite::Result<Option<StoredPayload>> {
  let row: Option<(Option<String>, String)> = conn
    .query_row(
      "SELECT payload, created_at FROM sessions WHERE session_id = ?1",
      params![session_id],
      |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()?;

  match row {
    Some((Some(payload), created_at)) if !payload.is_empty() => Ok(Some(StoredPayload {
      document: decode_payload(0, &payload)?,
      created_at,
    })),
    _ => Ok(None),
  }
}

/// Every stored session id with a non-empty payload, oldest first.
pub fn list_ids(conn: &Connection) -> rusqlite::Result<Vec<String>> {
  let mut stmt = conn.prepare(
    "SELECT session_id FROM sessions
     WHERE payload IS NOT NULL AND payload != ''
     ORDER BY created_at, session_id",
  )?;
  stmt.query_map([], |r| r.get(0))?.collect()
}

pub fn get_summary(conn: &Connection, session_id: &str) -> rusqlite::Result<Option<SessionSummary>> {
  conn
    .query_row(
      &format!("SELECT {SUMMARY_COLUMNS} FROM sessions WHERE session_id = ?1"),
      params![session_id],
      summary_from_row,
    )
    .optional()
}

/// Up to `limit` summaries, most recently created first.
pub fn list_summaries(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<SessionSummary>> {
  let limit = i64::try_from(limit).unwrap_or(i64::MAX);
  let mut stmt = conn.prepare(&format!(
    "SELECT {SUMMARY_COLUMNS} FROM sessions ORDER BY created_at DESC LIMIT ?1"
  ))?;
  stmt.query_map(params![limit], summary_from_row)?.collect()
}

pub fn get_latest_summary(conn: &Connection) -> rusqlite::Result<Option<SessionSummary>> {
  Ok(list_summaries(conn, 1)?.into_iter().next())
}

/// Delete the session row; `ON DELETE CASCADE` removes its derived rows.
pub fn delete(conn: &Connection, session_id: &str) -> rusqlite::Result<bool> {
  let n = conn.execute("DELETE FROM sessions WHERE session_id = ?1", params![session_id])?;
  Ok(n > 0)
}
