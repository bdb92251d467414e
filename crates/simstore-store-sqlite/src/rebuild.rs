//! Offline rebuild: replay every stored payload into a fresh database.
//!
//! The source is opened read-only. Replays go to a temporary file next to the
//! target inside one transaction; the file is renamed over the target only
//! once everything has been committed and closed.

use std::{
  fs,
  path::{Path, PathBuf},
};

use chrono::Utc;
use rusqlite::{Connection, OpenFlags};

use crate::{
  Error, Result,
  encode::{decode_payload, encode_dt},
  normalize::normalize,
  schema::{ensure_schema, table_columns},
};

/// What a successful rebuild did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
  /// Sessions replayed into the target.
  pub processed: usize,
  /// Source rows skipped for lacking a payload or a session id.
  pub skipped:   usize,
}

/// Where the rebuild stages its output before publishing it to `target`.
pub fn temp_path(target: &Path) -> PathBuf { target.with_extension("tmp") }

/// Rebuild `target` from the raw payloads stored in `source`.
///
/// Fails with [`Error::Precondition`] without touching any file if `source`
/// is missing or has no `sessions.payload` column, or if `target` exists and
/// `overwrite` is not set.
pub fn rebuild(source: &Path, target: &Path, overwrite: bool) -> Result<RebuildReport> {
  if !source.is_file() {
    return Err(Error::Precondition(format!(
      "source database not found: {}",
      source.display()
    )));
  }
  if target.exists() && !overwrite {
    return Err(refuse_existing(target));
  }

  let source_conn = Connection::open_with_flags(
    source,
    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
  )?;
  let has_created_at = check_source(&source_conn)?;

  let temp = temp_path(target);
  if temp.exists() {
    fs::remove_file(&temp)?;
  }

  let report = match replay(&source_conn, &temp, has_created_at) {
    Ok(report) => report,
    Err(e) => {
      discard(&temp);
      return Err(e);
    }
  };
  drop(source_conn);

  if target.exists() && !overwrite {
    discard(&temp);
    return Err(refuse_existing(target));
  }
  fs::rename(&temp, target)?;

  tracing::info!(
    processed = report.processed,
    skipped = report.skipped,
    target = %target.display(),
    "rebuild complete"
  );
  Ok(report)
}

fn refuse_existing(target: &Path) -> Error {
  Error::Precondition(format!(
    "target database already exists: {} (use --overwrite to replace it)",
    target.display()
  ))
}

fn discard(temp: &Path) {
  if let Err(e) = fs::remove_file(temp) {
    tracing::warn!(path = %temp.display(), error = %e, "failed to remove temporary database");
  }
}

/// Verify the source has a `sessions` table with a `payload` column. Returns
/// whether it also records `created_at`.
fn check_source(conn: &Connection) -> Result<bool> {
  let columns = table_columns(conn, "sessions")?;
  if columns.is_empty() {
    return Err(Error::Precondition(
      "source database does not contain a sessions table".into(),
    ));
  }
  if !columns.iter().any(|c| c == "payload") {
    return Err(Error::Precondition(
      "source sessions table is missing the payload column".into(),
    ));
  }
  Ok(columns.iter().any(|c| c == "created_at"))
}

fn replay(source: &Connection, temp: &Path, has_created_at: bool) -> Result<RebuildReport> {
  let mut target = Connection::open(temp)?;
  ensure_schema(&target)?;

  let sql = if has_created_at {
    "SELECT session_id, payload, created_at FROM sessions ORDER BY rowid"
  } else {
    "SELECT session_id, payload, NULL FROM sessions ORDER BY rowid"
  };
  let mut stmt = source.prepare(sql)?;
  let mut rows = stmt.query([])?;

  let mut report = RebuildReport::default();
  let tx = target.transaction()?;
  while let Some(row) = rows.next()? {
    let session_id: Option<String> = row.get(0)?;
    let payload: Option<String> = row.get(1)?;
    let created_at: Option<String> = row.get(2)?;

    let (Some(session_id), Some(payload)) = (
      session_id.filter(|s| !s.is_empty()),
      payload.filter(|p| !p.is_empty()),
    ) else {
      report.skipped += 1;
      tracing::warn!("skipping source row without session id or payload");
      continue;
    };

    let document = decode_payload(1, &payload)?;
    let created_at = created_at.unwrap_or_else(|| encode_dt(Utc::now()));
    normalize(&tx, &session_id, &document, &created_at)?;
    report.processed += 1;
  }
  tx.commit()?;

  target.close().map_err(|(_, e)| e)?;
  Ok(report)
}
