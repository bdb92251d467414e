//! Read-only reassembly of a session's normalized rows.

use rusqlite::{Connection, OptionalExtension as _, Row, params};
use simstore_core::session::{
  Mechanic, NormalizedSession, Stakeholder, User, Version,
};

use crate::{
  encode::{
    CANONICAL_COLUMNS, COMPARISON_COLUMNS, DECISION_COLUMNS, EVENT_COLUMNS,
    EXPECTED_COLUMNS, PLAYER_COLUMNS, PROCESS_COLUMNS, canonical_from_row,
    comparison_from_row, decision_from_row, event_from_row, expected_from_row,
    mechanic_from_row, player_from_row, process_from_row,
    session_stakeholder_from_row, stakeholder_from_row, state_from_row,
    user_from_row, version_from_row,
  },
  session,
};

/// All rows of `table` belonging to `session_id`, in storage order.
fn rows_for<T>(
  conn: &Connection,
  columns: &str,
  table: &str,
  session_id: &str,
  map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {columns} FROM {table} WHERE session_id = ?1 ORDER BY rowid"
  ))?;
  stmt.query_map(params![session_id], map)?.collect()
}

/// Assemble the full relational view of `session_id`, or `None` if the
/// session does not exist.
pub fn load_normalized(
  conn: &Connection,
  session_id: &str,
) -> rusqlite::Result<Option<NormalizedSession>> {
  let Some(summary) = session::get_summary(conn, session_id)? else {
    return Ok(None);
  };

  let user = match &summary.user_id {
    Some(id) => get_user(conn, id)?,
    None => None,
  };
  let version = match &summary.version_id {
    Some(id) => get_version(conn, id)?,
    None => None,
  };

  let mechanics = {
    let mut stmt = conn.prepare(
      "SELECT mechanic_id, version_id FROM mechanics
       WHERE mechanic_id IN (
         SELECT mechanic_id FROM canonical_actions WHERE session_id = ?1
         UNION
         SELECT mechanic_id FROM mechanic_events WHERE session_id = ?1
       )
       ORDER BY mechanic_id",
    )?;
    stmt
      .query_map(params![session_id], mechanic_from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?
  };

  let session_state = conn
    .query_row(
      "SELECT session_id, stakeholders, global_state FROM session_state WHERE session_id = ?1",
      params![session_id],
      state_from_row,
    )
    .optional()?;

  Ok(Some(NormalizedSession {
    user,
    version,
    mechanics,
    explicit_decisions: rows_for(conn, DECISION_COLUMNS, "explicit_decisions", session_id, decision_from_row)?,
    expected_actions: rows_for(conn, EXPECTED_COLUMNS, "expected_actions", session_id, expected_from_row)?,
    canonical_actions: rows_for(conn, CANONICAL_COLUMNS, "canonical_actions", session_id, canonical_from_row)?,
    mechanic_events: rows_for(conn, EVENT_COLUMNS, "mechanic_events", session_id, event_from_row)?,
    comparisons: rows_for(conn, COMPARISON_COLUMNS, "comparisons", session_id, comparison_from_row)?,
    process_logs: rows_for(conn, PROCESS_COLUMNS, "process_logs", session_id, process_from_row)?,
    player_actions_log: rows_for(conn, PLAYER_COLUMNS, "player_actions_log", session_id, player_from_row)?,
    session_stakeholders: rows_for(
      conn,
      "session_id, stakeholder_id, state",
      "session_stakeholders",
      session_id,
      session_stakeholder_from_row,
    )?,
    session_state,
    session: summary,
  }))
}

// ─── Reference lookups ───────────────────────────────────────────────────────

pub fn get_user(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<User>> {
  conn
    .query_row(
      "SELECT user_id, name FROM users WHERE user_id = ?1",
      params![user_id],
      user_from_row,
    )
    .optional()
}

pub fn get_version(conn: &Connection, version_id: &str) -> rusqlite::Result<Option<Version>> {
  conn
    .query_row(
      "SELECT version_id, created_at FROM versions WHERE version_id = ?1",
      params![version_id],
      version_from_row,
    )
    .optional()
}

pub fn get_mechanic(conn: &Connection, mechanic_id: &str) -> rusqlite::Result<Option<Mechanic>> {
  conn
    .query_row(
      "SELECT mechanic_id, version_id FROM mechanics WHERE mechanic_id = ?1",
      params![mechanic_id],
      mechanic_from_row,
    )
    .optional()
}

pub fn get_stakeholder(
  conn: &Connection,
  stakeholder_id: &str,
) -> rusqlite::Result<Option<Stakeholder>> {
  conn
    .query_row(
      "SELECT stakeholder_id, name, role FROM stakeholders WHERE stakeholder_id = ?1",
      params![stakeholder_id],
      stakeholder_from_row,
    )
    .optional()
}
