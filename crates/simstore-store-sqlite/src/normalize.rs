//! The normalization pass: decompose one session document into rows.
//!
//! A pass upserts the raw payload, clears every row previously derived from
//! the session and re-inserts them from the document. It takes a
//! [`Transaction`] so that payload and derived rows always change together.
//!
//! Rows of externally keyed collections (expected actions, canonical actions,
//! mechanic events) are written with `INSERT OR REPLACE` on
//! `(session_id, id)`; items without an id are skipped. Everything else is
//! append-only within a pass.

use std::collections::BTreeSet;

use rusqlite::{Connection, Transaction, params};
use serde_json::Value;
use simstore_core::{
  document::{
    self, CANONICAL_ACTIONS, COMPARISONS, EXPECTED_ACTIONS, EXPLICIT_DECISIONS,
    MECHANIC_EVENTS, PLAYER_ACTIONS_LOG, PROCESS_LOG, blob, collection, integer,
    non_empty_text, real, text, timestamp,
  },
  session::NormalizeCounts,
};

use crate::{encode::timestamp_to_sql, schema::DERIVED_TABLES, session};

/// Normalize `document` as session `session_id`.
///
/// `created_at` is written to the session row as given; re-normalization must
/// pass the originally recorded value. Returns the size of each input
/// collection.
pub fn normalize(
  tx: &Transaction<'_>,
  session_id: &str,
  document: &Value,
  created_at: &str,
) -> rusqlite::Result<NormalizeCounts> {
  let meta = session::put_raw(tx, session_id, document, created_at)?;
  upsert_mechanics(tx, &document::referenced_mechanics(document), meta.version_id.as_deref())?;
  clear_derived(tx, session_id)?;

  let counts = NormalizeCounts {
    explicit_decisions: insert_decisions(tx, session_id, collection(document, EXPLICIT_DECISIONS))?,
    expected_actions:   insert_expected(tx, session_id, collection(document, EXPECTED_ACTIONS))?,
    canonical_actions:  insert_canonical(tx, session_id, collection(document, CANONICAL_ACTIONS))?,
    mechanic_events:    insert_events(tx, session_id, collection(document, MECHANIC_EVENTS))?,
    comparisons:        insert_comparisons(tx, session_id, collection(document, COMPARISONS))?,
    process_log:        insert_process_logs(tx, session_id, collection(document, PROCESS_LOG))?,
    player_actions_log: insert_player_actions(tx, session_id, collection(document, PLAYER_ACTIONS_LOG))?,
  };
  insert_final_state(tx, session_id, document)?;

  tracing::debug!(session_id, ?counts, "normalized session");
  Ok(counts)
}

// ─── Reference entities ──────────────────────────────────────────────────────

/// Mechanics keep only the most recent version they were seen under.
fn upsert_mechanics(
  conn: &Connection,
  mechanic_ids: &BTreeSet<String>,
  version_id: Option<&str>,
) -> rusqlite::Result<()> {
  let mut stmt = conn.prepare_cached(
    "INSERT INTO mechanics (mechanic_id, version_id) VALUES (?1, ?2)
     ON CONFLICT (mechanic_id) DO UPDATE SET version_id = excluded.version_id",
  )?;
  for mechanic_id in mechanic_ids {
    stmt.execute(params![mechanic_id, version_id])?;
  }
  Ok(())
}

fn clear_derived(conn: &Connection, session_id: &str) -> rusqlite::Result<()> {
  for table in DERIVED_TABLES {
    conn.execute(
      &format!("DELETE FROM {table} WHERE session_id = ?1"),
      params![session_id],
    )?;
  }
  Ok(())
}

// ─── Collections ─────────────────────────────────────────────────────────────

/// Keyed items without their id are not stored; the id is part of the
/// primary key and never NULL.
fn skip_unkeyed(session_id: &str, collection: &str, id_field: &str) {
  tracing::debug!(session_id, collection, id_field, "skipping item without an id");
}

fn insert_decisions(conn: &Connection, session_id: &str, items: &[Value]) -> rusqlite::Result<usize> {
  let mut stmt = conn.prepare_cached(
    "INSERT INTO explicit_decisions (
       session_id, node_id, option_id, option_text, stakeholder, day, time_slot, consequences
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
  )?;
  for item in items {
    stmt.execute(params![
      session_id,
      text(item, "nodeId"),
      text(item, "choiceId"),
      text(item, "choiceText"),
      text(item, "stakeholder"),
      integer(item, "day"),
      text(item, "timeSlot"),
      blob(item, "consequences"),
    ])?;
  }
  Ok(items.len())
}

fn insert_expected(conn: &Connection, session_id: &str, items: &[Value]) -> rusqlite::Result<usize> {
  let mut stmt = conn.prepare_cached(
    "INSERT OR REPLACE INTO expected_actions (
       session_id, expected_action_id, source_node_id, source_option_id, action_type,
       target_ref, constraints, rule_id, created_at, mechanic_id
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
  )?;
  let no_source = Value::Null;
  for item in items {
    let Some(id) = non_empty_text(item, "expected_action_id") else {
      skip_unkeyed(session_id, EXPECTED_ACTIONS, "expected_action_id");
      continue;
    };
    let source = item.get("source").unwrap_or(&no_source);
    stmt.execute(params![
      session_id,
      id,
      text(source, "node_id"),
      text(source, "option_id"),
      text(item, "action_type"),
      text(item, "target_ref"),
      blob(item, "constraints"),
      text(item, "rule_id"),
      timestamp_to_sql(timestamp(item, "created_at")),
      text(item, "mechanic_id"),
    ])?;
  }
  Ok(items.len())
}

fn insert_canonical(conn: &Connection, session_id: &str, items: &[Value]) -> rusqlite::Result<usize> {
  let mut stmt = conn.prepare_cached(
    "INSERT OR REPLACE INTO canonical_actions (
       session_id, canonical_action_id, mechanic_id, action_type, target_ref,
       value_final, committed_at, context
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
  )?;
  for item in items {
    let Some(id) = non_empty_text(item, "canonical_action_id") else {
      skip_unkeyed(session_id, CANONICAL_ACTIONS, "canonical_action_id");
      continue;
    };
    stmt.execute(params![
      session_id,
      id,
      text(item, "mechanic_id"),
      text(item, "action_type"),
      text(item, "target_ref"),
      blob(item, "value_final"),
      timestamp_to_sql(timestamp(item, "committed_at")),
      blob(item, "context"),
    ])?;
  }
  Ok(items.len())
}

fn insert_events(conn: &Connection, session_id: &str, items: &[Value]) -> rusqlite::Result<usize> {
  let mut stmt = conn.prepare_cached(
    "INSERT OR REPLACE INTO mechanic_events (
       session_id, event_id, mechanic_id, event_type, timestamp, payload
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
  )?;
  for item in items {
    let Some(id) = non_empty_text(item, "event_id") else {
      skip_unkeyed(session_id, MECHANIC_EVENTS, "event_id");
      continue;
    };
    stmt.execute(params![
      session_id,
      id,
      text(item, "mechanic_id"),
      text(item, "event_type"),
      timestamp_to_sql(timestamp(item, "timestamp")),
      blob(item, "payload"),
    ])?;
  }
  Ok(items.len())
}

fn insert_comparisons(conn: &Connection, session_id: &str, items: &[Value]) -> rusqlite::Result<usize> {
  let mut stmt = conn.prepare_cached(
    "INSERT INTO comparisons (
       session_id, expected_action_id, canonical_action_id, outcome, deviation
     ) VALUES (?1, ?2, ?3, ?4, ?5)",
  )?;
  for item in items {
    stmt.execute(params![
      session_id,
      text(item, "expected_action_id"),
      text(item, "canonical_action_id"),
      text(item, "outcome"),
      blob(item, "deviation"),
    ])?;
  }
  Ok(items.len())
}

fn insert_process_logs(conn: &Connection, session_id: &str, items: &[Value]) -> rusqlite::Result<usize> {
  let mut stmt = conn.prepare_cached(
    "INSERT INTO process_logs (
       session_id, node_id, start_time, end_time, total_duration, final_choice, events
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
  )?;
  for item in items {
    stmt.execute(params![
      session_id,
      text(item, "nodeId"),
      real(item, "startTime"),
      real(item, "endTime"),
      real(item, "totalDuration"),
      text(item, "finalChoice"),
      blob(item, "events"),
    ])?;
  }
  Ok(items.len())
}

fn insert_player_actions(conn: &Connection, session_id: &str, items: &[Value]) -> rusqlite::Result<usize> {
  let mut stmt = conn.prepare_cached(
    "INSERT INTO player_actions_log (
       session_id, event, metadata, day, time_slot, timestamp
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
  )?;
  for item in items {
    stmt.execute(params![
      session_id,
      text(item, "event"),
      blob(item, "metadata"),
      integer(item, "day"),
      text(item, "timeSlot"),
      real(item, "timestamp"),
    ])?;
  }
  Ok(items.len())
}

// ─── Final state ─────────────────────────────────────────────────────────────

fn insert_final_state(conn: &Connection, session_id: &str, document: &Value) -> rusqlite::Result<()> {
  let Some(final_state) = document::final_state(document) else {
    return Ok(());
  };

  conn.execute(
    "INSERT OR REPLACE INTO session_state (session_id, stakeholders, global_state)
     VALUES (?1, ?2, ?3)",
    params![
      session_id,
      blob(final_state, "stakeholders"),
      blob(final_state, "global"),
    ],
  )?;

  let mut reference = conn.prepare_cached(
    "INSERT OR IGNORE INTO stakeholders (stakeholder_id, name, role) VALUES (?1, ?2, ?3)",
  )?;
  let mut snapshot = conn.prepare_cached(
    "INSERT OR REPLACE INTO session_stakeholders (session_id, stakeholder_id, state)
     VALUES (?1, ?2, ?3)",
  )?;
  for entry in document::final_stakeholders(document) {
    let Some(stakeholder_id) = document::stakeholder_id(entry) else {
      continue;
    };
    reference.execute(params![stakeholder_id, text(entry, "name"), text(entry, "role")])?;
    snapshot.execute(params![session_id, stakeholder_id, entry.to_string()])?;
  }
  Ok(())
}
