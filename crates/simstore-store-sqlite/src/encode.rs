//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Timestamps generated here are RFC 3339 UTC strings with fixed microsecond
//! precision so that lexical order equals chronological order. JSON blob
//! columns are read back through rusqlite's `serde_json` support.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{
  Row,
  types::{Type, Value as SqlValue, ValueRef},
};
use serde_json::Value;
use simstore_core::session::{
  CanonicalAction, Comparison, ExpectedAction, ExplicitDecision, Mechanic,
  MechanicEvent, PlayerAction, ProcessLog, SessionStakeholder, SessionState,
  SessionSummary, Stakeholder, Timestamp, User, Version,
};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ─── Payload ─────────────────────────────────────────────────────────────────

/// Parse a stored payload, reporting failures as a conversion error on
/// column `idx`.
pub fn decode_payload(idx: usize, text: &str) -> rusqlite::Result<Value> {
  serde_json::from_str(text)
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ─── Timestamp ───────────────────────────────────────────────────────────────
//
// Timestamp columns have INTEGER affinity, which keeps fractional values as
// REAL and non-numeric text as TEXT.

pub fn timestamp_to_sql(ts: Option<Timestamp>) -> SqlValue {
  match ts {
    None => SqlValue::Null,
    Some(Timestamp::Integer(i)) => SqlValue::Integer(i),
    Some(Timestamp::Real(f)) => SqlValue::Real(f),
    Some(Timestamp::Text(s)) => SqlValue::Text(s),
  }
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Timestamp>> {
  Ok(match row.get_ref(idx)? {
    ValueRef::Null => None,
    ValueRef::Integer(i) => Some(Timestamp::Integer(i)),
    ValueRef::Real(f) => Some(Timestamp::Real(f)),
    ValueRef::Text(_) => Some(Timestamp::Text(row.get(idx)?)),
    ValueRef::Blob(_) => {
      return Err(rusqlite::Error::InvalidColumnType(idx, "timestamp".into(), Type::Blob));
    }
  })
}

// ─── Row mappers ─────────────────────────────────────────────────────────────
//
// Each `*_COLUMNS` constant is the select list its mapper expects, in order.

pub const SUMMARY_COLUMNS: &str =
  "session_id, user_id, version_id, start_time, end_time, created_at";

pub fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<SessionSummary> {
  Ok(SessionSummary {
    session_id: row.get(0)?,
    user_id:    row.get(1)?,
    version_id: row.get(2)?,
    start_time: row.get(3)?,
    end_time:   row.get(4)?,
    created_at: row.get(5)?,
  })
}

pub fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
  Ok(User { user_id: row.get(0)?, name: row.get(1)? })
}

pub fn version_from_row(row: &Row<'_>) -> rusqlite::Result<Version> {
  Ok(Version { version_id: row.get(0)?, created_at: row.get(1)? })
}

pub fn mechanic_from_row(row: &Row<'_>) -> rusqlite::Result<Mechanic> {
  Ok(Mechanic { mechanic_id: row.get(0)?, version_id: row.get(1)? })
}

pub fn stakeholder_from_row(row: &Row<'_>) -> rusqlite::Result<Stakeholder> {
  Ok(Stakeholder {
    stakeholder_id: row.get(0)?,
    name:           row.get(1)?,
    role:           row.get(2)?,
  })
}

pub const DECISION_COLUMNS: &str = "decision_id, session_id, node_id, option_id, option_text, \
   stakeholder, day, time_slot, consequences";

pub fn decision_from_row(row: &Row<'_>) -> rusqlite::Result<ExplicitDecision> {
  Ok(ExplicitDecision {
    decision_id:  row.get(0)?,
    session_id:   row.get(1)?,
    node_id:      row.get(2)?,
    option_id:    row.get(3)?,
    option_text:  row.get(4)?,
    stakeholder:  row.get(5)?,
    day:          row.get(6)?,
    time_slot:    row.get(7)?,
    consequences: row.get(8)?,
  })
}

pub const EXPECTED_COLUMNS: &str = "expected_action_id, session_id, source_node_id, \
   source_option_id, action_type, target_ref, constraints, rule_id, created_at, mechanic_id";

pub fn expected_from_row(row: &Row<'_>) -> rusqlite::Result<ExpectedAction> {
  Ok(ExpectedAction {
    expected_action_id: row.get(0)?,
    session_id:         row.get(1)?,
    source_node_id:     row.get(2)?,
    source_option_id:   row.get(3)?,
    action_type:        row.get(4)?,
    target_ref:         row.get(5)?,
    constraints:        row.get(6)?,
    rule_id:            row.get(7)?,
    created_at:         timestamp_at(row, 8)?,
    mechanic_id:        row.get(9)?,
  })
}

pub const CANONICAL_COLUMNS: &str = "canonical_action_id, session_id, mechanic_id, \
   action_type, target_ref, value_final, committed_at, context";

pub fn canonical_from_row(row: &Row<'_>) -> rusqlite::Result<CanonicalAction> {
  Ok(CanonicalAction {
    canonical_action_id: row.get(0)?,
    session_id:          row.get(1)?,
    mechanic_id:         row.get(2)?,
    action_type:         row.get(3)?,
    target_ref:          row.get(4)?,
    value_final:         row.get(5)?,
    committed_at:        timestamp_at(row, 6)?,
    context:             row.get(7)?,
  })
}

pub const EVENT_COLUMNS: &str =
  "event_id, session_id, mechanic_id, event_type, timestamp, payload";

pub fn event_from_row(row: &Row<'_>) -> rusqlite::Result<MechanicEvent> {
  Ok(MechanicEvent {
    event_id:    row.get(0)?,
    session_id:  row.get(1)?,
    mechanic_id: row.get(2)?,
    event_type:  row.get(3)?,
    timestamp:   timestamp_at(row, 4)?,
    payload:     row.get(5)?,
  })
}

pub const COMPARISON_COLUMNS: &str = "comparison_id, session_id, expected_action_id, \
   canonical_action_id, outcome, deviation";

pub fn comparison_from_row(row: &Row<'_>) -> rusqlite::Result<Comparison> {
  Ok(Comparison {
    comparison_id:       row.get(0)?,
    session_id:          row.get(1)?,
    expected_action_id:  row.get(2)?,
    canonical_action_id: row.get(3)?,
    outcome:             row.get(4)?,
    deviation:           row.get(5)?,
  })
}

pub const PROCESS_COLUMNS: &str = "process_log_id, session_id, node_id, start_time, end_time, \
   total_duration, final_choice, events";

pub fn process_from_row(row: &Row<'_>) -> rusqlite::Result<ProcessLog> {
  Ok(ProcessLog {
    process_log_id: row.get(0)?,
    session_id:     row.get(1)?,
    node_id:        row.get(2)?,
    start_time:     row.get(3)?,
    end_time:       row.get(4)?,
    total_duration: row.get(5)?,
    final_choice:   row.get(6)?,
    events:         row.get(7)?,
  })
}

pub const PLAYER_COLUMNS: &str =
  "player_action_id, session_id, event, metadata, day, time_slot, timestamp";

pub fn player_from_row(row: &Row<'_>) -> rusqlite::Result<PlayerAction> {
  Ok(PlayerAction {
    player_action_id: row.get(0)?,
    session_id:       row.get(1)?,
    event:            row.get(2)?,
    metadata:         row.get(3)?,
    day:              row.get(4)?,
    time_slot:        row.get(5)?,
    timestamp:        row.get(6)?,
  })
}

pub fn state_from_row(row: &Row<'_>) -> rusqlite::Result<SessionState> {
  Ok(SessionState {
    session_id:   row.get(0)?,
    stakeholders: row.get(1)?,
    global_state: row.get(2)?,
  })
}

pub fn session_stakeholder_from_row(row: &Row<'_>) -> rusqlite::Result<SessionStakeholder> {
  Ok(SessionStakeholder {
    session_id:     row.get(0)?,
    stakeholder_id: row.get(1)?,
    state:          row.get(2)?,
  })
}
