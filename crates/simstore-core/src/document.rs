//! Read-side helpers over a raw session document.
//!
//! A session document is an arbitrary JSON object. Nothing in it is trusted to
//! have the expected shape: every accessor here degrades to `None` (or an
//! empty slice) instead of failing when a field is absent or has the wrong
//! type.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::{Error, Result, session::Timestamp};

// ─── Collection keys ─────────────────────────────────────────────────────────

pub const SESSION_METADATA: &str = "session_metadata";
pub const EXPLICIT_DECISIONS: &str = "explicit_decisions";
pub const EXPECTED_ACTIONS: &str = "expected_actions";
pub const CANONICAL_ACTIONS: &str = "canonical_actions";
pub const MECHANIC_EVENTS: &str = "mechanic_events";
pub const COMPARISONS: &str = "comparisons";
pub const PROCESS_LOG: &str = "process_log";
pub const PLAYER_ACTIONS_LOG: &str = "player_actions_log";
pub const FINAL_STATE: &str = "final_state";

// ─── Scalar coercion ─────────────────────────────────────────────────────────

/// Read `key` as a text scalar. Numbers and booleans are rendered as their
/// JSON text; arrays, objects and null yield `None`.
pub fn text(item: &Value, key: &str) -> Option<String> {
  scalar_text(item.get(key)?)
}

fn scalar_text(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

/// Like [`text`], but an empty string also yields `None`.
pub fn non_empty_text(item: &Value, key: &str) -> Option<String> {
  text(item, key).filter(|s| !s.is_empty())
}

/// Read `key` as an integer. Floats are accepted only when integral.
pub fn integer(item: &Value, key: &str) -> Option<i64> {
  let n = item.get(key)?.as_number()?;
  if let Some(i) = n.as_i64() {
    return Some(i);
  }
  let f = n.as_f64()?;
  (f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
    .then_some(f as i64)
}

/// Read `key` as a timestamp. Numbers keep their integral or fractional
/// form, strings are kept as text; anything else yields `None`.
pub fn timestamp(item: &Value, key: &str) -> Option<Timestamp> {
  match item.get(key)? {
    Value::Number(_) => match integer(item, key) {
      Some(i) => Some(Timestamp::Integer(i)),
      None => real(item, key).map(Timestamp::Real),
    },
    Value::String(s) => Some(Timestamp::Text(s.clone())),
    _ => None,
  }
}

/// Read `key` as a floating-point number.
pub fn real(item: &Value, key: &str) -> Option<f64> {
  item.get(key)?.as_f64()
}

/// Serialise `key` as an opaque JSON blob. Absence and JSON `null` both
/// yield `None`.
pub fn blob(item: &Value, key: &str) -> Option<String> {
  match item.get(key)? {
    Value::Null => None,
    other => Some(other.to_string()),
  }
}

// ─── Collections ─────────────────────────────────────────────────────────────

/// The items of the array at `key`; anything that is not an array counts as
/// empty.
pub fn collection<'a>(doc: &'a Value, key: &str) -> &'a [Value] {
  doc
    .get(key)
    .and_then(Value::as_array)
    .map(Vec::as_slice)
    .unwrap_or_default()
}

/// The `final_state` object, if present and non-empty.
pub fn final_state(doc: &Value) -> Option<&Value> {
  doc
    .get(FINAL_STATE)
    .filter(|fs| fs.as_object().is_some_and(|m| !m.is_empty()))
}

/// The stakeholder list inside `final_state`, if it is an array.
pub fn final_stakeholders(doc: &Value) -> &[Value] {
  final_state(doc)
    .and_then(|fs| fs.get("stakeholders"))
    .and_then(Value::as_array)
    .map(Vec::as_slice)
    .unwrap_or_default()
}

/// Distinct mechanic ids referenced by canonical actions and mechanic events.
pub fn referenced_mechanics(doc: &Value) -> BTreeSet<String> {
  collection(doc, CANONICAL_ACTIONS)
    .iter()
    .chain(collection(doc, MECHANIC_EVENTS))
    .filter_map(|item| non_empty_text(item, "mechanic_id"))
    .collect()
}

/// Stable identifier for a stakeholder snapshot: `id`, then `shortId`, then
/// `name`.
pub fn stakeholder_id(entry: &Value) -> Option<String> {
  ["id", "shortId", "name"]
    .into_iter()
    .find_map(|key| non_empty_text(entry, key))
}

// ─── Metadata ────────────────────────────────────────────────────────────────

/// Scalar fields lifted out of `session_metadata`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
  pub session_id: Option<String>,
  pub user_id:    Option<String>,
  pub version_id: Option<String>,
  pub start_time: Option<String>,
  pub end_time:   Option<String>,
}

impl SessionMetadata {
  /// Extract metadata from `doc`. A missing or malformed `session_metadata`
  /// is treated as empty.
  pub fn from_document(doc: &Value) -> Self {
    let empty = Value::Null;
    let meta = doc.get(SESSION_METADATA).unwrap_or(&empty);
    Self {
      session_id: non_empty_text(meta, "session_id"),
      user_id:    non_empty_text(meta, "user_id"),
      version_id: non_empty_text(meta, "simulator_version_id"),
      start_time: text(meta, "start_time"),
      end_time:   text(meta, "end_time"),
    }
  }
}

/// The caller-side precondition for ingestion: a non-empty
/// `session_metadata.session_id`.
pub fn require_session_id(doc: &Value) -> Result<String> {
  SessionMetadata::from_document(doc)
    .session_id
    .ok_or(Error::MissingSessionId)
}
