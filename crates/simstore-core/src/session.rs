//! Session records and the relational rows derived from them.
//!
//! A session's raw JSON payload is the source of truth. Every other type in
//! this module is a projection of that payload, rebuilt on each
//! normalization pass.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Scalars ─────────────────────────────────────────────────────────────────

/// A client-supplied timestamp, kept in whatever form the client sent it:
/// integral epoch values stay integers, fractional ones stay floats and
/// anything textual (e.g. RFC 3339) stays text. Serialises as the bare
/// scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
  Integer(i64),
  Real(f64),
  Text(String),
}

// ─── Raw payload ─────────────────────────────────────────────────────────────

/// The scalar columns of a `sessions` row. Never carries the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
  pub session_id: String,
  pub user_id:    Option<String>,
  pub version_id: Option<String>,
  pub start_time: Option<String>,
  pub end_time:   Option<String>,
  /// Stored verbatim; re-normalization hands this back unchanged.
  pub created_at: String,
}

// ─── Normalization results ───────────────────────────────────────────────────

/// Input collection sizes seen by one normalization pass.
///
/// These count items in the document, not rows written: items skipped for
/// lacking an identifier are still counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeCounts {
  pub explicit_decisions: usize,
  pub expected_actions:   usize,
  pub canonical_actions:  usize,
  pub mechanic_events:    usize,
  pub comparisons:        usize,
  pub process_log:        usize,
  pub player_actions_log: usize,
}

/// Result of ingesting or re-normalizing one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
  pub session_id: String,
  pub counts:     NormalizeCounts,
}

// ─── Reference entities ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub user_id: String,
  pub name:    Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
  pub version_id: String,
  pub created_at: String,
}

/// A mechanic and the version it was most recently seen under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mechanic {
  pub mechanic_id: String,
  pub version_id:  Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stakeholder {
  pub stakeholder_id: String,
  pub name:           Option<String>,
  pub role:           Option<String>,
}

// ─── Derived rows ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplicitDecision {
  pub decision_id:  i64,
  pub session_id:   String,
  pub node_id:      Option<String>,
  pub option_id:    Option<String>,
  pub option_text:  Option<String>,
  pub stakeholder:  Option<String>,
  pub day:          Option<i64>,
  pub time_slot:    Option<String>,
  pub consequences: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedAction {
  pub expected_action_id: String,
  pub session_id:         String,
  pub source_node_id:     Option<String>,
  pub source_option_id:   Option<String>,
  pub action_type:        Option<String>,
  pub target_ref:         Option<String>,
  pub constraints:        Option<Value>,
  pub rule_id:            Option<String>,
  pub created_at:         Option<Timestamp>,
  pub mechanic_id:        Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalAction {
  pub canonical_action_id: String,
  pub session_id:          String,
  pub mechanic_id:         Option<String>,
  pub action_type:         Option<String>,
  pub target_ref:          Option<String>,
  pub value_final:         Option<Value>,
  pub committed_at:        Option<Timestamp>,
  pub context:             Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanicEvent {
  pub event_id:    String,
  pub session_id:  String,
  pub mechanic_id: Option<String>,
  pub event_type:  Option<String>,
  pub timestamp:   Option<Timestamp>,
  pub payload:     Option<Value>,
}

/// Outcome of matching an expected action against a canonical one. Either
/// side may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
  pub comparison_id:       i64,
  pub session_id:          String,
  pub expected_action_id:  Option<String>,
  pub canonical_action_id: Option<String>,
  pub outcome:             Option<String>,
  pub deviation:           Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessLog {
  pub process_log_id: i64,
  pub session_id:     String,
  pub node_id:        Option<String>,
  pub start_time:     Option<f64>,
  pub end_time:       Option<f64>,
  pub total_duration: Option<f64>,
  pub final_choice:   Option<String>,
  pub events:         Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerAction {
  pub player_action_id: i64,
  pub session_id:       String,
  pub event:            Option<String>,
  pub metadata:         Option<Value>,
  pub day:              Option<i64>,
  pub time_slot:        Option<String>,
  pub timestamp:        Option<f64>,
}

/// The final stakeholder snapshot and global state of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
  pub session_id:   String,
  pub stakeholders: Option<Value>,
  pub global_state: Option<Value>,
}

/// One stakeholder's state at session end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStakeholder {
  pub session_id:     String,
  pub stakeholder_id: String,
  pub state:          Option<Value>,
}

// ─── Projection ──────────────────────────────────────────────────────────────

/// Every normalized row belonging to one session, reassembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSession {
  pub session:              SessionSummary,
  pub user:                 Option<User>,
  pub version:              Option<Version>,
  pub mechanics:            Vec<Mechanic>,
  pub explicit_decisions:   Vec<ExplicitDecision>,
  pub expected_actions:     Vec<ExpectedAction>,
  pub canonical_actions:    Vec<CanonicalAction>,
  pub mechanic_events:      Vec<MechanicEvent>,
  pub comparisons:          Vec<Comparison>,
  pub process_logs:         Vec<ProcessLog>,
  pub player_actions_log:   Vec<PlayerAction>,
  pub session_stakeholders: Vec<SessionStakeholder>,
  pub session_state:        Option<SessionState>,
}
