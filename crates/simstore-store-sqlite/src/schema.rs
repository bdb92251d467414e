//! SQL schema for the simstore SQLite store.
//!
//! [`ensure_schema`] runs on every connection open. Table creation is
//! idempotent thanks to `CREATE TABLE IF NOT EXISTS`; older `sessions` tables
//! are brought forward by adding missing columns, never by rewriting them.

use rusqlite::Connection;

/// Per-connection settings. Must run outside any transaction.
const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
";

/// Full table DDL.
pub const SCHEMA: &str = "
-- Reference entities: inserted on first sighting, never removed by
-- normalization.
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    name    TEXT
);

CREATE TABLE IF NOT EXISTS versions (
    version_id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS mechanics (
    mechanic_id TEXT PRIMARY KEY,
    version_id  TEXT REFERENCES versions(version_id)   -- last seen under
);

CREATE TABLE IF NOT EXISTS stakeholders (
    stakeholder_id TEXT PRIMARY KEY,
    name           TEXT,
    role           TEXT
);

-- One row per session. `payload` is the source of truth; every table below
-- is derived from it.
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    user_id    TEXT REFERENCES users(user_id),
    version_id TEXT REFERENCES versions(version_id),
    start_time TEXT,
    end_time   TEXT,
    created_at TEXT NOT NULL,
    payload    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS explicit_decisions (
    decision_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id   TEXT NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    node_id      TEXT,
    option_id    TEXT,
    option_text  TEXT,
    stakeholder  TEXT,
    day          INTEGER,
    time_slot    TEXT,
    consequences TEXT               -- JSON
);

CREATE TABLE IF NOT EXISTS expected_actions (
    session_id         TEXT NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    expected_action_id TEXT NOT NULL,
    source_node_id     TEXT,
    source_option_id   TEXT,
    action_type        TEXT,
    target_ref         TEXT,
    constraints        TEXT,        -- JSON
    rule_id            TEXT,
    created_at         INTEGER,
    mechanic_id        TEXT,
    PRIMARY KEY (session_id, expected_action_id)
);

CREATE TABLE IF NOT EXISTS canonical_actions (
    session_id          TEXT NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    canonical_action_id TEXT NOT NULL,
    mechanic_id         TEXT,
    action_type         TEXT,
    target_ref          TEXT,
    value_final         TEXT,       -- JSON
    committed_at        INTEGER,
    context             TEXT,       -- JSON
    PRIMARY KEY (session_id, canonical_action_id)
);

CREATE TABLE IF NOT EXISTS mechanic_events (
    session_id  TEXT NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    event_id    TEXT NOT NULL,
    mechanic_id TEXT,
    event_type  TEXT,
    timestamp   INTEGER,
    payload     TEXT,               -- JSON
    PRIMARY KEY (session_id, event_id)
);

-- Action ids here are plain references: a comparison may name an action the
-- session never recorded.
CREATE TABLE IF NOT EXISTS comparisons (
    comparison_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id          TEXT NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    expected_action_id  TEXT,
    canonical_action_id TEXT,
    outcome             TEXT,
    deviation           TEXT        -- JSON
);

CREATE TABLE IF NOT EXISTS process_logs (
    process_log_id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id     TEXT NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    node_id        TEXT,
    start_time     REAL,
    end_time       REAL,
    total_duration REAL,
    final_choice   TEXT,
    events         TEXT             -- JSON
);

CREATE TABLE IF NOT EXISTS player_actions_log (
    player_action_id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id       TEXT NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    event            TEXT,
    metadata         TEXT,          -- JSON
    day              INTEGER,
    time_slot        TEXT,
    timestamp        REAL
);

CREATE TABLE IF NOT EXISTS session_state (
    session_id   TEXT PRIMARY KEY REFERENCES sessions(session_id) ON DELETE CASCADE,
    stakeholders TEXT,              -- JSON
    global_state TEXT               -- JSON
);

CREATE TABLE IF NOT EXISTS session_stakeholders (
    session_id     TEXT NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    stakeholder_id TEXT NOT NULL REFERENCES stakeholders(stakeholder_id),
    state          TEXT,            -- JSON
    PRIMARY KEY (session_id, stakeholder_id)
);

CREATE INDEX IF NOT EXISTS idx_decisions_session   ON explicit_decisions(session_id);
CREATE INDEX IF NOT EXISTS idx_comparisons_session ON comparisons(session_id);
CREATE INDEX IF NOT EXISTS idx_process_session     ON process_logs(session_id);
CREATE INDEX IF NOT EXISTS idx_player_session      ON player_actions_log(session_id);

PRAGMA user_version = 1;
";

/// Indexes on columns an older `sessions` table may only gain through
/// [`SESSION_COLUMNS`].
const SESSION_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_sessions_created ON sessions(created_at);
";

/// Columns older deployments of `sessions` may lack, with the definition used
/// to add them.
const SESSION_COLUMNS: &[(&str, &str)] = &[
  ("user_id", "TEXT"),
  ("version_id", "TEXT"),
  ("start_time", "TEXT"),
  ("end_time", "TEXT"),
  ("created_at", "TEXT NOT NULL DEFAULT ''"),
  ("payload", "TEXT"),
];

/// Tables holding rows derived from a session's payload, cleared at the start
/// of every normalization pass.
pub const DERIVED_TABLES: &[&str] = &[
  "explicit_decisions",
  "expected_actions",
  "canonical_actions",
  "mechanic_events",
  "comparisons",
  "process_logs",
  "player_actions_log",
  "session_state",
  "session_stakeholders",
];

/// Create every table and index that is missing and add any column an older
/// `sessions` table lacks. A no-op on an up-to-date database.
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
  conn.execute_batch(PRAGMAS)?;
  conn.execute_batch(SCHEMA)?;
  for (column, definition) in SESSION_COLUMNS {
    add_column_if_missing(conn, "sessions", column, definition)?;
  }
  conn.execute_batch(SESSION_INDEXES)?;
  Ok(())
}

/// Names of the columns of `table`; empty if the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
  let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
  stmt
    .query_map([], |row| row.get::<_, String>(1))?
    .collect()
}

fn add_column_if_missing(
  conn: &Connection,
  table: &str,
  column: &str,
  definition: &str,
) -> rusqlite::Result<()> {
  if table_columns(conn, table)?.iter().any(|c| c == column) {
    return Ok(());
  }
  conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"))
}
