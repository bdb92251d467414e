//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{TimeZone as _, Utc};
use serde_json::{Value, json};
use simstore_core::{Error as CoreError, session::Timestamp, store::SessionStore};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn at(hour: u32) -> chrono::DateTime<Utc> {
  Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap()
}

/// A session touching every collection.
fn full_session(id: &str) -> Value {
  json!({
    "session_metadata": {
      "session_id": id,
      "user_id": "u1",
      "simulator_version_id": "v1",
      "start_time": "2025-06-01T09:00:00Z",
      "end_time": "2025-06-01T09:45:00Z"
    },
    "explicit_decisions": [
      {
        "nodeId": "n1", "choiceId": "c2", "choiceText": "Call the mayor",
        "stakeholder": "mayor", "day": 1, "timeSlot": "morning",
        "consequences": { "trust": { "mayor": 2, "press": -1 }, "notes": ["a", "b"] }
      },
      { "nodeId": "n2", "choiceId": "c1" }
    ],
    "expected_actions": [
      {
        "expected_action_id": "ea1",
        "source": { "node_id": "n1", "option_id": "c2" },
        "action_type": "send_email", "target_ref": "mayor",
        "constraints": { "deadline_day": 2 }, "rule_id": "r7",
        "created_at": 1717232400000_i64, "mechanic_id": "email"
      }
    ],
    "canonical_actions": [
      {
        "canonical_action_id": "ca1", "mechanic_id": "email",
        "action_type": "send_email", "target_ref": "mayor",
        "value_final": { "subject": "Update", "cc": [] },
        "committed_at": 1717232500000_i64, "context": { "draft_count": 3 }
      }
    ],
    "mechanic_events": [
      {
        "event_id": "ev1", "mechanic_id": "map", "event_type": "pan",
        "timestamp": 1717232450000_i64, "payload": { "x": 10.5, "y": -3 }
      }
    ],
    "comparisons": [
      {
        "expected_action_id": "ea1", "canonical_action_id": "ca1",
        "outcome": "match", "deviation": null
      },
      { "expected_action_id": "ea-missing", "outcome": "missed", "deviation": { "reason": "absent" } }
    ],
    "process_log": [
      {
        "nodeId": "n1", "startTime": 0.0, "endTime": 12.5, "totalDuration": 12.5,
        "finalChoice": "c2", "events": [{ "type": "hover", "t": 1.2 }]
      }
    ],
    "player_actions_log": [
      { "event": "open_map", "metadata": { "zoom": 3 }, "day": 1, "timeSlot": "morning", "timestamp": 4.25 }
    ],
    "final_state": {
      "stakeholders": [
        { "id": "mayor", "name": "Mayor Lin", "role": "official", "trust": 7 },
        { "shortId": "press", "name": "Daily Post", "trust": 2 }
      ],
      "global": { "budget": 1200, "day": 3 }
    }
  })
}

// ─── Ingestion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_returns_input_collection_counts() {
  let s = store().await;
  let outcome = s.ingest(full_session("s1")).await.unwrap();

  assert_eq!(outcome.session_id, "s1");
  let c = outcome.counts;
  assert_eq!(c.explicit_decisions, 2);
  assert_eq!(c.expected_actions, 1);
  assert_eq!(c.canonical_actions, 1);
  assert_eq!(c.mechanic_events, 1);
  assert_eq!(c.comparisons, 2);
  assert_eq!(c.process_log, 1);
  assert_eq!(c.player_actions_log, 1);
}

#[tokio::test]
async fn ingest_without_session_id_is_rejected_before_writing() {
  let s = store().await;
  let err = s
    .ingest(json!({ "session_metadata": { "user_id": "u1" } }))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::MissingSessionId)));

  assert!(s.list_summaries(100).await.unwrap().is_empty());
  assert!(s.get_user("u1").await.unwrap().is_none());
}

#[tokio::test]
async fn end_to_end_single_canonical_action() {
  let s = store().await;
  s.ingest(json!({
    "session_metadata": { "session_id": "s1", "user_id": "u1" },
    "canonical_actions": [
      { "canonical_action_id": "a1", "mechanic_id": "m1", "value_final": { "x": 1 } }
    ]
  }))
  .await
  .unwrap();

  let view = s.get_normalized("s1").await.unwrap().unwrap();
  assert_eq!(view.canonical_actions.len(), 1);
  assert_eq!(view.canonical_actions[0].value_final, Some(json!({ "x": 1 })));
  assert_eq!(view.mechanics.len(), 1);
  assert_eq!(view.mechanics[0].mechanic_id, "m1");
  assert_eq!(view.user.as_ref().map(|u| u.user_id.as_str()), Some("u1"));
  assert!(view.version.is_none());
  assert!(view.session_state.is_none());
  assert!(view.explicit_decisions.is_empty());
}

#[tokio::test]
async fn missing_metadata_fields_are_null() {
  let s = store().await;
  s.ingest(json!({ "session_metadata": { "session_id": "bare" } }))
    .await
    .unwrap();

  let summary = s.get_latest_summary().await.unwrap().unwrap();
  assert_eq!(summary.session_id, "bare");
  assert_eq!(summary.user_id, None);
  assert_eq!(summary.version_id, None);
  assert_eq!(summary.start_time, None);
}

#[tokio::test]
async fn malformed_items_do_not_abort_the_pass() {
  let s = store().await;
  let outcome = s
    .ingest(json!({
      "session_metadata": { "session_id": "odd" },
      "explicit_decisions": ["not an object", { "day": "tuesday", "nodeId": 5 }],
      "canonical_actions": [{ "mechanic_id": "m1" }],
      "comparisons": { "not": "a list" },
      "final_state": "done"
    }))
    .await
    .unwrap();

  assert_eq!(outcome.counts.explicit_decisions, 2);
  assert_eq!(outcome.counts.canonical_actions, 1);
  assert_eq!(outcome.counts.comparisons, 0);

  let view = s.get_normalized("odd").await.unwrap().unwrap();
  assert_eq!(view.explicit_decisions.len(), 2);
  assert_eq!(view.explicit_decisions[0].node_id, None);
  assert_eq!(view.explicit_decisions[1].day, None);
  assert_eq!(view.explicit_decisions[1].node_id.as_deref(), Some("5"));
  // No id: counted but not stored.
  assert!(view.canonical_actions.is_empty());
  assert!(view.session_state.is_none());
}

// ─── Raw payload facade ──────────────────────────────────────────────────────

#[tokio::test]
async fn get_raw_returns_the_document_verbatim() {
  let s = store().await;
  let doc = full_session("s1");
  s.ingest(doc.clone()).await.unwrap();

  let raw = s.get_raw("s1").await.unwrap().unwrap();
  assert_eq!(raw, doc);
  assert_eq!(raw.to_string(), doc.to_string());
}

#[tokio::test]
async fn get_raw_unknown_is_none() {
  let s = store().await;
  assert!(s.get_raw("nope").await.unwrap().is_none());
  assert!(s.get_normalized("nope").await.unwrap().is_none());
  assert!(s.normalize_existing("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn summaries_are_newest_first_and_limited() {
  let s = store().await;
  assert!(s.list_summaries(10).await.unwrap().is_empty());
  assert!(s.get_latest_summary().await.unwrap().is_none());

  s.ingest_at(full_session("early"), at(8)).await.unwrap();
  s.ingest_at(full_session("late"), at(11)).await.unwrap();
  s.ingest_at(full_session("middle"), at(9)).await.unwrap();

  let ids: Vec<_> = s
    .list_summaries(10)
    .await
    .unwrap()
    .into_iter()
    .map(|s| s.session_id)
    .collect();
  assert_eq!(ids, ["late", "middle", "early"]);

  assert_eq!(s.list_summaries(2).await.unwrap().len(), 2);

  let latest = s.get_latest_summary().await.unwrap().unwrap();
  assert_eq!(latest.session_id, "late");
  assert_eq!(latest.created_at, "2025-06-01T11:00:00.000000Z");
  assert_eq!(latest.user_id.as_deref(), Some("u1"));
  assert_eq!(latest.version_id.as_deref(), Some("v1"));
}

#[tokio::test]
async fn put_raw_leaves_derived_rows_alone() {
  let s = store().await;
  s.put_raw("s1".into(), full_session("s1"), at(8)).await.unwrap();

  let view = s.get_normalized("s1").await.unwrap().unwrap();
  assert_eq!(view.session.user_id.as_deref(), Some("u1"));
  assert!(view.canonical_actions.is_empty());
  assert!(view.explicit_decisions.is_empty());

  let counts = s.normalize_existing("s1").await.unwrap().unwrap();
  assert_eq!(counts.canonical_actions, 1);
  let view = s.get_normalized("s1").await.unwrap().unwrap();
  assert_eq!(view.canonical_actions.len(), 1);
  assert_eq!(view.session.created_at, "2025-06-01T08:00:00.000000Z");
}

// ─── Idempotence ─────────────────────────────────────────────────────────────

/// Strip surrogate row ids so two passes can be compared by content.
fn content(view: &simstore_core::session::NormalizedSession) -> Value {
  let mut v = serde_json::to_value(view).unwrap();
  for (table, id) in [
    ("explicit_decisions", "decision_id"),
    ("comparisons", "comparison_id"),
    ("process_logs", "process_log_id"),
    ("player_actions_log", "player_action_id"),
  ] {
    for row in v[table].as_array_mut().unwrap() {
      row.as_object_mut().unwrap().remove(id);
    }
  }
  v
}

#[tokio::test]
async fn normalizing_twice_yields_the_same_state() {
  let s = store().await;
  s.ingest_at(full_session("s1"), at(8)).await.unwrap();
  let first = s.get_normalized("s1").await.unwrap().unwrap();

  s.ingest_at(full_session("s1"), at(8)).await.unwrap();
  let second = s.get_normalized("s1").await.unwrap().unwrap();

  assert_eq!(first.expected_actions, second.expected_actions);
  assert_eq!(first.canonical_actions, second.canonical_actions);
  assert_eq!(first.mechanic_events, second.mechanic_events);
  assert_eq!(second.explicit_decisions.len(), 2);
  assert_eq!(second.comparisons.len(), 2);
  assert_eq!(content(&first), content(&second));
}

#[tokio::test]
async fn normalize_existing_keeps_created_at() {
  let s = store().await;
  s.ingest_at(full_session("s1"), at(7)).await.unwrap();

  let counts = s.normalize_existing("s1").await.unwrap().unwrap();
  assert_eq!(counts.explicit_decisions, 2);

  let summary = s.get_latest_summary().await.unwrap().unwrap();
  assert_eq!(summary.created_at, "2025-06-01T07:00:00.000000Z");
  let view = s.get_normalized("s1").await.unwrap().unwrap();
  assert_eq!(view.explicit_decisions.len(), 2);
}

#[tokio::test]
async fn reingest_replaces_rows_from_previous_document() {
  let s = store().await;
  s.ingest(full_session("s1")).await.unwrap();

  let mut smaller = full_session("s1");
  smaller["explicit_decisions"] = json!([{ "nodeId": "only" }]);
  smaller["canonical_actions"] = json!([]);
  smaller.as_object_mut().unwrap().remove("final_state");
  s.ingest(smaller).await.unwrap();

  let view = s.get_normalized("s1").await.unwrap().unwrap();
  assert_eq!(view.explicit_decisions.len(), 1);
  assert_eq!(view.explicit_decisions[0].node_id.as_deref(), Some("only"));
  assert!(view.canonical_actions.is_empty());
  assert!(view.session_state.is_none());
  assert!(view.session_stakeholders.is_empty());
  // Stakeholder reference rows outlive the snapshot.
  assert!(s.get_stakeholder("mayor").await.unwrap().is_some());
}

#[tokio::test]
async fn duplicate_external_ids_keep_the_last_item() {
  let s = store().await;
  s.ingest(json!({
    "session_metadata": { "session_id": "s1" },
    "mechanic_events": [
      { "event_id": "e1", "event_type": "first" },
      { "event_id": "e1", "event_type": "second" }
    ]
  }))
  .await
  .unwrap();

  let view = s.get_normalized("s1").await.unwrap().unwrap();
  assert_eq!(view.mechanic_events.len(), 1);
  assert_eq!(view.mechanic_events[0].event_type.as_deref(), Some("second"));
}

#[tokio::test]
async fn external_ids_are_scoped_per_session() {
  let s = store().await;
  s.ingest(full_session("s1")).await.unwrap();
  s.ingest(full_session("s2")).await.unwrap();

  for id in ["s1", "s2"] {
    let view = s.get_normalized(id).await.unwrap().unwrap();
    assert_eq!(view.canonical_actions.len(), 1, "{id}");
    assert_eq!(view.canonical_actions[0].session_id, id);
  }
}

#[tokio::test]
async fn normalize_all_covers_every_session() {
  let s = store().await;
  s.ingest_at(full_session("a"), at(8)).await.unwrap();
  s.ingest_at(full_session("b"), at(9)).await.unwrap();

  let outcomes = s.normalize_all().await.unwrap();
  let ids: Vec<_> = outcomes.iter().map(|o| o.session_id.as_str()).collect();
  assert_eq!(ids, ["a", "b"]);
  assert!(outcomes.iter().all(|o| o.counts.comparisons == 2));

  let view = s.get_normalized("b").await.unwrap().unwrap();
  assert_eq!(view.comparisons.len(), 2);
  assert_eq!(view.session.created_at, "2025-06-01T09:00:00.000000Z");
}

// ─── Blob round-trip ─────────────────────────────────────────────────────────

#[tokio::test]
async fn opaque_blobs_round_trip() {
  let s = store().await;
  let doc = full_session("s1");
  s.ingest(doc.clone()).await.unwrap();
  let view = s.get_normalized("s1").await.unwrap().unwrap();

  assert_eq!(
    view.explicit_decisions[0].consequences.as_ref(),
    Some(&doc["explicit_decisions"][0]["consequences"])
  );
  assert_eq!(view.explicit_decisions[1].consequences, None);
  assert_eq!(
    view.expected_actions[0].constraints.as_ref(),
    Some(&doc["expected_actions"][0]["constraints"])
  );
  assert_eq!(
    view.canonical_actions[0].context.as_ref(),
    Some(&doc["canonical_actions"][0]["context"])
  );
  assert_eq!(
    view.mechanic_events[0].payload.as_ref(),
    Some(&doc["mechanic_events"][0]["payload"])
  );
  assert_eq!(view.comparisons[0].deviation, None);
  assert_eq!(
    view.comparisons[1].deviation.as_ref(),
    Some(&doc["comparisons"][1]["deviation"])
  );
  assert_eq!(
    view.process_logs[0].events.as_ref(),
    Some(&doc["process_log"][0]["events"])
  );
  assert_eq!(
    view.player_actions_log[0].metadata.as_ref(),
    Some(&doc["player_actions_log"][0]["metadata"])
  );

  let state = view.session_state.unwrap();
  assert_eq!(state.stakeholders.as_ref(), Some(&doc["final_state"]["stakeholders"]));
  assert_eq!(state.global_state.as_ref(), Some(&doc["final_state"]["global"]));
}

#[tokio::test]
async fn scalar_columns_are_flattened() {
  let s = store().await;
  s.ingest(full_session("s1")).await.unwrap();
  let view = s.get_normalized("s1").await.unwrap().unwrap();

  let d = &view.explicit_decisions[0];
  assert_eq!(d.node_id.as_deref(), Some("n1"));
  assert_eq!(d.option_id.as_deref(), Some("c2"));
  assert_eq!(d.option_text.as_deref(), Some("Call the mayor"));
  assert_eq!(d.day, Some(1));
  assert_eq!(d.time_slot.as_deref(), Some("morning"));

  let e = &view.expected_actions[0];
  assert_eq!(e.source_node_id.as_deref(), Some("n1"));
  assert_eq!(e.source_option_id.as_deref(), Some("c2"));
  assert_eq!(e.rule_id.as_deref(), Some("r7"));
  assert_eq!(e.created_at, Some(Timestamp::Integer(1717232400000)));

  let p = &view.process_logs[0];
  assert_eq!(p.total_duration, Some(12.5));
  assert_eq!(p.final_choice.as_deref(), Some("c2"));

  let pa = &view.player_actions_log[0];
  assert_eq!(pa.timestamp, Some(4.25));
  assert_eq!(pa.event.as_deref(), Some("open_map"));
}

#[tokio::test]
async fn timestamps_are_kept_in_client_form() {
  let s = store().await;
  s.ingest(json!({
    "session_metadata": { "session_id": "s1" },
    "expected_actions": [
      { "expected_action_id": "x1", "created_at": "2025-06-01T09:00:00.250Z" }
    ],
    "canonical_actions": [
      { "canonical_action_id": "c1", "committed_at": "2025-06-01T10:00:00Z" },
      { "canonical_action_id": "c2", "committed_at": 1717232500000.0 }
    ],
    "mechanic_events": [
      { "event_id": "e1", "timestamp": 1717171717123.5 },
      { "event_id": "e2", "timestamp": { "not": "a time" } }
    ]
  }))
  .await
  .unwrap();

  let view = s.get_normalized("s1").await.unwrap().unwrap();
  assert_eq!(
    view.expected_actions[0].created_at,
    Some(Timestamp::Text("2025-06-01T09:00:00.250Z".into()))
  );
  assert_eq!(
    view.canonical_actions[0].committed_at,
    Some(Timestamp::Text("2025-06-01T10:00:00Z".into()))
  );
  assert_eq!(
    view.canonical_actions[1].committed_at,
    Some(Timestamp::Integer(1717232500000))
  );
  assert_eq!(view.mechanic_events[0].timestamp, Some(Timestamp::Real(1717171717123.5)));
  assert_eq!(view.mechanic_events[1].timestamp, None);

  // The projection serialises them back as the bare scalars.
  let json = serde_json::to_value(&view).unwrap();
  assert_eq!(json["mechanic_events"][0]["timestamp"], json!(1717171717123.5));
  assert_eq!(json["canonical_actions"][0]["committed_at"], "2025-06-01T10:00:00Z");
}

// ─── Reference entities ──────────────────────────────────────────────────────

#[tokio::test]
async fn reference_rows_are_created_once() {
  let s = store().await;
  s.ingest_at(full_session("s1"), at(8)).await.unwrap();

  let mut other = full_session("s2");
  other["final_state"]["stakeholders"][0]["name"] = json!("Renamed");
  other["final_state"]["stakeholders"][0]["role"] = json!("changed");
  s.ingest_at(other, at(9)).await.unwrap();

  let version = s.get_version("v1").await.unwrap().unwrap();
  assert_eq!(version.created_at, "2025-06-01T08:00:00.000000Z");

  let user = s.get_user("u1").await.unwrap().unwrap();
  assert_eq!(user.name.as_deref(), Some("u1"));

  let mayor = s.get_stakeholder("mayor").await.unwrap().unwrap();
  assert_eq!(mayor.name.as_deref(), Some("Mayor Lin"));
  assert_eq!(mayor.role.as_deref(), Some("official"));
}

#[tokio::test]
async fn mechanic_version_is_last_write_wins() {
  let s = store().await;
  let session = |id: &str, version: &str| {
    json!({
      "session_metadata": { "session_id": id, "simulator_version_id": version },
      "mechanic_events": [{ "event_id": "e", "mechanic_id": "email" }]
    })
  };

  s.ingest(session("s1", "v1")).await.unwrap();
  assert_eq!(
    s.get_mechanic("email").await.unwrap().unwrap().version_id.as_deref(),
    Some("v1")
  );

  s.ingest(session("s2", "v2")).await.unwrap();
  assert_eq!(
    s.get_mechanic("email").await.unwrap().unwrap().version_id.as_deref(),
    Some("v2")
  );

  s.normalize_existing("s1").await.unwrap().unwrap();
  assert_eq!(
    s.get_mechanic("email").await.unwrap().unwrap().version_id.as_deref(),
    Some("v1")
  );
}

#[tokio::test]
async fn stakeholder_id_derivation() {
  let s = store().await;
  s.ingest(json!({
    "session_metadata": { "session_id": "s1" },
    "final_state": {
      "stakeholders": [{ "id": "A" }, { "shortId": "B" }, { "name": "C" }, {}]
    }
  }))
  .await
  .unwrap();

  for id in ["A", "B", "C"] {
    assert!(s.get_stakeholder(id).await.unwrap().is_some(), "{id}");
  }

  let view = s.get_normalized("s1").await.unwrap().unwrap();
  let ids: Vec<_> = view
    .session_stakeholders
    .iter()
    .map(|l| l.stakeholder_id.as_str())
    .collect();
  assert_eq!(ids, ["A", "B", "C"]);
  assert_eq!(view.session_stakeholders[1].state, Some(json!({ "shortId": "B" })));

  // The state row keeps the full list, including the unidentifiable entry.
  let state = view.session_state.unwrap();
  assert_eq!(state.stakeholders.unwrap().as_array().unwrap().len(), 4);
  assert_eq!(state.global_state, None);
}

// ─── Cascade ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn deleting_a_session_cascades_to_its_rows_only() {
  let s = store().await;
  s.ingest(full_session("gone")).await.unwrap();
  s.ingest(full_session("kept")).await.unwrap();

  assert!(s.delete_session("gone").await.unwrap());
  assert!(!s.delete_session("gone").await.unwrap());
  assert!(s.get_normalized("gone").await.unwrap().is_none());

  let counts: Vec<i64> = s
    .conn
    .call(|conn| {
      let mut out = Vec::new();
      for table in crate::schema::DERIVED_TABLES {
        out.push(conn.query_row(
          &format!("SELECT COUNT(*) FROM {table} WHERE session_id = 'gone'"),
          [],
          |r| r.get::<_, i64>(0),
        )?);
      }
      Ok(out)
    })
    .await
    .unwrap();
  assert!(counts.iter().all(|&n| n == 0), "{counts:?}");

  let kept = s.get_normalized("kept").await.unwrap().unwrap();
  assert_eq!(kept.explicit_decisions.len(), 2);
  assert_eq!(kept.comparisons.len(), 2);
  assert_eq!(kept.session_stakeholders.len(), 2);
  assert!(kept.session_state.is_some());

  // Reference entities survive.
  assert!(s.get_user("u1").await.unwrap().is_some());
  assert!(s.get_mechanic("email").await.unwrap().is_some());
}

// ─── Bulk rebuild ────────────────────────────────────────────────────────────

mod rebuild {
  use std::{fs, path::Path};

  use super::*;
  use crate::rebuild::{RebuildReport, rebuild, temp_path};

  /// Derived rows only: reference entities are shared across sessions, so a
  /// multi-session rebuild can legitimately differ from a lone pass there.
  fn derived(view: &simstore_core::session::NormalizedSession) -> Value {
    let mut v = content(view);
    let obj = v.as_object_mut().unwrap();
    for key in ["user", "version", "mechanics"] {
      obj.remove(key);
    }
    v
  }

  async fn seed(path: &Path, docs: &[(Value, u32)]) {
    let s = SqliteStore::open(path).await.unwrap();
    for (doc, hour) in docs {
      s.ingest_at(doc.clone(), at(*hour)).await.unwrap();
    }
    s.close().await.unwrap();
  }

  fn raw_sql(path: &Path, sql: &str) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(sql).unwrap();
  }

  #[tokio::test]
  async fn rebuild_matches_direct_normalization() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.db");
    let target = dir.path().join("target.db");

    let docs = [(full_session("a"), 8), (full_session("b"), 9)];
    seed(&source, &docs).await;
    raw_sql(
      &source,
      "INSERT INTO sessions (session_id, created_at, payload) VALUES ('empty', 'x', '')",
    );

    let report = rebuild(&source, &target, false).unwrap();
    assert_eq!(report, RebuildReport { processed: 2, skipped: 1 });
    assert!(!temp_path(&target).exists());

    let rebuilt = SqliteStore::open(&target).await.unwrap();
    assert!(rebuilt.get_raw("empty").await.unwrap().is_none());
    for (doc, hour) in docs {
      let id = doc["session_metadata"]["session_id"].as_str().unwrap().to_owned();

      let fresh = store().await;
      fresh.ingest_at(doc, at(hour)).await.unwrap();
      let expected = fresh.get_normalized(&id).await.unwrap().unwrap();

      let actual = rebuilt.get_normalized(&id).await.unwrap().unwrap();
      assert_eq!(derived(&actual), derived(&expected), "{id}");
    }
  }

  #[tokio::test]
  async fn rebuild_leaves_source_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.db");
    let target = dir.path().join("target.db");
    seed(&source, &[(full_session("a"), 8)]).await;
    let before = fs::read(&source).unwrap();

    rebuild(&source, &target, false).unwrap();
    assert_eq!(fs::read(&source).unwrap(), before);
  }

  #[test]
  fn existing_target_without_overwrite_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.db");
    let target = dir.path().join("target.db");
    raw_sql(
      &source,
      "CREATE TABLE sessions (session_id TEXT PRIMARY KEY, created_at TEXT, payload TEXT);",
    );
    fs::write(&target, b"do not touch").unwrap();
    let modified = fs::metadata(&target).unwrap().modified().unwrap();

    let err = rebuild(&source, &target, false).unwrap_err();
    assert!(matches!(err, Error::Precondition(_)), "{err}");
    assert_eq!(fs::read(&target).unwrap(), b"do not touch");
    assert_eq!(fs::metadata(&target).unwrap().modified().unwrap(), modified);
    assert!(!temp_path(&target).exists());
  }

  #[tokio::test]
  async fn overwrite_replaces_existing_target() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.db");
    let target = dir.path().join("target.db");
    seed(&source, &[(full_session("a"), 8)]).await;
    fs::write(&target, b"stale").unwrap();
    fs::write(temp_path(&target), b"leftover").unwrap();

    let report = rebuild(&source, &target, true).unwrap();
    assert_eq!(report.processed, 1);

    let rebuilt = SqliteStore::open(&target).await.unwrap();
    let view = rebuilt.get_normalized("a").await.unwrap().unwrap();
    assert_eq!(view.canonical_actions.len(), 1);
    assert_eq!(view.session.created_at, "2025-06-01T08:00:00.000000Z");
  }

  #[test]
  fn missing_source_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("target.db");
    let err = rebuild(&dir.path().join("absent.db"), &target, false).unwrap_err();
    assert!(matches!(err, Error::Precondition(_)));
    assert!(!target.exists());
  }

  #[test]
  fn source_without_payload_column_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("target.db");

    let no_table = dir.path().join("no_table.db");
    raw_sql(&no_table, "CREATE TABLE other (x INTEGER);");
    let err = rebuild(&no_table, &target, false).unwrap_err();
    assert!(matches!(err, Error::Precondition(_)));

    let no_payload = dir.path().join("no_payload.db");
    raw_sql(&no_payload, "CREATE TABLE sessions (session_id TEXT PRIMARY KEY);");
    let err = rebuild(&no_payload, &target, false).unwrap_err();
    assert!(matches!(err, Error::Precondition(_)));

    assert!(!target.exists());
    assert!(!temp_path(&target).exists());
  }

  #[tokio::test]
  async fn legacy_source_without_created_at_is_replayed() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("legacy.db");
    let target = dir.path().join("target.db");
    let payload = json!({ "session_metadata": { "session_id": "old", "user_id": "u9" } });
    raw_sql(
      &source,
      &format!(
        "CREATE TABLE sessions (session_id TEXT PRIMARY KEY, payload TEXT);
         INSERT INTO sessions VALUES ('old', '{payload}');"
      ),
    );

    let report = rebuild(&source, &target, false).unwrap();
    assert_eq!(report.processed, 1);

    let rebuilt = SqliteStore::open(&target).await.unwrap();
    let summary = rebuilt.get_latest_summary().await.unwrap().unwrap();
    assert_eq!(summary.session_id, "old");
    assert_eq!(summary.user_id.as_deref(), Some("u9"));
    assert!(!summary.created_at.is_empty());
  }

  #[test]
  fn corrupt_payload_aborts_and_discards_the_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.db");
    let target = dir.path().join("target.db");
    raw_sql(
      &source,
      "CREATE TABLE sessions (session_id TEXT PRIMARY KEY, created_at TEXT, payload TEXT);
       INSERT INTO sessions VALUES ('bad', '2025-01-01', '{not json');",
    );

    assert!(rebuild(&source, &target, false).is_err());
    assert!(!target.exists());
    assert!(!temp_path(&target).exists());
  }
}
