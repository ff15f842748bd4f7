//! Integration tests for `SqliteStore` against an in-memory database.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate};
use serde_json::json;
use trainlog_core::{
  entity::{LocationName, NewLocation, RouteKey, StopTransitionKey, TrainId, TrainKey},
  fact::{FactKey, FactWrite, NewFact},
  ingest::Ingestor,
  snapshot::Snapshot,
  store::{EntityStore, TableCounts},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn name(s: &str) -> LocationName { LocationName::canonical(s).unwrap() }

fn location(s: &str, code: Option<&str>) -> NewLocation {
  NewLocation { name: name(s), code: code.map(str::to_owned) }
}

fn snapshot(value: serde_json::Value) -> Snapshot {
  serde_json::from_value(value).expect("valid snapshot")
}

fn toronto_kingston(kingston_diff: i64) -> Snapshot {
  snapshot(json!({
    "1": {
      "departed": true,
      "from": "TORONTO",
      "to": "MONTRÉAL",
      "times": [
        { "station": "Toronto", "code": "TRTO",
          "scheduled": "2024-03-01T09:30:00-05:00",
          "estimated": "2024-03-01T09:30:00-05:00" },
        { "station": "Kingston", "code": "KGON",
          "scheduled": "2024-03-01T11:45:00-05:00",
          "estimated": "2024-03-01T11:50:00-05:00",
          "diffMin": kingston_diff, "eta": "ARR" }
      ]
    }
  }))
}

/// A scratch database path unique to this test process and `tag`.
fn scratch_path(tag: &str) -> PathBuf {
  std::env::temp_dir().join(format!("trainlog-{}-{tag}.db", std::process::id()))
}

fn remove_db(path: &Path) {
  for suffix in ["", "-wal", "-shm"] {
    let mut p = path.as_os_str().to_owned();
    p.push(suffix);
    std::fs::remove_file(p).ok();
  }
}

// ─── Locations ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn ensure_location_is_idempotent() {
  let s = store().await;

  let first = s.ensure_location(location("Kingston", Some("KGON"))).await.unwrap();
  let again = s.ensure_location(location("KINGSTON", Some("XXXX"))).await.unwrap();
  assert_eq!(first, again);

  let found = s.find_location(&name("kingston")).await.unwrap();
  assert_eq!(found, Some(first));
  assert_eq!(s.counts().await.unwrap().locations, 1);
}

#[tokio::test]
async fn find_location_missing_returns_none() {
  let s = store().await;
  assert_eq!(s.find_location(&name("Nowhere")).await.unwrap(), None);
  assert_eq!(s.counts().await.unwrap(), TableCounts::default());
}

// ─── Dimensions ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn dimension_rows_are_keyed_by_natural_key() {
  let s = store().await;
  let tor = s.ensure_location(location("Toronto", None)).await.unwrap();
  let mtl = s.ensure_location(location("Montréal", None)).await.unwrap();

  let route = s.ensure_route(RouteKey { start: tor, end: mtl }).await.unwrap();
  let reverse = s.ensure_route(RouteKey { start: mtl, end: tor }).await.unwrap();
  assert_ne!(route, reverse);
  assert_eq!(s.ensure_route(RouteKey { start: tor, end: mtl }).await.unwrap(), route);
  assert_eq!(s.find_route(RouteKey { start: tor, end: mtl }).await.unwrap(), Some(route));

  let key = TrainKey { number: "67".into(), route };
  let train = s.ensure_train(&key).await.unwrap();
  assert_eq!(s.ensure_train(&key).await.unwrap(), train);
  assert_eq!(s.find_train(&key).await.unwrap(), Some(train));
  let other_route = TrainKey { number: "67".into(), route: reverse };
  assert_eq!(s.find_train(&other_route).await.unwrap(), None);

  let leg = StopTransitionKey { train, from: tor, to: mtl };
  let transition = s.ensure_transition(leg).await.unwrap();
  assert_eq!(s.ensure_transition(leg).await.unwrap(), transition);
  assert_eq!(s.find_transition(leg).await.unwrap(), Some(transition));

  let counts = s.counts().await.unwrap();
  assert_eq!(counts.routes, 2);
  assert_eq!(counts.trains, 1);
  assert_eq!(counts.stop_transitions, 1);
}

#[tokio::test]
async fn dangling_reference_is_a_store_error() {
  let s = store().await;
  let tor = s.ensure_location(location("Toronto", None)).await.unwrap();

  let err = s
    .ensure_transition(StopTransitionKey { train: TrainId(999), from: tor, to: tor })
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Database(_)));
}

// ─── Facts ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_fact_if_absent_is_first_write_wins() {
  let s = store().await;
  let tor = s.ensure_location(location("Toronto", None)).await.unwrap();
  let kgn = s.ensure_location(location("Kingston", None)).await.unwrap();
  let route = s.ensure_route(RouteKey { start: tor, end: kgn }).await.unwrap();
  let train = s
    .ensure_train(&TrainKey { number: "51".into(), route })
    .await
    .unwrap();
  let transition = s
    .ensure_transition(StopTransitionKey { train, from: tor, to: kgn })
    .await
    .unwrap();

  let fact = |minutes_late: i64, observed: &str| NewFact {
    key: FactKey {
      stop_transition: transition,
      run_date:        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
    },
    scheduled_at: DateTime::parse_from_rfc3339("2024-03-01T11:45:00-05:00").unwrap(),
    observed_at: DateTime::parse_from_rfc3339(observed).unwrap(),
    minutes_late,
    eta: None,
  };

  let first = s
    .insert_fact_if_absent(fact(5, "2024-03-01T11:50:00-05:00"))
    .await
    .unwrap();
  let second = s
    .insert_fact_if_absent(fact(12, "2024-03-01T11:57:00-05:00"))
    .await
    .unwrap();
  assert_eq!(first, FactWrite::Inserted);
  assert_eq!(second, FactWrite::DuplicateSuppressed);

  let facts = s.list_facts().await.unwrap();
  assert_eq!(facts.len(), 1);
  assert_eq!(facts[0].minutes_late, 5);
  assert_eq!(facts[0].observed_at.to_rfc3339(), "2024-03-01T11:50:00-05:00");
  assert_eq!(facts[0].train_number, "51");
  assert_eq!(facts[0].from_location.as_str(), "TORONTO");
  assert_eq!(facts[0].to_location.as_str(), "KINGSTON");
}

// ─── Ingestion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_worked_example() {
  let ing = Ingestor::new(store().await);
  let report = ing.ingest(&toronto_kingston(5)).await.unwrap();
  assert!(report.is_clean());

  assert_eq!(ing.store().counts().await.unwrap(), TableCounts {
    locations:        3,
    routes:           1,
    trains:           1,
    stop_transitions: 2,
    facts:            1,
  });

  let facts = ing.store().list_facts().await.unwrap();
  assert_eq!(facts[0].from_location.as_str(), "TORONTO");
  assert_eq!(facts[0].to_location.as_str(), "KINGSTON");
  assert_eq!(facts[0].route_end.as_str(), "MONTRÉAL");
  assert_eq!(facts[0].minutes_late, 5);
  assert_eq!(facts[0].run_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
  assert_eq!(facts[0].eta.as_deref(), Some("ARR"));
}

#[tokio::test]
async fn reingesting_is_idempotent() {
  let ing = Ingestor::new(store().await);
  ing.ingest(&toronto_kingston(5)).await.unwrap();
  let counts = ing.store().counts().await.unwrap();
  let facts = ing.store().list_facts().await.unwrap();

  let report = ing.ingest(&toronto_kingston(8)).await.unwrap();
  assert_eq!(report.facts_inserted, 0);
  assert_eq!(report.facts_suppressed, 1);
  assert_eq!(ing.store().counts().await.unwrap(), counts);
  assert_eq!(ing.store().list_facts().await.unwrap(), facts);
}

#[tokio::test]
async fn rows_survive_reopening() {
  let path = scratch_path("reopen");
  remove_db(&path);

  {
    let ing = Ingestor::new(SqliteStore::open(&path).await.unwrap());
    ing.ingest(&toronto_kingston(5)).await.unwrap();
  }

  let reopened = SqliteStore::open(&path).await.unwrap();
  assert_eq!(reopened.counts().await.unwrap().facts, 1);
  assert!(reopened.find_location(&name("Kingston")).await.unwrap().is_some());

  remove_db(&path);
}

#[tokio::test]
async fn concurrent_connections_converge_on_one_row_per_key() {
  let path = scratch_path("concurrent");
  remove_db(&path);

  let a = Ingestor::new(SqliteStore::open(&path).await.unwrap());
  let b = Ingestor::new(SqliteStore::open(&path).await.unwrap());
  let live = toronto_kingston(5);
  let backfill = toronto_kingston(7);

  let (ra, rb) = tokio::join!(a.ingest(&live), b.ingest(&backfill));
  let (ra, rb) = (ra.unwrap(), rb.unwrap());
  assert_eq!(ra.facts_inserted + rb.facts_inserted, 1);
  assert_eq!(ra.facts_suppressed + rb.facts_suppressed, 1);

  assert_eq!(a.store().counts().await.unwrap(), TableCounts {
    locations:        3,
    routes:           1,
    trains:           1,
    stop_transitions: 2,
    facts:            1,
  });

  remove_db(&path);
}
