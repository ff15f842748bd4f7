//! [`SqliteStore`], the SQLite implementation of [`EntityStore`].

use std::{path::Path, time::Duration};

use chrono::Utc;
use rusqlite::{OptionalExtension as _, Params, TransactionBehavior};
use trainlog_core::{
  entity::{
    LocationId, LocationName, NewLocation, RouteId, RouteKey, StopTransitionId,
    StopTransitionKey, TrainId, TrainKey,
  },
  fact::{FactView, FactWrite, NewFact, sort_facts},
  store::{EntityStore, TableCounts},
};

use crate::{
  Result,
  encode::{RawFactView, encode_date, encode_dt, encode_utc},
  schema::SCHEMA,
};

/// How long a writer waits on another connection's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── SQL ─────────────────────────────────────────────────────────────────────

const INSERT_LOCATION: &str = "INSERT INTO locations (name, code) VALUES (?1, ?2)
   ON CONFLICT (name) DO NOTHING";
const SELECT_LOCATION: &str = "SELECT location_id FROM locations WHERE name = ?1";

const INSERT_ROUTE: &str = "INSERT INTO routes (start_location_id, end_location_id)
   VALUES (?1, ?2)
   ON CONFLICT (start_location_id, end_location_id) DO NOTHING";
const SELECT_ROUTE: &str = "SELECT route_id FROM routes
   WHERE start_location_id = ?1 AND end_location_id = ?2";

const INSERT_TRAIN: &str = "INSERT INTO trains (number, route_id) VALUES (?1, ?2)
   ON CONFLICT (number, route_id) DO NOTHING";
const SELECT_TRAIN: &str = "SELECT train_id FROM trains WHERE number = ?1 AND route_id = ?2";

const INSERT_TRANSITION: &str =
  "INSERT INTO stop_transitions (train_id, from_location_id, to_location_id)
   VALUES (?1, ?2, ?3)
   ON CONFLICT (train_id, from_location_id, to_location_id) DO NOTHING";
const SELECT_TRANSITION: &str = "SELECT stop_transition_id FROM stop_transitions
   WHERE train_id = ?1 AND from_location_id = ?2 AND to_location_id = ?3";

const INSERT_ARRIVAL: &str = "INSERT INTO arrivals (
     stop_transition_id, run_date, scheduled_at, observed_at,
     minutes_late, eta, recorded_at
   ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
   ON CONFLICT (stop_transition_id, run_date) DO NOTHING";

const SELECT_FACT_VIEWS: &str = "SELECT
     t.number, rs.name, re.name, lf.name, lt.name,
     a.run_date, a.scheduled_at, a.observed_at, a.minutes_late, a.eta, a.recorded_at
   FROM arrivals a
   JOIN stop_transitions st ON st.stop_transition_id = a.stop_transition_id
   JOIN trains           t  ON t.train_id            = st.train_id
   JOIN routes           r  ON r.route_id            = t.route_id
   JOIN locations        rs ON rs.location_id        = r.start_location_id
   JOIN locations        re ON re.location_id        = r.end_location_id
   JOIN locations        lf ON lf.location_id        = st.from_location_id
   JOIN locations        lt ON lt.location_id        = st.to_location_id";

const SELECT_COUNTS: &str = "SELECT
     (SELECT COUNT(*) FROM locations),
     (SELECT COUNT(*) FROM routes),
     (SELECT COUNT(*) FROM trains),
     (SELECT COUNT(*) FROM stop_transitions),
     (SELECT COUNT(*) FROM arrivals)";

/// Insert-if-absent then read back the surrogate id, as one transaction.
fn get_or_insert(
  conn: &mut rusqlite::Connection,
  insert: &str,
  insert_params: impl Params,
  select: &str,
  key_params: impl Params,
) -> rusqlite::Result<i64> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  tx.execute(insert, insert_params)?;
  let id = tx.query_row(select, key_params, |r| r.get(0))?;
  tx.commit()?;
  Ok(id)
}

fn lookup(
  conn: &rusqlite::Connection,
  select: &str,
  key_params: impl Params,
) -> rusqlite::Result<Option<i64>> {
  conn.query_row(select, key_params, |r| r.get(0)).optional()
}

fn count(n: i64) -> u64 { u64::try_from(n).unwrap_or_default() }

// ─── Store ───────────────────────────────────────────────────────────────────

/// A trainlog store backed by a single SQLite file.
///
/// Clones share one reference-counted connection. All calls
/// run in order on the connection's own thread, and each get-or-create runs
/// in its own transaction, so every primitive is atomic per key.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open a fresh in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    tracing::debug!("schema initialised");
    Ok(())
  }
}

// ─── EntityStore impl ────────────────────────────────────────────────────────

impl EntityStore for SqliteStore {
  type Error = crate::Error;

  // ── Locations ─────────────────────────────────────────────────────────────

  async fn ensure_location(&self, input: NewLocation) -> Result<LocationId> {
    let name = input.name.as_str().to_owned();
    let code = input.code;

    let id = self
      .conn
      .call(move |conn| {
        Ok(get_or_insert(
          conn,
          INSERT_LOCATION,
          rusqlite::params![name, code],
          SELECT_LOCATION,
          rusqlite::params![name],
        )?)
      })
      .await?;
    Ok(LocationId(id))
  }

  async fn find_location(&self, name: &LocationName) -> Result<Option<LocationId>> {
    let name = name.as_str().to_owned();
    let id = self
      .conn
      .call(move |conn| Ok(lookup(conn, SELECT_LOCATION, rusqlite::params![name])?))
      .await?;
    Ok(id.map(LocationId))
  }

  // ── Routes ────────────────────────────────────────────────────────────────

  async fn ensure_route(&self, key: RouteKey) -> Result<RouteId> {
    let (start, end) = (key.start.0, key.end.0);

    let id = self
      .conn
      .call(move |conn| {
        Ok(get_or_insert(
          conn,
          INSERT_ROUTE,
          rusqlite::params![start, end],
          SELECT_ROUTE,
          rusqlite::params![start, end],
        )?)
      })
      .await?;
    Ok(RouteId(id))
  }

  async fn find_route(&self, key: RouteKey) -> Result<Option<RouteId>> {
    let (start, end) = (key.start.0, key.end.0);
    let id = self
      .conn
      .call(move |conn| Ok(lookup(conn, SELECT_ROUTE, rusqlite::params![start, end])?))
      .await?;
    Ok(id.map(RouteId))
  }

  // ── Trains ────────────────────────────────────────────────────────────────

  async fn ensure_train(&self, key: &TrainKey) -> Result<TrainId> {
    let number = key.number.clone();
    let route = key.route.0;

    let id = self
      .conn
      .call(move |conn| {
        Ok(get_or_insert(
          conn,
          INSERT_TRAIN,
          rusqlite::params![number, route],
          SELECT_TRAIN,
          rusqlite::params![number, route],
        )?)
      })
      .await?;
    Ok(TrainId(id))
  }

  async fn find_train(&self, key: &TrainKey) -> Result<Option<TrainId>> {
    let number = key.number.clone();
    let route = key.route.0;
    let id = self
      .conn
      .call(move |conn| Ok(lookup(conn, SELECT_TRAIN, rusqlite::params![number, route])?))
      .await?;
    Ok(id.map(TrainId))
  }

  // ── Stop transitions ──────────────────────────────────────────────────────

  async fn ensure_transition(&self, key: StopTransitionKey) -> Result<StopTransitionId> {
    let (train, from, to) = (key.train.0, key.from.0, key.to.0);

    let id = self
      .conn
      .call(move |conn| {
        Ok(get_or_insert(
          conn,
          INSERT_TRANSITION,
          rusqlite::params![train, from, to],
          SELECT_TRANSITION,
          rusqlite::params![train, from, to],
        )?)
      })
      .await?;
    Ok(StopTransitionId(id))
  }

  async fn find_transition(&self, key: StopTransitionKey) -> Result<Option<StopTransitionId>> {
    let (train, from, to) = (key.train.0, key.from.0, key.to.0);
    let id = self
      .conn
      .call(move |conn| {
        Ok(lookup(conn, SELECT_TRANSITION, rusqlite::params![train, from, to])?)
      })
      .await?;
    Ok(id.map(StopTransitionId))
  }

  // ── Facts: append-only writes ─────────────────────────────────────────────

  async fn insert_fact_if_absent(&self, fact: NewFact) -> Result<FactWrite> {
    let transition    = fact.key.stop_transition.0;
    let run_date_str  = encode_date(fact.key.run_date);
    let scheduled_str = encode_dt(fact.scheduled_at);
    let observed_str  = encode_dt(fact.observed_at);
    let minutes_late  = fact.minutes_late;
    let eta           = fact.eta;
    let recorded_str  = encode_utc(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          INSERT_ARRIVAL,
          rusqlite::params![
            transition,
            run_date_str,
            scheduled_str,
            observed_str,
            minutes_late,
            eta,
            recorded_str,
          ],
        )?)
      })
      .await?;

    Ok(if changed == 0 { FactWrite::DuplicateSuppressed } else { FactWrite::Inserted })
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn counts(&self) -> Result<TableCounts> {
    let raw: [i64; 5] = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(SELECT_COUNTS, [], |r| {
          Ok([r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?])
        })?)
      })
      .await?;

    Ok(TableCounts {
      locations:        count(raw[0]),
      routes:           count(raw[1]),
      trains:           count(raw[2]),
      stop_transitions: count(raw[3]),
      facts:            count(raw[4]),
    })
  }

  async fn list_facts(&self) -> Result<Vec<FactView>> {
    let raws: Vec<RawFactView> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(SELECT_FACT_VIEWS)?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawFactView {
              train_number:  row.get(0)?,
              route_start:   row.get(1)?,
              route_end:     row.get(2)?,
              from_location: row.get(3)?,
              to_location:   row.get(4)?,
              run_date:      row.get(5)?,
              scheduled_at:  row.get(6)?,
              observed_at:   row.get(7)?,
              minutes_late:  row.get(8)?,
              eta:           row.get(9)?,
              recorded_at:   row.get(10)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut facts: Vec<FactView> =
      raws.into_iter().map(RawFactView::into_view).collect::<Result<_>>()?;
    sort_facts(&mut facts);
    Ok(facts)
  }
}
