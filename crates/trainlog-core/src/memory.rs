//! [`MemoryStore`], an in-process implementation of [`EntityStore`].
//!
//! Every table lives behind one mutex, so each primitive runs as a single
//! critical section and per-key atomicity holds trivially. Useful for tests
//! and for dry runs that should not touch disk.

use std::{
  collections::{BTreeMap, HashMap},
  convert::Infallible,
  sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};

use crate::{
  entity::{
    Location, LocationId, LocationName, NewLocation, RouteId, RouteKey, StopTransitionId,
    StopTransitionKey, TrainId, TrainKey,
  },
  fact::{FactKey, FactView, FactWrite, NewFact, sort_facts},
  store::{EntityStore, TableCounts},
};

#[derive(Default)]
struct Tables {
  locations:        Vec<Location>,
  location_index:   HashMap<LocationName, LocationId>,
  routes:           Vec<RouteKey>,
  route_index:      HashMap<RouteKey, RouteId>,
  trains:           Vec<TrainKey>,
  train_index:      HashMap<TrainKey, TrainId>,
  transitions:      Vec<StopTransitionKey>,
  transition_index: HashMap<StopTransitionKey, StopTransitionId>,
  facts:            BTreeMap<FactKey, (NewFact, DateTime<Utc>)>,
}

/// Ids are 1-based positions in each table's row vector.
fn next_id(len: usize) -> i64 { i64::try_from(len).unwrap_or(i64::MAX - 1) + 1 }

fn row<T>(rows: &[T], id: i64) -> Option<&T> {
  usize::try_from(id - 1).ok().and_then(|i| rows.get(i))
}

impl Tables {
  fn location_name(&self, id: LocationId) -> Option<LocationName> {
    row(&self.locations, id.0).map(|l| l.name.clone())
  }

  fn view(&self, fact: &NewFact, recorded_at: DateTime<Utc>) -> Option<FactView> {
    let transition = row(&self.transitions, fact.key.stop_transition.0)?;
    let train = row(&self.trains, transition.train.0)?;
    let route = row(&self.routes, train.route.0)?;

    Some(FactView {
      train_number:  train.number.clone(),
      route_start:   self.location_name(route.start)?,
      route_end:     self.location_name(route.end)?,
      from_location: self.location_name(transition.from)?,
      to_location:   self.location_name(transition.to)?,
      run_date:      fact.key.run_date,
      scheduled_at:  fact.scheduled_at,
      observed_at:   fact.observed_at,
      minutes_late:  fact.minutes_late,
      eta:           fact.eta.clone(),
      recorded_at,
    })
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A trainlog store held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
  tables: Mutex<Tables>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  /// All location rows, in creation order.
  pub fn locations(&self) -> Vec<Location> { self.lock().locations.clone() }

  fn lock(&self) -> MutexGuard<'_, Tables> {
    self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

// ─── EntityStore impl ────────────────────────────────────────────────────────

impl EntityStore for MemoryStore {
  type Error = Infallible;

  async fn ensure_location(&self, input: NewLocation) -> Result<LocationId, Infallible> {
    let mut t = self.lock();
    if let Some(id) = t.location_index.get(&input.name) {
      return Ok(*id);
    }
    let id = LocationId(next_id(t.locations.len()));
    t.location_index.insert(input.name.clone(), id);
    t.locations.push(Location { location_id: id, name: input.name, code: input.code });
    Ok(id)
  }

  async fn find_location(&self, name: &LocationName) -> Result<Option<LocationId>, Infallible> {
    Ok(self.lock().location_index.get(name).copied())
  }

  async fn ensure_route(&self, key: RouteKey) -> Result<RouteId, Infallible> {
    let mut t = self.lock();
    if let Some(id) = t.route_index.get(&key) {
      return Ok(*id);
    }
    let id = RouteId(next_id(t.routes.len()));
    t.route_index.insert(key, id);
    t.routes.push(key);
    Ok(id)
  }

  async fn find_route(&self, key: RouteKey) -> Result<Option<RouteId>, Infallible> {
    Ok(self.lock().route_index.get(&key).copied())
  }

  async fn ensure_train(&self, key: &TrainKey) -> Result<TrainId, Infallible> {
    let mut t = self.lock();
    if let Some(id) = t.train_index.get(key) {
      return Ok(*id);
    }
    let id = TrainId(next_id(t.trains.len()));
    t.train_index.insert(key.clone(), id);
    t.trains.push(key.clone());
    Ok(id)
  }

  async fn find_train(&self, key: &TrainKey) -> Result<Option<TrainId>, Infallible> {
    Ok(self.lock().train_index.get(key).copied())
  }

  async fn ensure_transition(
    &self,
    key: StopTransitionKey,
  ) -> Result<StopTransitionId, Infallible> {
    let mut t = self.lock();
    if let Some(id) = t.transition_index.get(&key) {
      return Ok(*id);
    }
    let id = StopTransitionId(next_id(t.transitions.len()));
    t.transition_index.insert(key, id);
    t.transitions.push(key);
    Ok(id)
  }

  async fn find_transition(
    &self,
    key: StopTransitionKey,
  ) -> Result<Option<StopTransitionId>, Infallible> {
    Ok(self.lock().transition_index.get(&key).copied())
  }

  async fn insert_fact_if_absent(&self, fact: NewFact) -> Result<FactWrite, Infallible> {
    let mut t = self.lock();
    if t.facts.contains_key(&fact.key) {
      return Ok(FactWrite::DuplicateSuppressed);
    }
    t.facts.insert(fact.key, (fact, Utc::now()));
    Ok(FactWrite::Inserted)
  }

  async fn counts(&self) -> Result<TableCounts, Infallible> {
    let t = self.lock();
    let count = |n: usize| u64::try_from(n).unwrap_or(u64::MAX);
    Ok(TableCounts {
      locations:        count(t.locations.len()),
      routes:           count(t.routes.len()),
      trains:           count(t.trains.len()),
      stop_transitions: count(t.transitions.len()),
      facts:            count(t.facts.len()),
    })
  }

  async fn list_facts(&self) -> Result<Vec<FactView>, Infallible> {
    let t = self.lock();
    let mut facts: Vec<FactView> = t
      .facts
      .values()
      .filter_map(|(fact, recorded_at)| t.view(fact, *recorded_at))
      .collect();
    sort_facts(&mut facts);
    Ok(facts)
  }
}
