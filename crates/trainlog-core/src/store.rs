//! The `EntityStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g. `trainlog-store-sqlite`
//! and [`MemoryStore`](crate::memory::MemoryStore)). The
//! [`Ingestor`](crate::ingest::Ingestor) depends on this abstraction, not on
//! any concrete backend.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  entity::{
    EntityKind, LocationId, LocationName, NewLocation, RouteId, RouteKey, StopTransitionId,
    StopTransitionKey, TrainId, TrainKey,
  },
  fact::{FactView, FactWrite, NewFact},
};

// ─── Read-side types ─────────────────────────────────────────────────────────

/// Row counts of every table, as returned by [`EntityStore::counts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
  pub locations:        u64,
  pub routes:           u64,
  pub trains:           u64,
  pub stop_transitions: u64,
  pub facts:            u64,
}

impl TableCounts {
  /// Row count per table, dimensions first.
  pub fn by_kind(&self) -> [(EntityKind, u64); 5] {
    [
      (EntityKind::Location, self.locations),
      (EntityKind::Route, self.routes),
      (EntityKind::Train, self.trains),
      (EntityKind::StopTransition, self.stop_transitions),
      (EntityKind::Fact, self.facts),
    ]
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a trainlog storage backend.
///
/// `ensure_*` methods are get-or-insert: repeated calls with the same natural
/// key always return the same id, and attributes are only applied on first
/// creation. Each call must be atomic per key, so two concurrent callers can
/// never create two rows for one key.
///
/// `find_*` methods are pure lookups and never create. A key that was never
/// ensured yields `None`.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait EntityStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Locations ─────────────────────────────────────────────────────────

  /// Get or create the location named `input.name`. An existing row keeps
  /// its original `code`.
  fn ensure_location(
    &self,
    input: NewLocation,
  ) -> impl Future<Output = Result<LocationId, Self::Error>> + Send + '_;

  fn find_location<'a>(
    &'a self,
    name: &'a LocationName,
  ) -> impl Future<Output = Result<Option<LocationId>, Self::Error>> + Send + 'a;

  // ── Routes ────────────────────────────────────────────────────────────

  fn ensure_route(
    &self,
    key: RouteKey,
  ) -> impl Future<Output = Result<RouteId, Self::Error>> + Send + '_;

  fn find_route(
    &self,
    key: RouteKey,
  ) -> impl Future<Output = Result<Option<RouteId>, Self::Error>> + Send + '_;

  // ── Trains ────────────────────────────────────────────────────────────

  fn ensure_train<'a>(
    &'a self,
    key: &'a TrainKey,
  ) -> impl Future<Output = Result<TrainId, Self::Error>> + Send + 'a;

  fn find_train<'a>(
    &'a self,
    key: &'a TrainKey,
  ) -> impl Future<Output = Result<Option<TrainId>, Self::Error>> + Send + 'a;

  // ── Stop transitions ──────────────────────────────────────────────────

  fn ensure_transition(
    &self,
    key: StopTransitionKey,
  ) -> impl Future<Output = Result<StopTransitionId, Self::Error>> + Send + '_;

  fn find_transition(
    &self,
    key: StopTransitionKey,
  ) -> impl Future<Output = Result<Option<StopTransitionId>, Self::Error>> + Send + '_;

  // ── Facts: append-only writes ─────────────────────────────────────────

  /// Record `fact` unless a fact with the same key already exists.
  ///
  /// The existence check and the insert are a single atomic step. At most one
  /// row can ever exist per [`FactKey`](crate::fact::FactKey).
  fn insert_fact_if_absent(
    &self,
    fact: NewFact,
  ) -> impl Future<Output = Result<FactWrite, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn counts(&self) -> impl Future<Output = Result<TableCounts, Self::Error>> + Send + '_;

  /// All facts, joined back to natural keys, ordered by run date, train
  /// number and scheduled time.
  fn list_facts(
    &self,
  ) -> impl Future<Output = Result<Vec<FactView>, Self::Error>> + Send + '_;
}
