//! Arrival facts: the only rows with a temporal dimension.
//!
//! A fact records one completed observation of a stop transition on a given
//! run date. Facts are append-only and first-write-wins: once a key exists,
//! later writes for the same key are discarded, even when they carry a
//! different `observed_at` or `minutes_late`.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{LocationName, StopTransitionId};

// ─── Keys ────────────────────────────────────────────────────────────────────

/// Natural key of a fact row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactKey {
  pub stop_transition: StopTransitionId,
  pub run_date:        NaiveDate,
}

// ─── Writes ──────────────────────────────────────────────────────────────────

/// Input to [`EntityStore::insert_fact_if_absent`](crate::store::EntityStore::insert_fact_if_absent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFact {
  pub key:          FactKey,
  pub scheduled_at: DateTime<FixedOffset>,
  pub observed_at:  DateTime<FixedOffset>,
  pub minutes_late: i64,
  /// Free-form status string from the feed (e.g. `"ARR"`), if any.
  pub eta:          Option<String>,
}

/// Outcome of an insert-if-absent.
///
/// `DuplicateSuppressed` is the expected idempotency signal, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactWrite {
  Inserted,
  DuplicateSuppressed,
}

// ─── Reads ───────────────────────────────────────────────────────────────────

/// A fact joined back to the natural keys of everything it references.
///
/// This is the stable export layout consumed by downstream aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactView {
  pub train_number:  String,
  pub route_start:   LocationName,
  pub route_end:     LocationName,
  pub from_location: LocationName,
  pub to_location:   LocationName,
  pub run_date:      NaiveDate,
  pub scheduled_at:  DateTime<FixedOffset>,
  pub observed_at:   DateTime<FixedOffset>,
  pub minutes_late:  i64,
  pub eta:           Option<String>,
  /// When the store accepted the row; assigned by the store.
  pub recorded_at:   DateTime<Utc>,
}

/// Put facts in export order: run date, train number, scheduled time, then
/// the transition's endpoints.
pub fn sort_facts(facts: &mut [FactView]) {
  facts.sort_by(|a, b| {
    (a.run_date, &a.train_number, a.scheduled_at, &a.from_location, &a.to_location).cmp(&(
      b.run_date,
      &b.train_number,
      b.scheduled_at,
      &b.from_location,
      &b.to_location,
    ))
  });
}
