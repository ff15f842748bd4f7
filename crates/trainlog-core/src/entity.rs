//! Dimension entities and their natural keys.
//!
//! Every entity is identified by a natural key. The numeric ids handed out by
//! a store are surrogate handles: stable for the lifetime of that store, but
//! never used for deduplication.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// The four dimension tables plus the fact table.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
  Location,
  Route,
  Train,
  StopTransition,
  Fact,
}

// ─── Surrogate ids ───────────────────────────────────────────────────────────

macro_rules! surrogate_id {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(
      Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(pub i64);

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
      }
    }
  };
}

surrogate_id!(
  /// Store-assigned handle for a [`Location`].
  LocationId
);
surrogate_id!(
  /// Store-assigned handle for a [`Route`].
  RouteId
);
surrogate_id!(
  /// Store-assigned handle for a [`Train`].
  TrainId
);
surrogate_id!(
  /// Store-assigned handle for a [`StopTransition`].
  StopTransitionId
);

// ─── Location ────────────────────────────────────────────────────────────────

/// A canonical station name: trimmed and upper-cased.
///
/// The feed spells the same station differently in the per-stop `station`
/// field ("Kingston") and the train-level `from`/`to` fields ("KINGSTON"), so
/// all key comparisons go through this type.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LocationName(String);

impl LocationName {
  /// Canonicalise a raw feed name. Returns `None` for blank input.
  pub fn canonical(raw: &str) -> Option<Self> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
      return None;
    }
    Some(Self(trimmed.to_uppercase()))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for LocationName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Input to [`EntityStore::ensure_location`](crate::store::EntityStore::ensure_location).
///
/// `code` is only applied when the location is first created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLocation {
  pub name: LocationName,
  pub code: Option<String>,
}

/// A persisted location row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
  pub location_id: LocationId,
  pub name:        LocationName,
  pub code:        Option<String>,
}

// ─── Route ───────────────────────────────────────────────────────────────────

/// Scheduled origin/destination pair of a train. Not a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteKey {
  pub start: LocationId,
  pub end:   LocationId,
}

// ─── Train ───────────────────────────────────────────────────────────────────

/// A numbered service running on a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainKey {
  pub number: String,
  pub route:  RouteId,
}

// ─── Stop transition ─────────────────────────────────────────────────────────

/// One directed edge of a train's realised stop sequence.
///
/// `from == to` for the first stop of a run and for the terminal marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StopTransitionKey {
  pub train: TrainId,
  pub from:  LocationId,
  pub to:    LocationId,
}

impl fmt::Display for StopTransitionKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "train {} {} -> {}", self.train, self.from, self.to)
  }
}
