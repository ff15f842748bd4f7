//! The ingestion coordinator.
//!
//! [`Ingestor::ingest`] turns one decoded snapshot into entity upserts and
//! fact writes:
//!
//! 1. Every location referenced anywhere in the snapshot is ensured up front,
//!    because all later steps resolve locations with a non-creating lookup.
//! 2. Each train run resolves its route, train and stop transitions.
//! 3. A fact is written for a leg only when its record is complete (see
//!    [`IngestPolicy`]). Incomplete records are skipped; a later snapshot with
//!    the finished observation writes the fact then.
//!
//! Every write is idempotent, so re-ingesting the same or an overlapping
//! snapshot changes nothing, and a call abandoned between trains leaves only
//! fully consistent rows behind.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
  Error,
  chain::{Leg, TrainRun, build_chains},
  entity::{
    EntityKind, LocationId, LocationName, NewLocation, RouteKey, StopTransitionId,
    StopTransitionKey, TrainKey,
  },
  fact::{FactKey, FactWrite, NewFact},
  normalize::{Normalized, StopRecord, normalize},
  snapshot::Snapshot,
  store::EntityStore,
};

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Decides when a stop observation is final enough to become a fact.
///
/// A record is complete when the train has departed, the stop has both a
/// scheduled and an estimated time and a minute delta, and the run date is
/// known. A leg ending at the destination also needs the train to have
/// arrived, since until then its times are a forecast. With
/// `require_arrival` set, every leg waits for arrival.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestPolicy {
  #[serde(default)]
  pub require_arrival: bool,
}

impl IngestPolicy {
  /// Build the fact for `leg` on `transition`, or `None` if incomplete.
  pub fn fact_for(
    &self,
    transition: StopTransitionId,
    leg: &Leg<'_>,
    run_date: Option<NaiveDate>,
  ) -> Option<NewFact> {
    let record = leg.record;
    let needs_arrival = self.require_arrival || leg.reaches_destination();
    if !record.departed || (needs_arrival && !record.arrived) {
      return None;
    }
    Some(NewFact {
      key:          FactKey { stop_transition: transition, run_date: run_date? },
      scheduled_at: record.scheduled?,
      observed_at:  record.estimated?,
      minutes_late: record.diff_min?,
      eta:          record.eta.clone(),
    })
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// A train instance whose processing was abandoned.
#[derive(Debug)]
pub struct TrainFailure {
  pub train_id: String,
  pub error:    Error,
}

/// What one [`Ingestor::ingest`] call did.
///
/// Counters include writes made for a train before it failed; those rows are
/// committed and stay valid.
#[derive(Debug, Default)]
pub struct IngestReport {
  /// Train runs processed to the end.
  pub trains:           usize,
  /// Distinct locations referenced by the snapshot.
  pub locations:        usize,
  /// Legs resolved to a stop transition.
  pub legs:             usize,
  pub facts_inserted:   usize,
  /// Complete records whose fact already existed.
  pub facts_suppressed: usize,
  /// Legs skipped because their record was incomplete.
  pub incomplete:       usize,
  pub failures:         Vec<TrainFailure>,
  /// Stops or trains dropped during normalisation.
  pub malformed:        Vec<Error>,
}

impl IngestReport {
  /// `true` when no train failed and no record was malformed.
  pub fn is_clean(&self) -> bool { self.failures.is_empty() && self.malformed.is_empty() }
}

// ─── Coordinator ─────────────────────────────────────────────────────────────

enum RunError<E> {
  Store(E),
  Entity(Error),
}

impl<E> From<Error> for RunError<E> {
  fn from(e: Error) -> Self { Self::Entity(e) }
}

/// Drives snapshot ingestion against an [`EntityStore`].
pub struct Ingestor<S> {
  store:  S,
  policy: IngestPolicy,
}

impl<S: EntityStore> Ingestor<S> {
  pub fn new(store: S) -> Self { Self::with_policy(store, IngestPolicy::default()) }

  pub fn with_policy(store: S, policy: IngestPolicy) -> Self { Self { store, policy } }

  pub fn store(&self) -> &S { &self.store }

  /// Ingest one snapshot.
  ///
  /// Entity-resolution failures abandon the affected train only and are
  /// listed in the report. A store error aborts the call; retrying the whole
  /// snapshot afterwards is safe.
  #[tracing::instrument(skip_all, fields(trains = snapshot.trains.len()))]
  pub async fn ingest(&self, snapshot: &Snapshot) -> Result<IngestReport, S::Error> {
    let Normalized { records, malformed } = normalize(snapshot);
    for error in &malformed {
      warn!(%error, "skipping malformed input");
    }

    let mut report = IngestReport { malformed, ..IngestReport::default() };
    report.locations = self.ensure_locations(&records).await?;

    for run in build_chains(&records) {
      match self.ingest_run(&run, &mut report).await {
        Ok(()) => report.trains += 1,
        Err(RunError::Store(e)) => return Err(e),
        Err(RunError::Entity(error)) => {
          warn!(train = run.train_id, %error, "abandoning train");
          report.failures.push(TrainFailure { train_id: run.train_id.to_owned(), error });
        }
      }
    }

    info!(
      trains = report.trains,
      failed = report.failures.len(),
      inserted = report.facts_inserted,
      suppressed = report.facts_suppressed,
      incomplete = report.incomplete,
      "snapshot ingested"
    );
    Ok(report)
  }

  /// Ensure every location named by `records`. A station code wins over a
  /// code-less mention as a train's origin or destination.
  async fn ensure_locations(&self, records: &[StopRecord]) -> Result<usize, S::Error> {
    let mut wanted: BTreeMap<&LocationName, Option<&str>> = BTreeMap::new();
    for record in records {
      let code = wanted.entry(&record.station).or_insert(None);
      if code.is_none() {
        *code = record.code.as_deref();
      }
      wanted.entry(&record.from).or_insert(None);
      wanted.entry(&record.to).or_insert(None);
    }

    for (name, code) in &wanted {
      self
        .store
        .ensure_location(NewLocation {
          name: (*name).clone(),
          code: code.map(str::to_owned),
        })
        .await?;
    }
    Ok(wanted.len())
  }

  async fn ingest_run(
    &self,
    run: &TrainRun<'_>,
    report: &mut IngestReport,
  ) -> Result<(), RunError<S::Error>> {
    let start = self.location(run.from).await?;
    let end = self.location(run.to).await?;
    let route = self
      .store
      .ensure_route(RouteKey { start, end })
      .await
      .map_err(RunError::Store)?;
    let train = self
      .store
      .ensure_train(&TrainKey { number: run.train_id.to_owned(), route })
      .await
      .map_err(RunError::Store)?;

    for leg in &run.legs {
      let from = self.location(leg.from).await?;
      let to = self.location(leg.to).await?;
      let transition = self
        .store
        .ensure_transition(StopTransitionKey { train, from, to })
        .await
        .map_err(RunError::Store)?;
      report.legs += 1;

      let Some(fact) = self.policy.fact_for(transition, leg, run.run_date) else {
        debug!(train = run.train_id, from = %leg.from, to = %leg.to, "incomplete record");
        report.incomplete += 1;
        continue;
      };

      match self.store.insert_fact_if_absent(fact).await.map_err(RunError::Store)? {
        FactWrite::Inserted => report.facts_inserted += 1,
        FactWrite::DuplicateSuppressed => report.facts_suppressed += 1,
      }
    }
    Ok(())
  }

  async fn location(&self, name: &LocationName) -> Result<LocationId, RunError<S::Error>> {
    self
      .store
      .find_location(name)
      .await
      .map_err(RunError::Store)?
      .ok_or_else(|| {
        RunError::Entity(Error::EntityNotFound {
          kind: EntityKind::Location,
          key:  name.to_string(),
        })
      })
  }
}
