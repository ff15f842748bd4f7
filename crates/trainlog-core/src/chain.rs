//! Reconstruct each train's directed stop chain from flat stop records.
//!
//! For every train instance the records are folded in feed order, carrying the
//! previous station as the accumulator. The fold state is scoped to one train,
//! so nothing leaks between runs.
//!
//! Two edge cases shape the output:
//!
//! - The first stop of a run has no predecessor and is linked to itself, so
//!   every record yields a well-formed `(from, to)` pair.
//! - A stop whose station is the train's destination additionally yields a
//!   terminal `(to, to)` leg. Its fact row marks a completed run.
//!
//! Stops dropped during normalisation (no station name) leave no trace here:
//! the stop before one is linked straight to the stop after it.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::{entity::LocationName, normalize::StopRecord};

/// One directed edge `from -> to`, backed by the record observed at `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leg<'r> {
  pub from:     &'r LocationName,
  pub to:       &'r LocationName,
  pub record:   &'r StopRecord,
  /// `true` for the synthetic `(destination, destination)` marker.
  pub terminal: bool,
}

impl Leg<'_> {
  pub fn is_self_loop(&self) -> bool { self.from == self.to }

  /// `true` when the leg ends at the train's destination, including the
  /// terminal marker.
  pub fn reaches_destination(&self) -> bool { self.to == &self.record.to }
}

/// All legs of one train instance, in feed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainRun<'r> {
  pub train_id: &'r str,
  pub from:     &'r LocationName,
  pub to:       &'r LocationName,
  /// Calendar date of the earliest scheduled stop; the run's nominal
  /// departure date. `None` if no stop carries a schedule.
  pub run_date: Option<NaiveDate>,
  pub legs:     Vec<Leg<'r>>,
}

/// Group `records` by train (first-appearance order) and chain each group.
pub fn build_chains(records: &[StopRecord]) -> Vec<TrainRun<'_>> {
  let mut order: Vec<&str> = Vec::new();
  let mut by_train: HashMap<&str, Vec<&StopRecord>> = HashMap::new();

  for record in records {
    by_train
      .entry(record.train_id.as_str())
      .or_insert_with(|| {
        order.push(record.train_id.as_str());
        Vec::new()
      })
      .push(record);
  }

  order
    .into_iter()
    .filter_map(|id| by_train.remove(id))
    .filter_map(chain_train)
    .collect()
}

/// Chain one train's records. Returns `None` for an empty stop list.
fn chain_train(stops: Vec<&StopRecord>) -> Option<TrainRun<'_>> {
  let first = *stops.first()?;

  let run_date = stops
    .iter()
    .filter_map(|r| r.scheduled)
    .min()
    .map(|dt| dt.date_naive());

  let (legs, _) = stops.iter().copied().fold(
    (Vec::with_capacity(stops.len() + 1), None::<&LocationName>),
    |(mut legs, previous), record| {
      let from = previous.unwrap_or(&record.station);
      legs.push(Leg { from, to: &record.station, record, terminal: false });

      if record.station == record.to && from != &record.to {
        legs.push(Leg { from: &record.to, to: &record.to, record, terminal: true });
      }

      (legs, Some(&record.station))
    },
  );

  Some(TrainRun {
    train_id: &first.train_id,
    from: &first.from,
    to: &first.to,
    run_date,
    legs,
  })
}
