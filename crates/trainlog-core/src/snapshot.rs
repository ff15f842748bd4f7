//! Decoded feed snapshots.
//!
//! One snapshot is one poll of the tracking feed: a JSON object mapping each
//! train-instance id to its status and the feed-ordered list of its stop
//! times. Fields the ingestion does not use (position, speed, poll metadata)
//! are ignored.
//!
//! Decoding is lenient below the top-level object. A badly typed field reads
//! as absent, or `false` for a flag, so one odd train never costs the rest of
//! the poll. Normalisation then reports whatever is unusable.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::Result;

/// One poll of the feed, keyed by train-instance id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
  pub trains: BTreeMap<String, TrainStatus>,
}

impl Snapshot {
  /// Decode a snapshot from raw JSON bytes. Fails only when the document is
  /// not a JSON object.
  pub fn from_slice(bytes: &[u8]) -> Result<Self> { Ok(serde_json::from_slice(bytes)?) }
}

impl<'de> Deserialize<'de> for Snapshot {
  fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
    let raw = BTreeMap::<String, Value>::deserialize(d)?;
    let trains = raw
      .into_iter()
      .map(|(id, value)| (id, serde_json::from_value(value).unwrap_or_default()))
      .collect();
    Ok(Self { trains })
  }
}

/// Train-level status as published by the feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainStatus {
  #[serde(default, deserialize_with = "flag")]
  pub departed: bool,
  #[serde(default, deserialize_with = "flag")]
  pub arrived:  bool,
  /// Scheduled origin, as spelled by the feed.
  #[serde(default, deserialize_with = "text")]
  pub from:     Option<String>,
  /// Scheduled destination, as spelled by the feed.
  #[serde(default, deserialize_with = "text")]
  pub to:       Option<String>,
  /// Stop observations in run order: the first element is the earliest stop.
  #[serde(default, deserialize_with = "stops")]
  pub times:    Vec<StopTime>,
}

/// One stop observation. Timestamps stay raw until normalisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopTime {
  #[serde(default, deserialize_with = "text")]
  pub station:   Option<String>,
  #[serde(default, deserialize_with = "text")]
  pub code:      Option<String>,
  #[serde(default, deserialize_with = "text")]
  pub scheduled: Option<String>,
  #[serde(default, deserialize_with = "text")]
  pub estimated: Option<String>,
  #[serde(default, rename = "diffMin", deserialize_with = "minutes")]
  pub diff_min:  Option<f64>,
  #[serde(default, deserialize_with = "text")]
  pub eta:       Option<String>,
}

// ─── Lenient fields ──────────────────────────────────────────────────────────

/// Only a JSON `true` is true.
fn flag<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
  Ok(Value::deserialize(d)?.as_bool().unwrap_or(false))
}

/// Strings as-is, numbers in their JSON spelling, anything else absent.
fn text<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
  Ok(match Value::deserialize(d)? {
    Value::String(s) => Some(s),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  })
}

/// Numbers, or strings holding a number.
fn minutes<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<f64>, D::Error> {
  Ok(match Value::deserialize(d)? {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  })
}

/// A non-array reads as no stops. A non-object stop keeps its position but
/// has no station, so normalisation reports it.
fn stops<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<StopTime>, D::Error> {
  Ok(match Value::deserialize(d)? {
    Value::Array(items) => items
      .into_iter()
      .map(|item| serde_json::from_value(item).unwrap_or_default())
      .collect(),
    _ => Vec::new(),
  })
}
