//! Flatten a [`Snapshot`] into per-stop records.
//!
//! Every record carries its parent train's metadata so later stages never need
//! to look back at the snapshot. Station names are canonicalised here, and
//! timestamps are parsed: anything missing, empty or unparseable becomes
//! `None`, which downstream code treats as an incomplete observation.

use chrono::{DateTime, FixedOffset, NaiveDateTime};

use crate::{
  Error,
  entity::LocationName,
  snapshot::{Snapshot, StopTime, TrainStatus},
};

/// Naive layouts seen in re-exported feed data. Read as UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// One stop observation annotated with its train's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopRecord {
  pub train_id:  String,
  pub from:      LocationName,
  pub to:        LocationName,
  pub departed:  bool,
  pub arrived:   bool,
  pub station:   LocationName,
  pub code:      Option<String>,
  pub scheduled: Option<DateTime<FixedOffset>>,
  pub estimated: Option<DateTime<FixedOffset>>,
  pub diff_min:  Option<i64>,
  pub eta:       Option<String>,
}

/// Output of [`normalize`].
#[derive(Debug, Default)]
pub struct Normalized {
  /// Records grouped by train, feed order preserved within each train.
  pub records:   Vec<StopRecord>,
  /// One [`Error::MalformedRecord`] per skipped stop or train.
  pub malformed: Vec<Error>,
}

/// Flatten every train of `snapshot`.
pub fn normalize(snapshot: &Snapshot) -> Normalized {
  let mut out = Normalized::default();
  for (train_id, status) in &snapshot.trains {
    normalize_train(train_id, status, &mut out);
  }
  out
}

fn normalize_train(train_id: &str, status: &TrainStatus, out: &mut Normalized) {
  let endpoints = (
    status.from.as_deref().and_then(LocationName::canonical),
    status.to.as_deref().and_then(LocationName::canonical),
  );
  let (Some(from), Some(to)) = endpoints else {
    out.malformed.push(Error::MalformedRecord {
      train:  train_id.to_owned(),
      reason: "missing origin or destination".into(),
    });
    return;
  };

  for (position, stop) in status.times.iter().enumerate() {
    let Some(station) = stop.station.as_deref().and_then(LocationName::canonical) else {
      out.malformed.push(Error::MalformedRecord {
        train:  train_id.to_owned(),
        reason: format!("stop {position} has no station name"),
      });
      continue;
    };

    out.records.push(stop_record(train_id, status, &from, &to, station, stop));
  }
}

fn stop_record(
  train_id: &str,
  status: &TrainStatus,
  from: &LocationName,
  to: &LocationName,
  station: LocationName,
  stop: &StopTime,
) -> StopRecord {
  StopRecord {
    train_id: train_id.to_owned(),
    from: from.clone(),
    to: to.clone(),
    departed: status.departed,
    arrived: status.arrived,
    station,
    code: stop
      .code
      .as_deref()
      .map(str::trim)
      .filter(|c| !c.is_empty())
      .map(str::to_owned),
    scheduled: stop.scheduled.as_deref().and_then(parse_timestamp),
    estimated: stop.estimated.as_deref().and_then(parse_timestamp),
    diff_min: stop.diff_min.and_then(whole_minutes),
    eta: stop.eta.clone(),
  }
}

/// Parse a feed timestamp. RFC 3339 keeps its offset; naive forms are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
  let raw = raw.trim();
  if raw.is_empty() {
    return None;
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(dt);
  }
  NAIVE_FORMATS
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    .map(|naive| naive.and_utc().fixed_offset())
}

fn whole_minutes(minutes: f64) -> Option<i64> {
  minutes.is_finite().then(|| minutes.round() as i64)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn snapshot(value: serde_json::Value) -> Snapshot {
    serde_json::from_value(value).expect("valid snapshot")
  }

  #[test]
  fn canonicalises_station_and_endpoints() {
    let s = snapshot(json!({
      "1": {
        "departed": true,
        "from": "Toronto",
        "to": "montréal",
        "times": [
          { "station": " Toronto ", "code": "TRTO" },
          { "station": "Kingston", "code": "KGON" }
        ]
      }
    }));

    let out = normalize(&s);
    assert!(out.malformed.is_empty());
    assert_eq!(out.records.len(), 2);
    assert_eq!(out.records[0].station.as_str(), "TORONTO");
    assert_eq!(out.records[0].from.as_str(), "TORONTO");
    assert_eq!(out.records[0].to.as_str(), "MONTRÉAL");
    assert_eq!(out.records[1].station.as_str(), "KINGSTON");
    assert_eq!(out.records[1].code.as_deref(), Some("KGON"));
    assert!(out.records.iter().all(|r| r.departed && !r.arrived));
  }

  #[test]
  fn preserves_feed_order_and_groups_by_train() {
    let s = snapshot(json!({
      "2": { "from": "A", "to": "C", "times": [
        { "station": "C" }, { "station": "B" }, { "station": "A" }
      ]},
      "1": { "from": "X", "to": "Y", "times": [ { "station": "X" }, { "station": "Y" } ]}
    }));

    let out = normalize(&s);
    let seq: Vec<(&str, &str)> = out
      .records
      .iter()
      .map(|r| (r.train_id.as_str(), r.station.as_str()))
      .collect();
    assert_eq!(seq, [("1", "X"), ("1", "Y"), ("2", "C"), ("2", "B"), ("2", "A")]);
  }

  #[test]
  fn unparseable_or_empty_timestamps_are_absent() {
    let s = snapshot(json!({
      "5": { "from": "A", "to": "B", "times": [
        { "station": "A", "scheduled": "", "estimated": "soon" },
        { "station": "B", "scheduled": "2024-03-01T10:00:00-05:00", "estimated": null }
      ]}
    }));

    let out = normalize(&s);
    assert_eq!(out.records[0].scheduled, None);
    assert_eq!(out.records[0].estimated, None);
    assert!(out.records[1].scheduled.is_some());
    assert_eq!(out.records[1].estimated, None);
  }

  #[test]
  fn stop_without_station_is_malformed_but_train_continues() {
    let s = snapshot(json!({
      "9": { "from": "A", "to": "B", "times": [
        { "station": "A" }, { "code": "XXXX" }, { "station": "  " }, { "station": "B" }
      ]}
    }));

    let out = normalize(&s);
    assert_eq!(out.records.len(), 2);
    assert_eq!(out.malformed.len(), 2);
    assert!(matches!(&out.malformed[0], Error::MalformedRecord { train, .. } if train == "9"));
  }

  #[test]
  fn train_without_destination_is_skipped_whole() {
    let s = snapshot(json!({
      "3": { "from": "A", "times": [ { "station": "A" } ] },
      "4": { "from": "A", "to": "B", "times": [ { "station": "A" } ] }
    }));

    let out = normalize(&s);
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].train_id, "4");
    assert_eq!(out.malformed.len(), 1);
  }

  #[test]
  fn parses_rfc3339_and_naive_timestamps() {
    let with_offset = parse_timestamp("2024-03-01T10:00:00-05:00").unwrap();
    assert_eq!(with_offset.offset().local_minus_utc(), -5 * 3600);

    let naive = parse_timestamp("2024-03-01 10:00:00").unwrap();
    assert_eq!(naive.offset().local_minus_utc(), 0);
    assert_eq!(naive.to_rfc3339(), "2024-03-01T10:00:00+00:00");

    assert!(parse_timestamp("not a time").is_none());
  }

  #[test]
  fn fractional_diff_is_rounded() {
    let s = snapshot(json!({
      "7": { "from": "A", "to": "B", "times": [
        { "station": "A", "diffMin": 4.6 },
        { "station": "B", "diffMin": 3 }
      ]}
    }));

    let out = normalize(&s);
    assert_eq!(out.records[0].diff_min, Some(5));
    assert_eq!(out.records[1].diff_min, Some(3));
  }

  #[test]
  fn badly_typed_fields_read_as_absent() {
    let raw = br#"{
      "1": { "departed": true, "from": "A", "to": "B", "times": [
        { "station": "A", "scheduled": "2024-03-01T10:00:00-05:00",
          "estimated": "2024-03-01T10:02:00-05:00", "diffMin": 2 }
      ]},
      "2": { "departed": null, "arrived": "yes", "from": "C", "to": "D", "times": [
        { "station": "C", "scheduled": 0, "estimated": {}, "diffMin": "5" },
        "not a stop",
        { "station": "D", "diffMin": [1] }
      ]},
      "3": 42
    }"#;

    let s = Snapshot::from_slice(raw).expect("object documents always decode");
    let out = normalize(&s);

    let one: Vec<&StopRecord> = out.records.iter().filter(|r| r.train_id == "1").collect();
    assert_eq!(one.len(), 1);
    assert!(one[0].departed);
    assert!(one[0].scheduled.is_some() && one[0].estimated.is_some());
    assert_eq!(one[0].diff_min, Some(2));

    let two: Vec<&StopRecord> = out.records.iter().filter(|r| r.train_id == "2").collect();
    assert_eq!(two.len(), 2);
    assert!(!two[0].departed && !two[0].arrived);
    assert_eq!(two[0].scheduled, None);
    assert_eq!(two[0].estimated, None);
    assert_eq!(two[0].diff_min, Some(5));
    assert_eq!(two[1].station.as_str(), "D");
    assert_eq!(two[1].diff_min, None);

    // The non-object stop of train 2 and the whole of train 3.
    assert_eq!(out.malformed.len(), 2);
  }

  #[test]
  fn non_object_document_fails_to_decode() {
    assert!(Snapshot::from_slice(b"[1, 2, 3]").is_err());
    assert!(Snapshot::from_slice(b"{ truncated").is_err());
  }
}
