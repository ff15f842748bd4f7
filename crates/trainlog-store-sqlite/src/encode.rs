//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, keeping the feed's own offset
//! for scheduled and observed times. Run dates are stored as `YYYY-MM-DD`.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use trainlog_core::{entity::LocationName, fact::FactView};

use crate::{Error, Result};

// ─── DateTime ────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<FixedOffset>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<FixedOffset>> {
  DateTime::parse_from_rfc3339(s).map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_utc(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_utc(s: &str) -> Result<DateTime<Utc>> {
  decode_dt(s).map(|dt| dt.with_timezone(&Utc))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── LocationName ────────────────────────────────────────────────────────────

pub fn decode_location(s: String) -> Result<LocationName> {
  LocationName::canonical(&s).ok_or(Error::InvalidLocation(s))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `arrivals` row joined with its
/// dimensions.
pub struct RawFactView {
  pub train_number:  String,
  pub route_start:   String,
  pub route_end:     String,
  pub from_location: String,
  pub to_location:   String,
  pub run_date:      String,
  pub scheduled_at:  String,
  pub observed_at:   String,
  pub minutes_late:  i64,
  pub eta:           Option<String>,
  pub recorded_at:   String,
}

impl RawFactView {
  pub fn into_view(self) -> Result<FactView> {
    Ok(FactView {
      train_number:  self.train_number,
      route_start:   decode_location(self.route_start)?,
      route_end:     decode_location(self.route_end)?,
      from_location: decode_location(self.from_location)?,
      to_location:   decode_location(self.to_location)?,
      run_date:      decode_date(&self.run_date)?,
      scheduled_at:  decode_dt(&self.scheduled_at)?,
      observed_at:   decode_dt(&self.observed_at)?,
      minutes_late:  self.minutes_late,
      eta:           self.eta,
      recorded_at:   decode_utc(&self.recorded_at)?,
    })
  }
}
