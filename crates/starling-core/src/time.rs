//! Timestamp normalisation for the shared time dimension.
//!
//! Every source stream funnels its raw timestamps through [`normalize`] so
//! that equal instants resolve to one natural key regardless of how the
//! staging layer spelled them:
//!
//! - RFC 3339 and `+HH:MM` or `+HHMM` suffixed values are converted to UTC.
//! - Naive values (no offset) are taken to be UTC already.
//! - Sub-second precision is always dropped; [`TimeGrain::Hour`] also drops
//!   minutes and seconds.
//! - A bare date is midnight.

use chrono::{
  DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc,
};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  dimension::{DimensionMember, MemberAttributes, NaturalKey},
};

/// Canonical text form of a time-dimension natural key.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const NAIVE_FORMATS: &[&str] = &[
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%d %H:%M",
  "%Y-%m-%dT%H:%M",
];

const OFFSET_FORMATS: &[&str] = &[
  "%Y-%m-%d %H:%M:%S%.f%:z",
  "%Y-%m-%d %H:%M:%S%.f%z",
  "%Y-%m-%dT%H:%M:%S%.f%z",
];

/// Resolution at which timestamps become distinct time-dimension members.
///
/// Changing the grain between runs against the same warehouse changes the
/// natural key of new timestamps; existing members are left alone.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TimeGrain {
  #[default]
  Second,
  Hour,
}

/// Calendar attributes of a time-dimension row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeParts {
  pub year:    i32,
  pub month:   u32,
  pub day:     u32,
  pub hour:    u32,
  pub quarter: u32,
}

impl TimeParts {
  pub fn of(ts: DateTime<Utc>) -> Self {
    Self {
      year:    ts.year(),
      month:   ts.month(),
      day:     ts.day(),
      hour:    ts.hour(),
      quarter: (ts.month() - 1) / 3 + 1,
    }
  }
}

/// Parse `raw` and normalise it to a UTC instant at `grain`.
pub fn normalize(raw: &str, grain: TimeGrain) -> Result<DateTime<Utc>> {
  let s = raw.trim();
  let parsed = parse_utc(s).ok_or_else(|| Error::InvalidTimestamp(raw.to_owned()))?;
  truncate(parsed, grain).ok_or_else(|| Error::InvalidTimestamp(raw.to_owned()))
}

fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
  if s.is_empty() {
    return None;
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  for fmt in OFFSET_FORMATS {
    if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
      return Some(dt.with_timezone(&Utc));
    }
  }
  for fmt in NAIVE_FORMATS {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
      return Some(naive.and_utc());
    }
  }
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
}

fn truncate(ts: DateTime<Utc>, grain: TimeGrain) -> Option<DateTime<Utc>> {
  let (minute, second) = match grain {
    TimeGrain::Second => (ts.minute(), ts.second()),
    TimeGrain::Hour => (0, 0),
  };
  ts.date_naive()
    .and_hms_opt(ts.hour(), minute, second)
    .map(|naive| naive.and_utc())
}

/// The natural key of an already-normalised instant.
pub fn natural_key(ts: DateTime<Utc>) -> NaturalKey {
  NaturalKey::new(ts.format(CANONICAL_FORMAT).to_string())
}

/// Decompose a raw timestamp into a time-dimension member.
pub fn time_member(raw: &str, grain: TimeGrain) -> Result<DimensionMember> {
  let ts = normalize(raw, grain)?;
  Ok(DimensionMember {
    natural_key: natural_key(ts),
    attributes:  MemberAttributes::Time {
      timestamp: ts,
      parts:     TimeParts::of(ts),
    },
  })
}
