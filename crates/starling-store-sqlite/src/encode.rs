//! Encoding and decoding helpers between Starling domain types and SQLite
//! values.
//!
//! Timestamps are stored as RFC 3339 strings, run ids as hyphenated UUIDs,
//! and measures as their natural SQLite storage class. SQL for fact tables is
//! generated from the column lists on [`FactTable`].

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use starling_core::{
  dimension::{Dimension, MemberAttributes, NewMember},
  fact::{FactRow, FactTable, Measure},
  time::CANONICAL_FORMAT,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(e.to_string()))
}

fn opt_text(value: &Option<String>) -> Value {
  value.clone().map(Value::Text).unwrap_or(Value::Null)
}

// ─── Measures ────────────────────────────────────────────────────────────────

pub fn encode_measure(measure: &Measure) -> Value {
  match measure {
    Measure::Int(i) => Value::Integer(*i),
    Measure::Float(f) => Value::Real(*f),
    Measure::Text(s) => Value::Text(s.clone()),
  }
}

pub fn decode_measure(value: Value) -> Result<Measure> {
  match value {
    Value::Integer(i) => Ok(Measure::Int(i)),
    Value::Real(f) => Ok(Measure::Float(f)),
    Value::Text(s) => Ok(Measure::Text(s)),
    other => Err(Error::Decode(format!("unsupported measure value: {other:?}"))),
  }
}

// ─── Lenient staging values ──────────────────────────────────────────────────

/// Identifier-like text from any storage class. Blobs and NULL are absent.
pub fn lenient_text(value: Value) -> Option<String> {
  match value {
    Value::Text(s) => Some(s),
    Value::Integer(i) => Some(i.to_string()),
    Value::Real(f) => Some(f.to_string()),
    Value::Null | Value::Blob(_) => None,
  }
}

/// A number from any storage class; unparseable text is absent.
pub fn lenient_f64(value: Value) -> Option<f64> {
  match value {
    Value::Real(f) => Some(f),
    Value::Integer(i) => Some(i as f64),
    Value::Text(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
    Value::Null | Value::Blob(_) => None,
  }
}

// ─── Dimensions ──────────────────────────────────────────────────────────────

/// `(surrogate column, natural column)` of a dimension table.
pub fn dimension_columns(dimension: Dimension) -> (&'static str, &'static str) {
  match dimension {
    Dimension::Time => ("time_id", "timestamp"),
    Dimension::Sensor => ("sensor_key", "sensor_id"),
    Dimension::Tweet => ("tweet_key", "tweet_id"),
    Dimension::Topic => ("topic_id", "keyword"),
    Dimension::Competitor => ("competitor_id", "company"),
  }
}

pub fn select_members_sql(dimension: Dimension) -> String {
  let (key, natural) = dimension_columns(dimension);
  format!("SELECT {natural}, {key} FROM {}", dimension.table())
}

pub fn insert_member_sql(dimension: Dimension) -> &'static str {
  match dimension {
    Dimension::Time => {
      "INSERT INTO dim_time (time_id, timestamp, year, month, day, hour, quarter)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
    }
    Dimension::Sensor => {
      "INSERT INTO dim_sensor (sensor_key, sensor_id, location) VALUES (?1, ?2, ?3)"
    }
    Dimension::Tweet => {
      "INSERT INTO dim_tweet (tweet_key, tweet_id, author_id, tweet_text)
       VALUES (?1, ?2, ?3, ?4)"
    }
    Dimension::Topic => "INSERT INTO dim_topic (topic_id, keyword) VALUES (?1, ?2)",
    Dimension::Competitor => {
      "INSERT INTO dim_competitor (competitor_id, company) VALUES (?1, ?2)"
    }
  }
}

/// Parameters for [`insert_member_sql`], in column order.
pub fn member_params(new: &NewMember) -> Result<Vec<Value>> {
  let mut params = vec![
    Value::Integer(new.surrogate_key.0),
    Value::Text(new.member.natural_key.as_str().to_owned()),
  ];
  match &new.member.attributes {
    MemberAttributes::Time { timestamp, parts } => {
      if new.member.natural_key.as_str()
        != timestamp.format(CANONICAL_FORMAT).to_string()
      {
        return Err(Error::Decode(format!(
          "time member {} does not match its timestamp {timestamp}",
          new.member.natural_key
        )));
      }
      params.extend([
        Value::Integer(parts.year.into()),
        Value::Integer(parts.month.into()),
        Value::Integer(parts.day.into()),
        Value::Integer(parts.hour.into()),
        Value::Integer(parts.quarter.into()),
      ]);
    }
    MemberAttributes::Sensor { location } => params.push(opt_text(location)),
    MemberAttributes::Tweet { author_id, tweet_text } => {
      params.push(opt_text(author_id));
      params.push(opt_text(tweet_text));
    }
    MemberAttributes::Topic | MemberAttributes::Competitor => {}
  }
  Ok(params)
}

// ─── Facts ───────────────────────────────────────────────────────────────────

pub fn select_facts_sql(table: FactTable) -> String {
  let cols: Vec<&str> = table
    .key_columns()
    .iter()
    .chain(table.measure_columns())
    .copied()
    .collect();
  format!("SELECT {} FROM {table}", cols.join(", "))
}

pub fn insert_fact_sql(table: FactTable) -> String {
  let cols: Vec<&str> = table
    .key_columns()
    .iter()
    .chain(table.measure_columns())
    .copied()
    .collect();
  let placeholders: Vec<String> =
    (1..=cols.len()).map(|i| format!("?{i}")).collect();
  format!(
    "INSERT INTO {table} ({}) VALUES ({})",
    cols.join(", "),
    placeholders.join(", ")
  )
}

/// `UPDATE` keyed on the composite key. Parameters are the key columns
/// followed by the measures, same as [`insert_fact_sql`].
pub fn update_fact_sql(table: FactTable) -> String {
  let keys = table.key_columns();
  let set: Vec<String> = table
    .measure_columns()
    .iter()
    .enumerate()
    .map(|(i, col)| format!("{col} = ?{}", keys.len() + i + 1))
    .collect();
  let filter: Vec<String> = keys
    .iter()
    .enumerate()
    .map(|(i, col)| format!("{col} = ?{}", i + 1))
    .collect();
  format!(
    "UPDATE {table} SET {} WHERE {}",
    set.join(", "),
    filter.join(" AND ")
  )
}

pub fn fact_params(row: &FactRow) -> Vec<Value> {
  row
    .key
    .0
    .iter()
    .map(|k| Value::Integer(k.0))
    .chain(row.measures.iter().map(encode_measure))
    .collect()
}
