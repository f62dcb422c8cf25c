//! Staging rows as handed over by the extraction layer.
//!
//! Every column is optional: the staging tables are structurally normalised
//! but unvalidated, and a missing value is only an error once a row is
//! turned into dimension members and fact candidates. The `prepare_*`
//! functions do that conversion, one source row at a time.

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  dimension::{DimensionMember, MemberAttributes, NaturalKey},
  fact::{Measure, polarity},
  time::{TimeGrain, time_member},
};

// ─── Staged rows ─────────────────────────────────────────────────────────────

/// One row of `warehouse_temp_sensor`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
  pub sensor_id:   Option<String>,
  pub temperature: Option<f64>,
  pub timestamp:   Option<String>,
  pub location:    Option<String>,
}

/// One row of `external_sentiment`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TweetMention {
  pub tweet_id:        Option<String>,
  pub tweet_text:      Option<String>,
  pub timestamp:       Option<String>,
  pub user_location:   Option<String>,
  pub sentiment_label: Option<String>,
  /// Topic keywords joined by the configured separator.
  pub matched_product: Option<String>,
}

/// One row of `market_share_report`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketShare {
  pub company:              Option<String>,
  pub market_share_percent: Option<f64>,
}

/// A market-share report: every row shares one reporting timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompetitorBatch {
  pub reported_at: String,
  pub rows:        Vec<MarketShare>,
}

/// Everything staged for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagedBatches {
  pub sensor:     Vec<SensorReading>,
  pub sentiment:  Vec<TweetMention>,
  pub competitor: Vec<CompetitorBatch>,
}

// ─── Prepared rows ───────────────────────────────────────────────────────────

/// A sensor reading decomposed into members and a measure.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedReading {
  pub time:        DimensionMember,
  pub sensor:      DimensionMember,
  pub temperature: Measure,
}

/// A tweet decomposed into members, one per topic keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedMention {
  pub time:     DimensionMember,
  pub tweet:    DimensionMember,
  pub topics:   Vec<DimensionMember>,
  pub polarity: Measure,
}

/// A market-share row decomposed into its competitor member and measure.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedShare {
  pub competitor: DimensionMember,
  pub share:      Measure,
}

fn required<'a>(value: &'a Option<String>, column: &str) -> Result<&'a str> {
  match value.as_deref().map(str::trim) {
    Some(v) if !v.is_empty() => Ok(v),
    _ => Err(Error::MalformedRow(format!("missing {column}"))),
  }
}

fn optional(value: &Option<String>) -> Option<String> {
  value
    .as_deref()
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .map(str::to_owned)
}

fn finite(value: Option<f64>, column: &str) -> Result<f64> {
  match value {
    Some(v) if v.is_finite() => Ok(v),
    Some(v) => Err(Error::MalformedRow(format!("{column} is not finite: {v}"))),
    None => Err(Error::MalformedRow(format!("missing {column}"))),
  }
}

fn timestamp(raw: &Option<String>, grain: TimeGrain) -> Result<DimensionMember> {
  let raw = required(raw, "timestamp")?;
  time_member(raw, grain)
    .map_err(|e| Error::MalformedRow(e.to_string()))
}

/// Split a `matched_product` value into distinct, trimmed keywords in order
/// of first appearance.
pub fn topic_keywords(matched: Option<&str>, separator: char) -> Vec<String> {
  let mut out: Vec<String> = Vec::new();
  for keyword in matched.unwrap_or_default().split(separator).map(str::trim) {
    if !keyword.is_empty() && !out.iter().any(|k| k == keyword) {
      out.push(keyword.to_owned());
    }
  }
  out
}

pub fn prepare_reading(
  row: &SensorReading,
  grain: TimeGrain,
) -> Result<PreparedReading> {
  let sensor_id = required(&row.sensor_id, "sensor_id")?;
  let temperature = finite(row.temperature, "temperature")?;
  let time = timestamp(&row.timestamp, grain)?;

  Ok(PreparedReading {
    time,
    sensor: DimensionMember {
      natural_key: NaturalKey::new(sensor_id),
      attributes:  MemberAttributes::Sensor { location: optional(&row.location) },
    },
    temperature: Measure::Float(temperature),
  })
}

/// Prepare a tweet. `Ok(None)` means the row names no topic and contributes
/// nothing; that is a skip, not an error.
pub fn prepare_mention(
  row: &TweetMention,
  grain: TimeGrain,
  separator: char,
) -> Result<Option<PreparedMention>> {
  let keywords = topic_keywords(row.matched_product.as_deref(), separator);
  if keywords.is_empty() {
    return Ok(None);
  }

  let tweet_id = required(&row.tweet_id, "tweet_id")?;
  let time = timestamp(&row.timestamp, grain)?;

  Ok(Some(PreparedMention {
    time,
    tweet: DimensionMember {
      natural_key: NaturalKey::new(tweet_id),
      attributes:  MemberAttributes::Tweet {
        author_id:  optional(&row.user_location),
        tweet_text: row.tweet_text.clone(),
      },
    },
    topics: keywords
      .into_iter()
      .map(|keyword| DimensionMember {
        natural_key: NaturalKey::new(keyword),
        attributes:  MemberAttributes::Topic,
      })
      .collect(),
    polarity: Measure::Int(polarity(row.sentiment_label.as_deref())),
  }))
}

pub fn prepare_share(row: &MarketShare) -> Result<PreparedShare> {
  let company = required(&row.company, "company")?;
  let share = finite(row.market_share_percent, "market_share_percent")?;
  Ok(PreparedShare {
    competitor: DimensionMember {
      natural_key: NaturalKey::new(company),
      attributes:  MemberAttributes::Competitor,
    },
    share: Measure::Float(share),
  })
}

/// The time member of a market-share report.
pub fn report_time(
  batch: &CompetitorBatch,
  grain: TimeGrain,
) -> Result<DimensionMember> {
  timestamp(&Some(batch.reported_at.clone()), grain)
}
