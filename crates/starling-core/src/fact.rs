//! Fact tables and fact rows.
//!
//! A fact row is identified by its composite key: the ordered surrogate keys
//! of the dimensions listed in [`FactTable::key_dimensions`]. Measures are
//! typed and written exactly as sourced.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dimension::{Dimension, NaturalKey, SurrogateKey};

/// The fact tables of the star schema.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FactTable {
  Temperature,
  Sentiment,
  CompetitorShare,
}

impl FactTable {
  pub const ALL: [FactTable; 3] =
    [Self::Temperature, Self::Sentiment, Self::CompetitorShare];

  pub fn table(&self) -> &'static str {
    match self {
      Self::Temperature => "fact_temperature",
      Self::Sentiment => "fact_sentiment",
      Self::CompetitorShare => "fact_competitor_share",
    }
  }

  /// The dimensions whose surrogate keys form the composite key, in order.
  pub fn key_dimensions(&self) -> &'static [Dimension] {
    match self {
      Self::Temperature => &[Dimension::Sensor, Dimension::Time],
      Self::Sentiment => &[Dimension::Tweet, Dimension::Topic, Dimension::Time],
      Self::CompetitorShare => &[Dimension::Competitor, Dimension::Time],
    }
  }

  /// Composite key column names, parallel to [`Self::key_dimensions`].
  pub fn key_columns(&self) -> &'static [&'static str] {
    match self {
      Self::Temperature => &["sensor_key", "time_id"],
      Self::Sentiment => &["tweet_key", "topic_id", "time_id"],
      Self::CompetitorShare => &["competitor_id", "time_id"],
    }
  }

  pub fn measure_columns(&self) -> &'static [&'static str] {
    match self {
      Self::Temperature => &["temperature_c"],
      Self::Sentiment => &["polarity"],
      Self::CompetitorShare => &["market_share_percent"],
    }
  }
}

impl fmt::Display for FactTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.table())
  }
}

/// A typed measure value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Measure {
  Int(i64),
  Float(f64),
  Text(String),
}

/// Ordered surrogate keys identifying one fact row.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CompositeKey(pub Vec<SurrogateKey>);

/// A resolved fact row, ready for the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
  pub key:      CompositeKey,
  pub measures: Vec<Measure>,
}

/// A fact row as derived from a source row: foreign keys are still natural
/// keys and must be resolved by the merge engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FactCandidate {
  /// Position of the originating row in its source batch.
  pub source_row: usize,
  /// Natural keys parallel to [`FactTable::key_dimensions`].
  pub refs:       Vec<NaturalKey>,
  pub measures:   Vec<Measure>,
}

/// Polarity measure of a sentiment label.
pub fn polarity(label: Option<&str>) -> i64 {
  match label.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
    Some("positive") => 1,
    Some("negative") => -1,
    _ => 0,
  }
}
