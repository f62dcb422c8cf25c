//! End-to-end runs against an in-memory SQLite warehouse.

use std::convert::Infallible;

use starling_core::{
  dimension::{Dimension, NaturalKey, NewMember, SurrogateKey},
  fact::{CompositeKey, FactRow, FactTable, Measure},
  staging::{
    CompetitorBatch, MarketShare, SensorReading, StagedBatches, TweetMention,
  },
  store::{StagingSource, Warehouse},
  summary::{IssueKind, RunSummary, TableStatus, WriteCounts},
};
use starling_store_sqlite::{Error as StoreError, SqliteWarehouse};

use crate::{LoaderConfig, StreamKind, run, run_from_staging};

async fn warehouse() -> SqliteWarehouse {
  SqliteWarehouse::open_in_memory()
    .await
    .expect("in-memory warehouse")
}

fn reading(id: &str, temp: f64, ts: &str) -> SensorReading {
  SensorReading {
    sensor_id:   Some(id.into()),
    temperature: Some(temp),
    timestamp:   Some(ts.into()),
    location:    Some("Dock 1".into()),
  }
}

fn mention(id: &str, ts: &str, label: &str, products: &str) -> TweetMention {
  TweetMention {
    tweet_id:        Some(id.into()),
    tweet_text:      Some(format!("tweet {id}")),
    timestamp:       Some(ts.into()),
    user_location:   Some("Seattle".into()),
    sentiment_label: Some(label.into()),
    matched_product: Some(products.into()),
  }
}

fn share(company: &str, percent: f64) -> MarketShare {
  MarketShare {
    company:              Some(company.into()),
    market_share_percent: Some(percent),
  }
}

fn sensors(rows: Vec<SensorReading>) -> StagedBatches {
  StagedBatches { sensor: rows, ..Default::default() }
}

async fn keys(
  w: &impl Warehouse,
  dimension: Dimension,
) -> Vec<(NaturalKey, SurrogateKey)> {
  let mut keys = w.dimension_keys(dimension).await.unwrap();
  keys.sort();
  keys
}

async fn facts(w: &impl Warehouse, table: FactTable) -> Vec<FactRow> {
  let mut rows = w.fact_rows(table).await.unwrap();
  rows.sort_by(|a, b| a.key.cmp(&b.key));
  rows
}

fn temperature(sensor: i64, time: i64, value: f64) -> FactRow {
  FactRow {
    key:      CompositeKey(vec![SurrogateKey(sensor), SurrogateKey(time)]),
    measures: vec![Measure::Float(value)],
  }
}

fn counts(summary: &RunSummary, table: &str) -> (usize, usize) {
  let report = summary.table(table).expect("table reported");
  (report.inserted, report.updated)
}

// ─── Sensor stream ───────────────────────────────────────────────────────────

#[tokio::test]
async fn sensor_readings_insert_then_update() {
  let w = warehouse().await;
  let config = LoaderConfig::default();

  let first = run(
    &config,
    &w,
    sensors(vec![
      reading("S1", 20.5, "2024-01-01 10:00:00"),
      reading("S2", 21.0, "2024-01-01 10:00:00"),
    ]),
  )
  .await
  .unwrap();
  assert_eq!(counts(&first, "dim_sensor"), (2, 0));
  assert_eq!(counts(&first, "dim_time"), (1, 0));
  assert_eq!(counts(&first, "fact_temperature"), (2, 0));
  assert_eq!(facts(&w, FactTable::Temperature).await, vec![
    temperature(1, 1, 20.5),
    temperature(2, 1, 21.0),
  ]);

  let second = run(
    &config,
    &w,
    sensors(vec![reading("S1", 22.0, "2024-01-01T10:00:00Z")]),
  )
  .await
  .unwrap();
  assert_eq!(counts(&second, "fact_temperature"), (0, 1));
  assert_eq!(second.table("dim_sensor").unwrap().known, 1);
  assert_eq!(second.table("dim_sensor").unwrap().status, TableStatus::Unchanged);
  assert_eq!(facts(&w, FactTable::Temperature).await, vec![
    temperature(1, 1, 22.0),
    temperature(2, 1, 21.0),
  ]);
}

#[tokio::test]
async fn rerunning_a_batch_changes_nothing() {
  let w = warehouse().await;
  let config = LoaderConfig::default();
  let batch = StagedBatches {
    sensor:     vec![reading("S1", 20.5, "2024-01-01 10:00:00")],
    sentiment:  vec![mention("1001", "2024-01-01 11:00:00", "positive", "bikes")],
    competitor: vec![CompetitorBatch {
      reported_at: "2024-03-31".into(),
      rows:        vec![share("Company A", 30.0)],
    }],
  };

  run(&config, &w, batch.clone()).await.unwrap();
  let before: Vec<_> = {
    let mut all = Vec::new();
    for dimension in Dimension::ALL {
      all.push(keys(&w, dimension).await);
    }
    all
  };

  let again = run(&config, &w, batch).await.unwrap();
  for report in &again.tables {
    assert_eq!(report.inserted, 0, "{} inserted on rerun", report.table);
    assert!(!report.status.is_failed());
  }
  for (dimension, expected) in Dimension::ALL.into_iter().zip(before) {
    assert_eq!(keys(&w, dimension).await, expected);
  }
  assert_eq!(facts(&w, FactTable::Temperature).await, vec![temperature(1, 1, 20.5)]);
}

#[tokio::test]
async fn duplicate_rows_keep_the_last_value() {
  let w = warehouse().await;
  let summary = run(
    &LoaderConfig::default(),
    &w,
    sensors(vec![
      reading("S1", 20.0, "2024-01-01 10:00:00"),
      reading("S1", 23.5, "2024-01-01 10:00:00"),
    ]),
  )
  .await
  .unwrap();

  let report = summary.table("fact_temperature").unwrap();
  assert_eq!(report.inserted, 1);
  assert_eq!(report.deduplicated, 1);
  assert_eq!(facts(&w, FactTable::Temperature).await, vec![temperature(1, 1, 23.5)]);
}

#[tokio::test]
async fn malformed_rows_are_reported_not_fatal() {
  let w = warehouse().await;
  let mut missing_id = reading("S1", 20.0, "2024-01-01 10:00:00");
  missing_id.sensor_id = None;

  let summary = run(
    &LoaderConfig::default(),
    &w,
    sensors(vec![
      missing_id,
      reading("S2", 21.0, "2024-01-01 10:00:00"),
      reading("S3", 22.0, "yesterday-ish"),
    ]),
  )
  .await
  .unwrap();

  let report = summary.table("fact_temperature").unwrap();
  assert_eq!(report.rejected, 2);
  assert_eq!(report.inserted, 1);
  assert_eq!(report.status, TableStatus::Committed);

  let rows: Vec<usize> = summary.issues.iter().map(|i| i.row).collect();
  assert_eq!(rows, vec![0, 2]);
  assert!(summary.issues.iter().all(|i| i.kind == IssueKind::Malformed));
  assert_eq!(keys(&w, Dimension::Sensor).await.len(), 1);
}

// ─── Sentiment stream ────────────────────────────────────────────────────────

#[tokio::test]
async fn tweets_fan_out_per_topic() {
  let w = warehouse().await;
  let summary = run(
    &LoaderConfig::default(),
    &w,
    StagedBatches {
      sentiment: vec![mention("1001", "2024-01-01 09:00:00", "negative", "bikes, helmets")],
      ..Default::default()
    },
  )
  .await
  .unwrap();

  assert_eq!(counts(&summary, "dim_topic"), (2, 0));
  assert_eq!(counts(&summary, "fact_sentiment"), (2, 0));
  let rows = facts(&w, FactTable::Sentiment).await;
  assert_eq!(rows.len(), 2);
  assert!(rows.iter().all(|r| r.measures == vec![Measure::Int(-1)]));
}

#[tokio::test]
async fn tweets_without_topics_are_skipped() {
  let w = warehouse().await;
  let summary = run(
    &LoaderConfig::default(),
    &w,
    StagedBatches {
      sentiment: vec![mention("1001", "2024-01-01 09:00:00", "positive", " , ")],
      ..Default::default()
    },
  )
  .await
  .unwrap();

  let report = summary.table("fact_sentiment").unwrap();
  assert_eq!(report.skipped, 1);
  assert_eq!(report.status, TableStatus::Unchanged);
  assert!(summary.table("dim_tweet").is_none());
  assert!(keys(&w, Dimension::Tweet).await.is_empty());
  assert!(keys(&w, Dimension::Time).await.is_empty());
  assert!(summary.issues.is_empty());
}

// ─── Competitor stream ───────────────────────────────────────────────────────

#[tokio::test]
async fn market_share_uses_report_time() {
  let w = warehouse().await;
  let summary = run(
    &LoaderConfig::default(),
    &w,
    StagedBatches {
      competitor: vec![
        CompetitorBatch {
          reported_at: "2024-03-31".into(),
          rows:        vec![share("Company A", 30.0), share("Company B", 25.0)],
        },
        CompetitorBatch {
          reported_at: "2024-06-30".into(),
          rows:        vec![share("Company A", 28.0)],
        },
      ],
      ..Default::default()
    },
  )
  .await
  .unwrap();

  assert_eq!(counts(&summary, "dim_competitor"), (2, 0));
  assert_eq!(counts(&summary, "fact_competitor_share"), (3, 0));
  let times: Vec<String> = keys(&w, Dimension::Time)
    .await
    .into_iter()
    .map(|(k, _)| k.as_str().to_owned())
    .collect();
  assert_eq!(times, vec!["2024-03-31T00:00:00Z", "2024-06-30T00:00:00Z"]);
}

#[tokio::test]
async fn unparseable_report_time_rejects_the_whole_batch() {
  let w = warehouse().await;
  let summary = run(
    &LoaderConfig::default(),
    &w,
    StagedBatches {
      competitor: vec![
        CompetitorBatch {
          reported_at: "Q1".into(),
          rows:        vec![share("Company A", 30.0), share("Company B", 25.0)],
        },
        CompetitorBatch {
          reported_at: "2024-06-30".into(),
          rows:        vec![share("Company A", 28.0)],
        },
      ],
      ..Default::default()
    },
  )
  .await
  .unwrap();

  let report = summary.table("fact_competitor_share").unwrap();
  assert_eq!(report.rejected, 2);
  assert_eq!(report.inserted, 1);
  let rows: Vec<usize> = summary.issues.iter().map(|i| i.row).collect();
  assert_eq!(rows, vec![0, 1]);
}

// ─── Concurrency and failure isolation ───────────────────────────────────────

#[tokio::test]
async fn streams_share_one_time_member() {
  let w = warehouse().await;
  let summary = run(
    &LoaderConfig::default(),
    &w,
    StagedBatches {
      sensor:     vec![reading("S1", 20.5, "2024-01-01 10:00:00")],
      sentiment:  vec![mention("1001", "2024-01-01T10:00:00+00:00", "positive", "bikes")],
      competitor: vec![CompetitorBatch {
        reported_at: "2024-01-01T12:00:00+02:00".into(),
        rows:        vec![share("Company A", 30.0)],
      }],
    },
  )
  .await
  .unwrap();

  assert_eq!(keys(&w, Dimension::Time).await, vec![(
    NaturalKey::new("2024-01-01T10:00:00Z"),
    SurrogateKey(1)
  )]);
  let time = summary.table("dim_time").unwrap();
  assert_eq!(time.inserted, 1);
  assert_eq!(time.known, 2);
  assert!(!summary.has_failures());
}

/// Delegates to SQLite but refuses writes to one fact table or dimension.
struct Flaky {
  inner:        SqliteWarehouse,
  fail_facts:   Option<FactTable>,
  fail_members: Option<Dimension>,
}

impl Warehouse for Flaky {
  type Error = StoreError;

  async fn dimension_keys(
    &self,
    dimension: Dimension,
  ) -> Result<Vec<(NaturalKey, SurrogateKey)>, StoreError> {
    self.inner.dimension_keys(dimension).await
  }

  async fn fact_rows(&self, table: FactTable) -> Result<Vec<FactRow>, StoreError> {
    self.inner.fact_rows(table).await
  }

  async fn apply_members(
    &self,
    dimension: Dimension,
    inserts: Vec<NewMember>,
  ) -> Result<WriteCounts, StoreError> {
    if self.fail_members == Some(dimension) {
      return Err(StoreError::Decode("disk full".into()));
    }
    self.inner.apply_members(dimension, inserts).await
  }

  async fn apply_facts(
    &self,
    table: FactTable,
    inserts: Vec<FactRow>,
    updates: Vec<FactRow>,
  ) -> Result<WriteCounts, StoreError> {
    if self.fail_facts == Some(table) {
      return Err(StoreError::Decode("disk full".into()));
    }
    self.inner.apply_facts(table, inserts, updates).await
  }

  async fn record_run(&self, summary: &RunSummary) -> Result<(), StoreError> {
    self.inner.record_run(summary).await
  }
}

fn mixed_batch() -> StagedBatches {
  StagedBatches {
    sensor: vec![
      reading("S1", 20.5, "2024-01-01 10:00:00"),
      reading("S2", 21.0, "2024-01-01 10:00:00"),
    ],
    sentiment: vec![mention("1001", "2024-01-01 11:00:00", "positive", "bikes")],
    ..Default::default()
  }
}

#[tokio::test]
async fn failed_fact_table_leaves_others_committed() {
  let w = Flaky {
    inner:        warehouse().await,
    fail_facts:   Some(FactTable::Temperature),
    fail_members: None,
  };
  let summary = run(&LoaderConfig::default(), &w, mixed_batch()).await.unwrap();

  assert!(summary.table("fact_temperature").unwrap().status.is_failed());
  assert_eq!(summary.table("fact_sentiment").unwrap().status, TableStatus::Committed);
  assert_eq!(summary.table("dim_sensor").unwrap().status, TableStatus::Committed);
  assert!(facts(&w.inner, FactTable::Temperature).await.is_empty());
  assert_eq!(facts(&w.inner, FactTable::Sentiment).await.len(), 1);
  assert_eq!(summary.failed_tables().count(), 1);
}

#[tokio::test]
async fn failed_dimension_rejects_dependent_facts() {
  let w = Flaky {
    inner:        warehouse().await,
    fail_facts:   None,
    fail_members: Some(Dimension::Sensor),
  };
  let summary = run(&LoaderConfig::default(), &w, mixed_batch()).await.unwrap();

  assert!(summary.table("dim_sensor").unwrap().status.is_failed());
  let temperature = summary.table("fact_temperature").unwrap();
  assert_eq!(temperature.rejected, 2);
  assert_eq!(temperature.status, TableStatus::Unchanged);
  assert!(
    summary
      .issues
      .iter()
      .all(|i| i.kind == IssueKind::Referential && i.table == "fact_temperature")
  );

  // The time member was committed and the sentiment stream is unaffected.
  assert_eq!(keys(&w.inner, Dimension::Time).await.len(), 2);
  assert_eq!(summary.table("fact_sentiment").unwrap().inserted, 1);
  assert!(keys(&w.inner, Dimension::Sensor).await.is_empty());
}

#[tokio::test]
async fn failed_dimension_keys_are_reused_on_retry() {
  let flaky = Flaky {
    inner:        warehouse().await,
    fail_facts:   None,
    fail_members: Some(Dimension::Sensor),
  };
  run(&LoaderConfig::default(), &flaky, mixed_batch()).await.unwrap();

  let summary = run(&LoaderConfig::default(), &flaky.inner, mixed_batch())
    .await
    .unwrap();
  assert_eq!(counts(&summary, "dim_sensor"), (2, 0));
  assert_eq!(keys(&flaky.inner, Dimension::Sensor).await, vec![
    (NaturalKey::new("S1"), SurrogateKey(1)),
    (NaturalKey::new("S2"), SurrogateKey(2)),
  ]);
}

// ─── Persistence and staging ─────────────────────────────────────────────────

#[tokio::test]
async fn keys_are_stable_across_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("warehouse.db");
  let config = LoaderConfig::default();

  {
    let w = SqliteWarehouse::open(&path).await.unwrap();
    run(&config, &w, sensors(vec![
      reading("S1", 20.5, "2024-01-01 10:00:00"),
      reading("S2", 21.0, "2024-01-01 10:00:00"),
    ]))
    .await
    .unwrap();
  }

  let w = SqliteWarehouse::open(&path).await.unwrap();
  run(&config, &w, sensors(vec![
    reading("S3", 19.0, "2024-01-01 11:00:00"),
    reading("S1", 20.0, "2024-01-01 11:00:00"),
  ]))
  .await
  .unwrap();

  assert_eq!(keys(&w, Dimension::Sensor).await, vec![
    (NaturalKey::new("S1"), SurrogateKey(1)),
    (NaturalKey::new("S2"), SurrogateKey(2)),
    (NaturalKey::new("S3"), SurrogateKey(3)),
  ]);
  assert_eq!(keys(&w, Dimension::Time).await.len(), 2);
}

#[tokio::test]
async fn runs_are_recorded() {
  let w = warehouse().await;
  let summary = run(
    &LoaderConfig::default(),
    &w,
    sensors(vec![reading("S1", 20.5, "2024-01-01 10:00:00")]),
  )
  .await
  .unwrap();

  let runs = w.recent_runs(5).await.unwrap();
  assert_eq!(runs.len(), 1);
  assert_eq!(runs[0].run_id, summary.run_id);
  assert_eq!(runs[0].summary.tables, summary.tables);
}

struct FakeStaging(StagedBatches);

impl StagingSource for FakeStaging {
  type Error = Infallible;

  async fn sensor_batch(&self) -> Result<Vec<SensorReading>, Infallible> {
    Ok(self.0.sensor.clone())
  }

  async fn sentiment_batch(&self) -> Result<Vec<TweetMention>, Infallible> {
    Ok(self.0.sentiment.clone())
  }

  async fn competitor_batches(&self) -> Result<Vec<CompetitorBatch>, Infallible> {
    Ok(self.0.competitor.clone())
  }
}

#[tokio::test]
async fn only_enabled_streams_are_loaded() {
  let w = warehouse().await;
  let config = LoaderConfig { streams: vec![StreamKind::Sentiment], ..Default::default() };

  let summary = run_from_staging(&config, &w, &FakeStaging(mixed_batch()))
    .await
    .unwrap();

  assert!(summary.table("fact_temperature").is_none());
  assert!(keys(&w, Dimension::Sensor).await.is_empty());
  assert_eq!(counts(&summary, "fact_sentiment"), (1, 0));
}
