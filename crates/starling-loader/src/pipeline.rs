//! The three source streams.
//!
//! Each stream prepares its rows, extends the dimensions they reference
//! (one write per dimension) and then merges and applies its facts (one
//! write for the fact table). A failed dimension write only hurts the facts
//! that needed its new members: they no longer resolve and are rejected.

use starling_core::{
  Error,
  dimension::{Dimension, DimensionMember},
  fact::{FactCandidate, FactTable},
  merge::merge,
  staging::{
    CompetitorBatch, SensorReading, TweetMention, prepare_mention,
    prepare_reading, prepare_share, report_time,
  },
  store::Warehouse,
  summary::{RowIssue, TableReport},
};
use tracing::{info, warn};

use crate::{config::LoaderConfig, registry::SharedRegistry};

/// Wrap a backend error as a table-scoped write failure.
pub(crate) fn write_failure(table: &str, err: &impl std::error::Error) -> Error {
  Error::WriteFailure { table: table.to_owned(), reason: err.to_string() }
}

/// What one stream did, before reports are combined across streams.
#[derive(Debug, Default)]
pub(crate) struct StreamOutcome {
  pub reports: Vec<TableReport>,
  pub issues:  Vec<RowIssue>,
}

impl StreamOutcome {
  fn reject(&mut self, report: &mut TableReport, row: usize, err: &Error) {
    warn!(table = %report.table, row, error = %err, "row rejected");
    report.rejected += 1;
    self.issues.push(RowIssue::from_error(report.table.clone(), row, err));
  }
}

pub(crate) struct StreamContext<'a, W> {
  pub warehouse: &'a W,
  pub registry:  &'a SharedRegistry,
  pub config:    &'a LoaderConfig,
}

impl<W: Warehouse> StreamContext<'_, W> {
  async fn extend(
    &self,
    dimension: Dimension,
    members: Vec<DimensionMember>,
    outcome: &mut StreamOutcome,
  ) {
    if members.is_empty() {
      return;
    }
    let mut report = TableReport::new(dimension.table());
    self
      .registry
      .extend(self.warehouse, dimension, members, &mut report)
      .await;
    outcome.reports.push(report);
  }

  /// Merge `candidates` into `table` and apply the plan as one unit.
  async fn apply_facts(
    &self,
    table: FactTable,
    candidates: Vec<FactCandidate>,
    mut report: TableReport,
    outcome: &mut StreamOutcome,
  ) {
    if candidates.is_empty() {
      outcome.reports.push(report);
      return;
    }

    let lookup = self.registry.view(table.key_dimensions()).await;
    let existing = match self.warehouse.fact_rows(table).await {
      Ok(rows) => rows,
      Err(e) => {
        let err = write_failure(table.table(), &e);
        warn!(%table, error = %err, "could not read existing facts");
        report.failed(&err);
        outcome.reports.push(report);
        return;
      }
    };

    let plan = merge(table, candidates, &existing, &lookup);
    report.deduplicated += plan.deduplicated;
    for (row, err) in &plan.rejected {
      outcome.reject(&mut report, *row, err);
    }

    if !plan.is_empty() {
      match self
        .warehouse
        .apply_facts(table, plan.to_insert, plan.to_update)
        .await
      {
        Ok(counts) => {
          info!(
            %table,
            inserted = counts.inserted,
            updated = counts.updated,
            "facts applied"
          );
          report.committed(counts);
        }
        Err(e) => {
          let err = write_failure(table.table(), &e);
          warn!(%table, error = %err, "fact write failed");
          report.failed(&err);
        }
      }
    }
    outcome.reports.push(report);
  }
}

// ─── Streams ─────────────────────────────────────────────────────────────────

pub(crate) async fn load_sensor<W: Warehouse>(
  ctx: &StreamContext<'_, W>,
  rows: Vec<SensorReading>,
) -> StreamOutcome {
  let table = FactTable::Temperature;
  let mut outcome = StreamOutcome::default();
  let mut facts = TableReport::new(table.table());

  let mut prepared = Vec::with_capacity(rows.len());
  for (row, reading) in rows.iter().enumerate() {
    match prepare_reading(reading, ctx.config.time_grain) {
      Ok(p) => prepared.push((row, p)),
      Err(err) => outcome.reject(&mut facts, row, &err),
    }
  }

  let times = prepared.iter().map(|(_, p)| p.time.clone()).collect();
  let sensors = prepared.iter().map(|(_, p)| p.sensor.clone()).collect();
  ctx.extend(Dimension::Time, times, &mut outcome).await;
  ctx.extend(Dimension::Sensor, sensors, &mut outcome).await;

  let candidates = prepared
    .into_iter()
    .map(|(row, p)| FactCandidate {
      source_row: row,
      refs:       vec![p.sensor.natural_key, p.time.natural_key],
      measures:   vec![p.temperature],
    })
    .collect();
  ctx.apply_facts(table, candidates, facts, &mut outcome).await;
  outcome
}

/// Tweets fan out to one fact per topic keyword. A tweet without topics is
/// skipped before any of its members are registered.
pub(crate) async fn load_sentiment<W: Warehouse>(
  ctx: &StreamContext<'_, W>,
  rows: Vec<TweetMention>,
) -> StreamOutcome {
  let table = FactTable::Sentiment;
  let mut outcome = StreamOutcome::default();
  let mut facts = TableReport::new(table.table());

  let mut prepared = Vec::with_capacity(rows.len());
  for (row, mention) in rows.iter().enumerate() {
    match prepare_mention(
      mention,
      ctx.config.time_grain,
      ctx.config.topic_separator,
    ) {
      Ok(Some(p)) => prepared.push((row, p)),
      Ok(None) => facts.skipped += 1,
      Err(err) => outcome.reject(&mut facts, row, &err),
    }
  }

  let times = prepared.iter().map(|(_, p)| p.time.clone()).collect();
  let tweets = prepared.iter().map(|(_, p)| p.tweet.clone()).collect();
  let topics = prepared
    .iter()
    .flat_map(|(_, p)| p.topics.iter().cloned())
    .collect();
  ctx.extend(Dimension::Time, times, &mut outcome).await;
  ctx.extend(Dimension::Tweet, tweets, &mut outcome).await;
  ctx.extend(Dimension::Topic, topics, &mut outcome).await;

  let candidates = prepared
    .into_iter()
    .flat_map(|(row, p)| {
      let tweet = p.tweet.natural_key;
      let time = p.time.natural_key;
      let polarity = p.polarity;
      p.topics.into_iter().map(move |topic| FactCandidate {
        source_row: row,
        refs:       vec![tweet.clone(), topic.natural_key, time.clone()],
        measures:   vec![polarity.clone()],
      })
    })
    .collect();
  ctx.apply_facts(table, candidates, facts, &mut outcome).await;
  outcome
}

/// Market-share rows take their time member from the report they belong to.
/// Row positions run across batches in reading order.
pub(crate) async fn load_competitor<W: Warehouse>(
  ctx: &StreamContext<'_, W>,
  batches: Vec<CompetitorBatch>,
) -> StreamOutcome {
  let table = FactTable::CompetitorShare;
  let mut outcome = StreamOutcome::default();
  let mut facts = TableReport::new(table.table());

  let mut times = Vec::with_capacity(batches.len());
  let mut prepared = Vec::new();
  let mut row = 0;
  for batch in &batches {
    let time = match report_time(batch, ctx.config.time_grain) {
      Ok(time) => time,
      Err(err) => {
        for offset in 0..batch.rows.len() {
          outcome.reject(&mut facts, row + offset, &err);
        }
        row += batch.rows.len();
        continue;
      }
    };

    let before = prepared.len();
    for share in &batch.rows {
      match prepare_share(share) {
        Ok(p) => prepared.push((row, time.natural_key.clone(), p)),
        Err(err) => outcome.reject(&mut facts, row, &err),
      }
      row += 1;
    }
    if prepared.len() > before {
      times.push(time);
    }
  }

  let companies = prepared
    .iter()
    .map(|(_, _, p)| p.competitor.clone())
    .collect();
  ctx.extend(Dimension::Time, times, &mut outcome).await;
  ctx.extend(Dimension::Competitor, companies, &mut outcome).await;

  let candidates = prepared
    .into_iter()
    .map(|(row, time, p)| FactCandidate {
      source_row: row,
      refs:       vec![p.competitor.natural_key, time],
      measures:   vec![p.share],
    })
    .collect();
  ctx.apply_facts(table, candidates, facts, &mut outcome).await;
  outcome
}
