//! Incremental loader for the Starling star schema.
//!
//! [`run`] takes one batch per source stream, loads the dimension snapshot,
//! runs the streams concurrently against a shared registry, and returns a
//! [`RunSummary`] with one report per touched table. Failures are scoped to
//! a table; the run itself only errors if it cannot start.

pub mod config;
mod error;
mod pipeline;
mod registry;

use chrono::Utc;
use starling_core::{
  staging::StagedBatches,
  store::{StagingSource, Warehouse},
  summary::{RunSummary, combine},
};
use tracing::{Instrument as _, info, info_span, warn};
use uuid::Uuid;

pub use config::{LoaderConfig, StreamKind};
pub use error::{Error, Result};

use crate::{
  pipeline::{
    StreamContext, StreamOutcome, load_competitor, load_sensor, load_sentiment,
  },
  registry::SharedRegistry,
};

/// Load `batches` into `warehouse`.
pub async fn run<W: Warehouse>(
  config: &LoaderConfig,
  warehouse: &W,
  batches: StagedBatches,
) -> Result<RunSummary> {
  let run_id = Uuid::new_v4();
  let started_at = Utc::now();
  info!(%run_id, "load run started");

  let registry = SharedRegistry::load(warehouse).await?;
  let ctx = StreamContext { warehouse, registry: &registry, config };
  let ctx = &ctx;

  let StagedBatches { sensor, sentiment, competitor } = batches;
  let span = |stream: StreamKind| {
    info_span!("stream", %run_id, stream = stream.name())
  };

  let sensor = async move {
    if !config.enabled(StreamKind::Sensor) {
      return StreamOutcome::default();
    }
    load_sensor(ctx, sensor).await
  }
  .instrument(span(StreamKind::Sensor));

  let sentiment = async move {
    if !config.enabled(StreamKind::Sentiment) {
      return StreamOutcome::default();
    }
    load_sentiment(ctx, sentiment).await
  }
  .instrument(span(StreamKind::Sentiment));

  let competitor = async move {
    if !config.enabled(StreamKind::Competitor) {
      return StreamOutcome::default();
    }
    load_competitor(ctx, competitor).await
  }
  .instrument(span(StreamKind::Competitor));

  let outcomes = tokio::join!(sensor, sentiment, competitor);
  let (mut reports, mut issues) = (Vec::new(), Vec::new());
  for outcome in [outcomes.0, outcomes.1, outcomes.2] {
    reports.extend(outcome.reports);
    issues.extend(outcome.issues);
  }

  let summary = RunSummary {
    run_id,
    started_at,
    finished_at: Utc::now(),
    tables: combine(reports),
    issues,
  };

  if let Err(e) = warehouse.record_run(&summary).await {
    warn!(%run_id, error = %e, "failed to record load run");
  }
  info!(
    %run_id,
    tables = summary.tables.len(),
    issues = summary.issues.len(),
    failed = summary.failed_tables().count(),
    "load run finished"
  );
  Ok(summary)
}

/// Read the enabled streams from `staging`, then [`run`].
pub async fn run_from_staging<W: Warehouse, S: StagingSource>(
  config: &LoaderConfig,
  warehouse: &W,
  staging: &S,
) -> Result<RunSummary> {
  let staging_error = |e: S::Error| Error::Staging(Box::new(e));

  let mut batches = StagedBatches::default();
  if config.enabled(StreamKind::Sensor) {
    batches.sensor = staging.sensor_batch().await.map_err(staging_error)?;
  }
  if config.enabled(StreamKind::Sentiment) {
    batches.sentiment = staging.sentiment_batch().await.map_err(staging_error)?;
  }
  if config.enabled(StreamKind::Competitor) {
    batches.competitor =
      staging.competitor_batches().await.map_err(staging_error)?;
  }

  run(config, warehouse, batches).await
}

#[cfg(test)]
mod tests;
