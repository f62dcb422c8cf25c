//! The `Warehouse` and `StagingSource` traits.
//!
//! Both are implemented by storage backends (e.g. `starling-store-sqlite`).
//! The loader depends on these abstractions, not on a concrete backend.

use std::future::Future;

use crate::{
  dimension::{Dimension, NaturalKey, NewMember, SurrogateKey},
  fact::{FactRow, FactTable},
  staging::{CompetitorBatch, SensorReading, TweetMention},
  summary::{RunSummary, WriteCounts},
};

// ─── Warehouse ───────────────────────────────────────────────────────────────

/// The destination star schema.
///
/// Each `apply_*` call is one atomic unit: either every row in it becomes
/// visible or none does. Separate calls are independent, so a failure in one
/// table never rolls back another.
pub trait Warehouse: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Snapshot reads ────────────────────────────────────────────────────

  /// Every (natural key, surrogate key) pair of `dimension`.
  fn dimension_keys(
    &self,
    dimension: Dimension,
  ) -> impl Future<Output = Result<Vec<(NaturalKey, SurrogateKey)>, Self::Error>>
  + Send
  + '_;

  /// Every row currently stored in `table`.
  fn fact_rows(
    &self,
    table: FactTable,
  ) -> impl Future<Output = Result<Vec<FactRow>, Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert newly allocated members of `dimension`. Dimension rows are never
  /// updated, so there is no update set.
  fn apply_members(
    &self,
    dimension: Dimension,
    inserts: Vec<NewMember>,
  ) -> impl Future<Output = Result<WriteCounts, Self::Error>> + Send + '_;

  /// Insert and update fact rows of `table` in one transaction.
  fn apply_facts(
    &self,
    table: FactTable,
    inserts: Vec<FactRow>,
    updates: Vec<FactRow>,
  ) -> impl Future<Output = Result<WriteCounts, Self::Error>> + Send + '_;

  /// Persist the summary of a finished run.
  fn record_run<'a>(
    &'a self,
    summary: &'a RunSummary,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

// ─── Staging ─────────────────────────────────────────────────────────────────

/// Read access to the staging tables filled by the extraction layer.
pub trait StagingSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn sensor_batch(
    &self,
  ) -> impl Future<Output = Result<Vec<SensorReading>, Self::Error>> + Send + '_;

  fn sentiment_batch(
    &self,
  ) -> impl Future<Output = Result<Vec<TweetMention>, Self::Error>> + Send + '_;

  /// One batch per distinct reporting timestamp.
  fn competitor_batches(
    &self,
  ) -> impl Future<Output = Result<Vec<CompetitorBatch>, Self::Error>> + Send + '_;
}
