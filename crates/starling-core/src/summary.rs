//! The structured result of a load run.
//!
//! A run never reports a single pass/fail flag. Each touched table gets a
//! [`TableReport`]; row-level problems are listed as [`RowIssue`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// Rows written by one atomic apply.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct WriteCounts {
  pub inserted: usize,
  pub updated:  usize,
}

/// Whether a table's changes were committed in this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableStatus {
  Committed,
  /// Nothing to write; no transaction was opened.
  Unchanged,
  Failed { reason: String },
}

impl TableStatus {
  pub fn is_failed(&self) -> bool { matches!(self, Self::Failed { .. }) }
}

/// Per-table tallies for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
  pub table:        String,
  pub inserted:     usize,
  pub updated:      usize,
  /// Rows already present (dimension members seen before).
  pub known:        usize,
  /// Rows that contributed nothing by design (e.g. a tweet with no topic).
  pub skipped:      usize,
  /// Rows refused as malformed or referentially unsafe.
  pub rejected:     usize,
  /// Rows collapsed into a later row with the same key.
  pub deduplicated: usize,
  pub status:       TableStatus,
}

impl TableReport {
  pub fn new(table: impl Into<String>) -> Self {
    Self {
      table:        table.into(),
      inserted:     0,
      updated:      0,
      known:        0,
      skipped:      0,
      rejected:     0,
      deduplicated: 0,
      status:       TableStatus::Unchanged,
    }
  }

  /// Record a successful apply. A failure recorded earlier stays visible.
  pub fn committed(&mut self, counts: WriteCounts) {
    self.inserted += counts.inserted;
    self.updated += counts.updated;
    if !self.status.is_failed() {
      self.status = TableStatus::Committed;
    }
  }

  /// Record a failed apply. Counts only ever include committed units, so
  /// they are left as they are.
  pub fn failed(&mut self, err: &Error) {
    self.status = TableStatus::Failed { reason: err.to_string() };
  }

  /// Fold a report for the same table (from another stream) into this one.
  pub fn absorb(&mut self, other: TableReport) {
    debug_assert_eq!(self.table, other.table);
    self.inserted += other.inserted;
    self.updated += other.updated;
    self.known += other.known;
    self.skipped += other.skipped;
    self.rejected += other.rejected;
    self.deduplicated += other.deduplicated;
    let mine = std::mem::replace(&mut self.status, TableStatus::Unchanged);
    self.status = match (mine, other.status) {
      (TableStatus::Failed { reason: a }, TableStatus::Failed { reason: b }) => {
        TableStatus::Failed { reason: format!("{a}; {b}") }
      }
      (failed @ TableStatus::Failed { .. }, _)
      | (_, failed @ TableStatus::Failed { .. }) => failed,
      (TableStatus::Committed, _) | (_, TableStatus::Committed) => {
        TableStatus::Committed
      }
      _ => TableStatus::Unchanged,
    };
  }
}

/// Combine reports so each table appears once, in order of first appearance.
pub fn combine(reports: impl IntoIterator<Item = TableReport>) -> Vec<TableReport> {
  let mut out: Vec<TableReport> = Vec::new();
  for report in reports {
    match out.iter_mut().find(|r| r.table == report.table) {
      Some(existing) => existing.absorb(report),
      None => out.push(report),
    }
  }
  out
}

/// Row-level problem category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
  Malformed,
  Referential,
}

/// A source row that was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIssue {
  pub table:  String,
  /// Position in the source batch.
  pub row:    usize,
  pub kind:   IssueKind,
  pub detail: String,
}

impl RowIssue {
  pub fn from_error(table: impl Into<String>, row: usize, err: &Error) -> Self {
    let kind = match err {
      Error::ReferentialIntegrity { .. } => IssueKind::Referential,
      _ => IssueKind::Malformed,
    };
    Self { table: table.into(), row, kind, detail: err.to_string() }
  }
}

/// Everything a run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
  pub run_id:      Uuid,
  pub started_at:  DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub tables:      Vec<TableReport>,
  pub issues:      Vec<RowIssue>,
}

impl RunSummary {
  pub fn table(&self, name: &str) -> Option<&TableReport> {
    self.tables.iter().find(|t| t.table == name)
  }

  pub fn failed_tables(&self) -> impl Iterator<Item = &TableReport> {
    self.tables.iter().filter(|t| t.status.is_failed())
  }

  pub fn has_failures(&self) -> bool { self.failed_tables().next().is_some() }
}
