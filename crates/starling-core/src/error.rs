//! Error types for `starling-core`.
//!
//! Row-level variants (`MalformedRow`, `ReferentialIntegrity`) are reported in
//! a run summary and never abort a run. `WriteFailure` aborts one table's
//! commit. `AllocationConflict` is raised by a backend when a
//! dimension insert collides with an existing key, which only happens if two
//! allocators bypass the registry's serialisation.

use thiserror::Error;

use crate::dimension::{Dimension, NaturalKey};

#[derive(Debug, Error)]
pub enum Error {
  #[error("malformed row: {0}")]
  MalformedRow(String),

  #[error("unparseable timestamp: {0:?}")]
  InvalidTimestamp(String),

  #[error("{dimension} key \"{natural_key}\" is not resolvable in this run")]
  ReferentialIntegrity {
    dimension:   Dimension,
    natural_key: NaturalKey,
  },

  #[error("write to {table} failed: {reason}")]
  WriteFailure {
    table:  String,
    reason: String,
  },

  #[error("conflicting surrogate key allocation in {dimension}")]
  AllocationConflict { dimension: Dimension },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
