//! Error type for `starling-loader`.
//!
//! Only conditions that stop a run before any table is touched live here.
//! Everything after that point is reported in the run summary instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("failed to load the dimension snapshot: {0}")]
  Snapshot(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("failed to read staging tables: {0}")]
  Staging(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
