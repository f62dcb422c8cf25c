//! Run-scoped loader configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use starling_core::time::TimeGrain;

use crate::Result;

/// A source stream of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
  Sensor,
  Sentiment,
  Competitor,
}

impl StreamKind {
  pub fn all() -> Vec<StreamKind> {
    vec![Self::Sensor, Self::Sentiment, Self::Competitor]
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::Sensor => "sensor",
      Self::Sentiment => "sentiment",
      Self::Competitor => "competitor",
    }
  }
}

fn default_separator() -> char { ',' }

/// Everything one run needs to know, deserialised from `starling.toml` and
/// `STARLING_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct LoaderConfig {
  pub warehouse_path:  PathBuf,
  pub staging_path:    PathBuf,
  #[serde(default)]
  pub time_grain:      TimeGrain,
  /// Separator between topic keywords in `matched_product`.
  #[serde(default = "default_separator")]
  pub topic_separator: char,
  #[serde(default = "StreamKind::all")]
  pub streams:         Vec<StreamKind>,
}

impl Default for LoaderConfig {
  fn default() -> Self {
    Self {
      warehouse_path:  PathBuf::from("warehouse.db"),
      staging_path:    PathBuf::from("staging.db"),
      time_grain:      TimeGrain::default(),
      topic_separator: default_separator(),
      streams:         StreamKind::all(),
    }
  }
}

impl LoaderConfig {
  /// Layer the optional TOML file at `path` under `STARLING_*` variables.
  pub fn load(path: &Path) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("STARLING")
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("streams"),
      )
      .build()?;

    let mut cfg: LoaderConfig = settings.try_deserialize()?;
    cfg.warehouse_path = expand_tilde(&cfg.warehouse_path);
    cfg.staging_path = expand_tilde(&cfg.staging_path);
    Ok(cfg)
  }

  pub fn enabled(&self, stream: StreamKind) -> bool {
    self.streams.contains(&stream)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
