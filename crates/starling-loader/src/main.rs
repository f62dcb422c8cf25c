//! `starling` command-line entry point.
//!
//! Reads `starling.toml` (or the path given with `--config`) layered under
//! `STARLING_*` environment variables, then loads the staging tables into the
//! warehouse. The run summary is printed as JSON on stdout; logs go to stderr.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use starling_loader::LoaderConfig;
use starling_store_sqlite::{SqliteStaging, SqliteWarehouse};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Starling star-schema loader")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "starling.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Incrementally load the staging tables into the warehouse.
  Load,
  /// Delete every dimension and fact row in the warehouse.
  Truncate {
    /// Confirm the reset.
    #[arg(long)]
    yes: bool,
  },
  /// Show recent load runs.
  Runs {
    #[arg(short, long, default_value_t = 10)]
    limit: usize,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let config = LoaderConfig::load(&cli.config)
    .with_context(|| format!("failed to load config from {:?}", cli.config))?;

  let warehouse = SqliteWarehouse::open(&config.warehouse_path)
    .await
    .with_context(|| {
      format!("failed to open warehouse at {:?}", config.warehouse_path)
    })?;

  match cli.command {
    Command::Load => {
      let staging = SqliteStaging::open(&config.staging_path)
        .await
        .with_context(|| {
          format!("failed to open staging at {:?}", config.staging_path)
        })?;

      let summary =
        starling_loader::run_from_staging(&config, &warehouse, &staging)
          .await
          .context("load run could not start")?;

      println!(
        "{}",
        serde_json::to_string_pretty(&summary)
          .context("failed to serialise run summary")?
      );

      let failed: Vec<&str> =
        summary.failed_tables().map(|t| t.table.as_str()).collect();
      if !failed.is_empty() {
        anyhow::bail!("tables failed to load: {}", failed.join(", "));
      }
    }

    Command::Truncate { yes } => {
      if !yes {
        anyhow::bail!(
          "refusing to empty {:?} without --yes",
          config.warehouse_path
        );
      }
      let removed = warehouse
        .truncate()
        .await
        .context("failed to truncate warehouse")?;
      tracing::info!(removed, "warehouse truncated");
    }

    Command::Runs { limit } => {
      let runs = warehouse
        .recent_runs(limit)
        .await
        .context("failed to read load runs")?;
      for record in runs {
        let failed = record.summary.failed_tables().count();
        println!(
          "{}  {}  tables={} issues={} failed={}",
          record.run_id,
          record.started_at.to_rfc3339(),
          record.summary.tables.len(),
          record.summary.issues.len(),
          failed,
        );
      }
    }
  }

  Ok(())
}
