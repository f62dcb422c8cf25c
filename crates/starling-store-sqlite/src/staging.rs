//! [`SqliteStaging`]: the staging tables as a [`StagingSource`].

use std::path::Path;

use rusqlite::types::Value;
use starling_core::{
  staging::{CompetitorBatch, MarketShare, SensorReading, TweetMention},
  store::StagingSource,
};

use crate::{
  Error, Result,
  encode::{lenient_f64, lenient_text},
  schema::STAGING_SCHEMA,
};

/// The staging database written by the extraction layer.
#[derive(Clone)]
pub struct SqliteStaging {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStaging {
  /// Open (or create) the staging database at `path`. Missing staging tables
  /// are created empty.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let staging = Self { conn };
    staging.init_schema().await?;
    Ok(staging)
  }

  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let staging = Self { conn };
    staging.init_schema().await?;
    Ok(staging)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(STAGING_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Read every row of `sql` as raw values, `width` columns wide.
  async fn raw_rows(
    &self,
    sql: &'static str,
    width: usize,
  ) -> Result<Vec<Vec<Value>>> {
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
          .query_map([], |row| {
            (0..width)
              .map(|i| row.get::<_, Value>(i))
              .collect::<rusqlite::Result<Vec<Value>>>()
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }
}

/// Pop the next column off a raw row.
fn take(values: &mut std::vec::IntoIter<Value>) -> Value {
  values.next().unwrap_or(Value::Null)
}

impl StagingSource for SqliteStaging {
  type Error = Error;

  async fn sensor_batch(&self) -> Result<Vec<SensorReading>> {
    let raws = self
      .raw_rows(
        "SELECT sensor_id, temperature, timestamp, location
         FROM warehouse_temp_sensor ORDER BY rowid",
        4,
      )
      .await?;

    Ok(
      raws
        .into_iter()
        .map(|raw| {
          let mut v = raw.into_iter();
          SensorReading {
            sensor_id:   lenient_text(take(&mut v)),
            temperature: lenient_f64(take(&mut v)),
            timestamp:   lenient_text(take(&mut v)),
            location:    lenient_text(take(&mut v)),
          }
        })
        .collect(),
    )
  }

  async fn sentiment_batch(&self) -> Result<Vec<TweetMention>> {
    let raws = self
      .raw_rows(
        "SELECT tweet_id, tweet_text, timestamp, user_location, sentiment,
                matched_product
         FROM external_sentiment ORDER BY rowid",
        6,
      )
      .await?;

    Ok(
      raws
        .into_iter()
        .map(|raw| {
          let mut v = raw.into_iter();
          TweetMention {
            tweet_id:        lenient_text(take(&mut v)),
            tweet_text:      lenient_text(take(&mut v)),
            timestamp:       lenient_text(take(&mut v)),
            user_location:   lenient_text(take(&mut v)),
            sentiment_label: lenient_text(take(&mut v)),
            matched_product: lenient_text(take(&mut v)),
          }
        })
        .collect(),
    )
  }

  async fn competitor_batches(&self) -> Result<Vec<CompetitorBatch>> {
    let raws = self
      .raw_rows(
        "SELECT company, market_share_percent, reported_at
         FROM market_share_report ORDER BY rowid",
        3,
      )
      .await?;

    // Group by reporting timestamp, in order of first appearance.
    let mut batches: Vec<CompetitorBatch> = Vec::new();
    for raw in raws {
      let mut v = raw.into_iter();
      let row = MarketShare {
        company:              lenient_text(take(&mut v)),
        market_share_percent: lenient_f64(take(&mut v)),
      };
      let reported_at = lenient_text(take(&mut v)).unwrap_or_default();

      match batches.iter_mut().find(|b| b.reported_at == reported_at) {
        Some(batch) => batch.rows.push(row),
        None => batches.push(CompetitorBatch { reported_at, rows: vec![row] }),
      }
    }
    Ok(batches)
  }
}
