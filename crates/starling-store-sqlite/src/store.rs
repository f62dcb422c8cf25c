//! [`SqliteWarehouse`], the SQLite implementation of [`Warehouse`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{ErrorCode, params_from_iter, types::Value};
use uuid::Uuid;

use starling_core::{
  Error as CoreError,
  dimension::{Dimension, NaturalKey, NewMember, SurrogateKey},
  fact::{CompositeKey, FactRow, FactTable},
  store::Warehouse,
  summary::{RunSummary, WriteCounts},
};

use crate::{
  Error, Result,
  encode::{
    decode_dt, decode_measure, decode_uuid, encode_dt, encode_uuid, fact_params,
    insert_fact_sql, insert_member_sql, member_params, select_facts_sql,
    select_members_sql, update_fact_sql,
  },
  schema::{TRUNCATE_ORDER, WAREHOUSE_SCHEMA},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Starling warehouse backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteWarehouse {
  conn: tokio_rusqlite::Connection,
}

/// A recorded load run, as read back from `load_runs`.
#[derive(Debug, Clone)]
pub struct RunRecord {
  pub run_id:      Uuid,
  pub started_at:  DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub summary:     RunSummary,
}

impl SqliteWarehouse {
  /// Open (or create) a warehouse at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory warehouse, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(WAREHOUSE_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Empty every dimension and fact table in one transaction.
  ///
  /// This is an administrative reset. The incremental loader never calls it.
  pub async fn truncate(&self) -> Result<usize> {
    let removed = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        let mut removed = 0;
        for table in TRUNCATE_ORDER {
          removed += tx.execute(&format!("DELETE FROM {table}"), [])?;
        }
        tx.commit()?;
        Ok(removed)
      })
      .await?;
    Ok(removed)
  }

  /// The most recent `limit` runs, newest first.
  pub async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
    let limit = limit as i64;
    let raws: Vec<(String, String, String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT run_id, started_at, finished_at, summary_json
           FROM load_runs
           ORDER BY started_at DESC
           LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(run_id, started_at, finished_at, json)| {
        Ok(RunRecord {
          run_id:      decode_uuid(&run_id)?,
          started_at:  decode_dt(&started_at)?,
          finished_at: decode_dt(&finished_at)?,
          summary:     serde_json::from_str(&json)?,
        })
      })
      .collect()
  }
}

/// A constraint violation while inserting dimension rows means two
/// allocators handed out the same key.
fn member_write_error(dimension: Dimension, err: tokio_rusqlite::Error) -> Error {
  match &err {
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
      if e.code == ErrorCode::ConstraintViolation =>
    {
      Error::Core(CoreError::AllocationConflict { dimension })
    }
    _ => Error::Database(err),
  }
}

// ─── Warehouse impl ──────────────────────────────────────────────────────────

impl Warehouse for SqliteWarehouse {
  type Error = Error;

  async fn dimension_keys(
    &self,
    dimension: Dimension,
  ) -> Result<Vec<(NaturalKey, SurrogateKey)>> {
    let sql = select_members_sql(dimension);

    let rows: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(
      rows
        .into_iter()
        .map(|(natural, key)| (NaturalKey::new(natural), SurrogateKey(key)))
        .collect(),
    )
  }

  async fn fact_rows(&self, table: FactTable) -> Result<Vec<FactRow>> {
    let sql = select_facts_sql(table);
    let key_len = table.key_columns().len();
    let width = key_len + table.measure_columns().len();

    let raws: Vec<Vec<Value>> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
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

    raws
      .into_iter()
      .map(|mut values| {
        let measures = values
          .split_off(key_len)
          .into_iter()
          .map(decode_measure)
          .collect::<Result<Vec<_>>>()?;
        let key = values
          .into_iter()
          .map(|v| match v {
            Value::Integer(i) => Ok(SurrogateKey(i)),
            other => Err(Error::Decode(format!(
              "non-integer key in {table}: {other:?}"
            ))),
          })
          .collect::<Result<Vec<_>>>()?;
        Ok(FactRow { key: CompositeKey(key), measures })
      })
      .collect()
  }

  async fn apply_members(
    &self,
    dimension: Dimension,
    inserts: Vec<NewMember>,
  ) -> Result<WriteCounts> {
    if inserts.is_empty() {
      return Ok(WriteCounts::default());
    }

    let sql = insert_member_sql(dimension);
    let params = inserts
      .iter()
      .map(member_params)
      .collect::<Result<Vec<_>>>()?;

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
          let mut stmt = tx.prepare(sql)?;
          for row in &params {
            inserted += stmt.execute(params_from_iter(row.iter()))?;
          }
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await
      .map_err(|e| member_write_error(dimension, e))?;

    Ok(WriteCounts { inserted, updated: 0 })
  }

  async fn apply_facts(
    &self,
    table: FactTable,
    inserts: Vec<FactRow>,
    updates: Vec<FactRow>,
  ) -> Result<WriteCounts> {
    if inserts.is_empty() && updates.is_empty() {
      return Ok(WriteCounts::default());
    }

    let insert_sql = insert_fact_sql(table);
    let update_sql = update_fact_sql(table);
    let insert_params: Vec<Vec<Value>> = inserts.iter().map(fact_params).collect();
    let update_params: Vec<Vec<Value>> = updates.iter().map(fact_params).collect();

    let counts = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut counts = WriteCounts::default();
        {
          let mut insert = tx.prepare(&insert_sql)?;
          for row in &insert_params {
            counts.inserted += insert.execute(params_from_iter(row.iter()))?;
          }
          let mut update = tx.prepare(&update_sql)?;
          // An update that matches nothing means the row vanished since the
          // snapshot, so the whole unit is refused.
          for row in &update_params {
            let changed = update.execute(params_from_iter(row.iter()))?;
            if changed != 1 {
              return Err(rusqlite::Error::StatementChangedRows(changed).into());
            }
            counts.updated += changed;
          }
        }
        tx.commit()?;
        Ok(counts)
      })
      .await?;

    Ok(counts)
  }

  async fn record_run(&self, summary: &RunSummary) -> Result<()> {
    let run_id_str   = encode_uuid(summary.run_id);
    let started_str  = encode_dt(summary.started_at);
    let finished_str = encode_dt(summary.finished_at);
    let json         = serde_json::to_string(summary)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO load_runs (run_id, started_at, finished_at, summary_json)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![run_id_str, started_str, finished_str, json],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
