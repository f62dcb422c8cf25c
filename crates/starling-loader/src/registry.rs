//! The run's shared dimension registry.
//!
//! One [`DimensionSnapshot`] per dimension, each behind its own async mutex.
//! Allocation and the write that persists it happen under the same lock, so
//! two streams can never hand out the same surrogate key.

use std::{collections::HashMap, sync::Arc};

use starling_core::{
  dimension::{Dimension, DimensionMember, DimensionSnapshot, RegistryView},
  store::Warehouse,
  summary::TableReport,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{Error, Result, pipeline::write_failure};

#[derive(Clone)]
pub(crate) struct SharedRegistry {
  dimensions: Arc<HashMap<Dimension, Arc<Mutex<DimensionSnapshot>>>>,
}

impl SharedRegistry {
  /// Snapshot every dimension as currently persisted.
  pub async fn load<W: Warehouse>(warehouse: &W) -> Result<Self> {
    let mut dimensions = HashMap::new();
    for dimension in Dimension::ALL {
      let pairs = warehouse
        .dimension_keys(dimension)
        .await
        .map_err(|e| Error::Snapshot(Box::new(e)))?;
      let snapshot = DimensionSnapshot::from_existing(dimension, pairs);
      info!(%dimension, members = snapshot.len(), "dimension snapshot loaded");
      dimensions.insert(dimension, Arc::new(Mutex::new(snapshot)));
    }
    Ok(Self { dimensions: Arc::new(dimensions) })
  }

  fn snapshot(&self, dimension: Dimension) -> Arc<Mutex<DimensionSnapshot>> {
    match self.dimensions.get(&dimension) {
      Some(snapshot) => Arc::clone(snapshot),
      // Unreachable after `load`, which inserts every dimension.
      None => Arc::new(Mutex::new(DimensionSnapshot::empty(dimension))),
    }
  }

  /// Register `members`, persist the newly allocated ones, and commit them to
  /// the snapshot. On a failed write the allocations are rolled back, so
  /// facts that needed them will not resolve.
  pub async fn extend<W: Warehouse>(
    &self,
    warehouse: &W,
    dimension: Dimension,
    members: Vec<DimensionMember>,
    report: &mut TableReport,
  ) {
    let cell = self.snapshot(dimension);
    let mut snapshot = cell.lock().await;

    let registration = snapshot.register(members);
    report.known += registration.known;
    report.deduplicated += registration.deduplicated;
    if snapshot.pending().is_empty() {
      return;
    }

    let inserts = snapshot.pending().to_vec();
    match warehouse.apply_members(dimension, inserts).await {
      Ok(counts) => {
        snapshot.commit();
        info!(
          table = dimension.table(),
          inserted = counts.inserted,
          "members committed"
        );
        report.committed(counts);
      }
      Err(e) => {
        snapshot.rollback();
        let err = write_failure(dimension.table(), &e);
        warn!(table = dimension.table(), error = %err, "dimension write failed");
        report.failed(&err);
      }
    }
  }

  /// Committed keys of `dimensions` as of now.
  pub async fn view(&self, dimensions: &[Dimension]) -> RegistryView {
    let mut view = RegistryView::new();
    for dimension in dimensions {
      view.include(&*self.snapshot(*dimension).lock().await);
    }
    view
  }
}
