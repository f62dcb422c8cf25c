//! Fact merge engine: incoming candidates + existing facts → insert/update
//! sets.
//!
//! Policy, per composite key:
//! - only incoming → insert;
//! - incoming and existing → update with the incoming measures (last write
//!   wins, no field-level merge);
//! - only existing → untouched. Facts are never deleted here.
//!
//! A candidate is scheduled only if every foreign key resolves against the
//! committed registry; otherwise it is rejected with
//! [`Error::ReferentialIntegrity`].

use std::collections::HashSet;

use crate::{
  Error,
  detect::partition,
  dimension::KeyLookup,
  fact::{CompositeKey, FactCandidate, FactRow, FactTable},
};

/// The net effect of merging one batch into one fact table.
#[derive(Debug, Default)]
pub struct MergePlan {
  pub to_insert:    Vec<FactRow>,
  pub to_update:    Vec<FactRow>,
  /// Candidates that could not be scheduled, by source row.
  pub rejected:     Vec<(usize, Error)>,
  /// Candidates superseded by a later candidate with the same key.
  pub deduplicated: usize,
}

impl MergePlan {
  pub fn is_empty(&self) -> bool {
    self.to_insert.is_empty() && self.to_update.is_empty()
  }
}

/// Merge `candidates` for `table` against the facts already stored.
pub fn merge(
  table: FactTable,
  candidates: Vec<FactCandidate>,
  existing: &[FactRow],
  lookup: &impl KeyLookup,
) -> MergePlan {
  let existing_keys: HashSet<CompositeKey> =
    existing.iter().map(|row| row.key.clone()).collect();
  merge_keys(table, candidates, &existing_keys, lookup)
}

/// [`merge`] against a precomputed set of existing composite keys.
pub fn merge_keys(
  table: FactTable,
  candidates: Vec<FactCandidate>,
  existing: &HashSet<CompositeKey>,
  lookup: &impl KeyLookup,
) -> MergePlan {
  let mut plan = MergePlan::default();
  let mut resolved = Vec::with_capacity(candidates.len());

  for candidate in candidates {
    match resolve(table, candidate, lookup) {
      Ok(row) => resolved.push(row),
      Err((source_row, err)) => plan.rejected.push((source_row, err)),
    }
  }

  let split = partition(resolved, |row| row.key.clone(), existing);
  plan.to_insert = split.new;
  plan.to_update = split.known;
  plan.deduplicated = split.deduplicated;
  plan
}

fn resolve(
  table: FactTable,
  candidate: FactCandidate,
  lookup: &impl KeyLookup,
) -> Result<FactRow, (usize, Error)> {
  let dims = table.key_dimensions();
  let row = candidate.source_row;

  if candidate.refs.len() != dims.len()
    || candidate.measures.len() != table.measure_columns().len()
  {
    return Err((
      row,
      Error::MalformedRow(format!(
        "{table} expects {} keys and {} measures, got {} and {}",
        dims.len(),
        table.measure_columns().len(),
        candidate.refs.len(),
        candidate.measures.len(),
      )),
    ));
  }

  let mut key = Vec::with_capacity(dims.len());
  for (dimension, natural_key) in dims.iter().zip(candidate.refs) {
    match lookup.surrogate(*dimension, &natural_key) {
      Some(surrogate) => key.push(surrogate),
      None => {
        return Err((
          row,
          Error::ReferentialIntegrity { dimension: *dimension, natural_key },
        ));
      }
    }
  }

  Ok(FactRow { key: CompositeKey(key), measures: candidate.measures })
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;

  use super::*;
  use crate::{
    dimension::{
      Dimension, DimensionMember, DimensionSnapshot, MemberAttributes,
      NaturalKey, RegistryView, SurrogateKey,
    },
    fact::Measure,
  };

  fn view(sensors: &[&str], times: &[&str]) -> RegistryView {
    let mut view = RegistryView::new();
    view.include(&DimensionSnapshot::from_existing(
      Dimension::Sensor,
      sensors
        .iter()
        .enumerate()
        .map(|(i, s)| (NaturalKey::new(*s), SurrogateKey(i as i64 + 1))),
    ));
    view.include(&DimensionSnapshot::from_existing(
      Dimension::Time,
      times
        .iter()
        .enumerate()
        .map(|(i, t)| (NaturalKey::new(*t), SurrogateKey(i as i64 + 1))),
    ));
    view
  }

  fn reading(row: usize, sensor: &str, time: &str, temp: f64) -> FactCandidate {
    FactCandidate {
      source_row: row,
      refs:       vec![NaturalKey::new(sensor), NaturalKey::new(time)],
      measures:   vec![Measure::Float(temp)],
    }
  }

  fn key(sensor: i64, time: i64) -> CompositeKey {
    CompositeKey(vec![SurrogateKey(sensor), SurrogateKey(time)])
  }

  #[test]
  fn inserts_new_and_updates_existing() {
    let lookup = view(&["S1", "S2"], &["T1"]);
    let existing = vec![FactRow { key: key(1, 1), measures: vec![Measure::Float(20.5)] }];

    let plan = merge(
      FactTable::Temperature,
      vec![reading(0, "S1", "T1", 22.0), reading(1, "S2", "T1", 21.0)],
      &existing,
      &lookup,
    );

    assert_eq!(plan.to_update, vec![FactRow {
      key:      key(1, 1),
      measures: vec![Measure::Float(22.0)],
    }]);
    assert_eq!(plan.to_insert, vec![FactRow {
      key:      key(2, 1),
      measures: vec![Measure::Float(21.0)],
    }]);
    assert!(plan.rejected.is_empty());
  }

  #[test]
  fn dangling_reference_is_rejected() {
    let lookup = view(&["S1"], &["T1"]);
    let plan = merge(
      FactTable::Temperature,
      vec![reading(0, "S1", "T1", 1.0), reading(1, "S1", "T2", 2.0)],
      &[],
      &lookup,
    );
    assert_eq!(plan.to_insert.len(), 1);
    assert_eq!(plan.rejected.len(), 1);
    let (row, err) = &plan.rejected[0];
    assert_eq!(*row, 1);
    assert!(matches!(
      err,
      Error::ReferentialIntegrity { dimension: Dimension::Time, .. }
    ));
  }

  #[test]
  fn wrong_arity_is_malformed() {
    let lookup = view(&["S1"], &["T1"]);
    let candidate = FactCandidate {
      source_row: 4,
      refs:       vec![NaturalKey::new("S1")],
      measures:   vec![Measure::Float(1.0)],
    };
    let plan = merge(FactTable::Temperature, vec![candidate], &[], &lookup);
    assert!(matches!(plan.rejected[0], (4, Error::MalformedRow(_))));
  }

  #[test]
  fn existing_only_keys_are_left_alone() {
    let lookup = view(&["S1", "S2"], &["T1"]);
    let existing = vec![
      FactRow { key: key(1, 1), measures: vec![Measure::Float(1.0)] },
      FactRow { key: key(2, 1), measures: vec![Measure::Float(2.0)] },
    ];
    let plan = merge(
      FactTable::Temperature,
      vec![reading(0, "S1", "T1", 5.0)],
      &existing,
      &lookup,
    );
    assert!(plan.to_insert.is_empty());
    assert_eq!(plan.to_update.len(), 1);
  }

  #[test]
  fn float_measures_keep_source_precision() {
    let lookup = view(&["S1"], &["T1"]);
    let plan = merge(
      FactTable::Temperature,
      vec![reading(0, "S1", "T1", 21.123_456_789)],
      &[],
      &lookup,
    );
    assert_eq!(plan.to_insert[0].measures, vec![Measure::Float(21.123_456_789)]);
  }

  #[test]
  fn unrelated_dimension_in_snapshot_lookup() {
    // A single snapshot only answers for its own dimension.
    let mut snap = DimensionSnapshot::empty(Dimension::Sensor);
    snap.resolve_or_create(DimensionMember {
      natural_key: NaturalKey::new("S1"),
      attributes:  MemberAttributes::Sensor { location: None },
    });
    snap.commit();
    let plan = merge(
      FactTable::Temperature,
      vec![reading(0, "S1", "T1", 1.0)],
      &[],
      &snap,
    );
    assert!(plan.to_insert.is_empty());
    assert_eq!(plan.rejected.len(), 1);
  }

  proptest! {
    #[test]
    fn last_write_wins_for_duplicate_keys(
      temps in proptest::collection::vec(-40.0f64..60.0, 1..16),
    ) {
      let lookup = view(&["S1"], &["T1"]);
      let candidates = temps
        .iter()
        .enumerate()
        .map(|(i, t)| reading(i, "S1", "T1", *t))
        .collect();
      let plan = merge(FactTable::Temperature, candidates, &[], &lookup);

      prop_assert_eq!(plan.to_insert.len(), 1);
      prop_assert_eq!(plan.deduplicated, temps.len() - 1);
      let last = *temps.last().unwrap();
      prop_assert_eq!(&plan.to_insert[0].measures, &vec![Measure::Float(last)]);
    }
  }
}
