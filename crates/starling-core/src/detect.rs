//! Change detection: split a batch into rows the destination already holds
//! and rows it does not.
//!
//! Repeats of a key within one batch collapse to their last occurrence before
//! comparison, so a value corrected later in the same batch wins. Surviving
//! rows keep their relative input order (a collapsed row sits at the position
//! of its last occurrence).

use std::{
  collections::{HashMap, HashSet},
  hash::Hash,
};

/// The result of [`partition`].
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<R> {
  /// Rows whose key is absent from the destination.
  pub new:          Vec<R>,
  /// Rows whose key is already present.
  pub known:        Vec<R>,
  /// Rows dropped because a later row in the batch carried the same key.
  pub deduplicated: usize,
}

impl<R> Partition<R> {
  pub fn len(&self) -> usize { self.new.len() + self.known.len() }

  pub fn is_empty(&self) -> bool { self.new.is_empty() && self.known.is_empty() }
}

/// Partition `rows` against the set of keys already in the destination.
pub fn partition<R, K>(
  rows: Vec<R>,
  key_of: impl Fn(&R) -> K,
  existing: &HashSet<K>,
) -> Partition<R>
where
  K: Eq + Hash,
{
  partition_by(rows, key_of, |k| existing.contains(k))
}

/// Like [`partition`], with membership decided by `is_known`.
pub fn partition_by<R, K>(
  rows: Vec<R>,
  key_of: impl Fn(&R) -> K,
  is_known: impl Fn(&K) -> bool,
) -> Partition<R>
where
  K: Eq + Hash,
{
  let keys: Vec<K> = rows.iter().map(&key_of).collect();

  let mut last_seen: HashMap<&K, usize> = HashMap::with_capacity(keys.len());
  for (i, k) in keys.iter().enumerate() {
    last_seen.insert(k, i);
  }

  let mut out = Partition {
    new:          Vec::new(),
    known:        Vec::new(),
    deduplicated: 0,
  };

  for (i, row) in rows.into_iter().enumerate() {
    let key = &keys[i];
    if last_seen.get(key) != Some(&i) {
      out.deduplicated += 1;
      continue;
    }
    if is_known(key) {
      out.known.push(row);
    } else {
      out.new.push(row);
    }
  }

  out
}
