//! Dimension identity: natural keys, surrogate keys, and the per-dimension
//! snapshot that allocates surrogate keys.
//!
//! A [`DimensionSnapshot`] is loaded from the warehouse at run start. New
//! members are allocated into a pending set, written by the warehouse, and
//! only then committed; fact rows resolve foreign keys against committed
//! members alone, so a failed dimension write can never leave a fact
//! pointing at a row that does not exist.

use std::{collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{detect::partition_by, time::TimeParts};

// ─── Identity ────────────────────────────────────────────────────────────────

/// The dimensions of the star schema.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
  Time,
  Sensor,
  Tweet,
  Topic,
  Competitor,
}

impl Dimension {
  pub const ALL: [Dimension; 5] = [
    Self::Time,
    Self::Sensor,
    Self::Tweet,
    Self::Topic,
    Self::Competitor,
  ];

  /// The warehouse table holding this dimension.
  pub fn table(&self) -> &'static str {
    match self {
      Self::Time => "dim_time",
      Self::Sensor => "dim_sensor",
      Self::Tweet => "dim_tweet",
      Self::Topic => "dim_topic",
      Self::Competitor => "dim_competitor",
    }
  }
}

impl fmt::Display for Dimension {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Time => "time",
      Self::Sensor => "sensor",
      Self::Tweet => "tweet",
      Self::Topic => "topic",
      Self::Competitor => "competitor",
    };
    f.write_str(name)
  }
}

/// Canonical text of an externally meaningful identifier.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NaturalKey(String);

impl NaturalKey {
  pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for NaturalKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Stable integer identity of a dimension member. Never reused or mutated.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
  Deserialize,
)]
#[serde(transparent)]
pub struct SurrogateKey(pub i64);

impl fmt::Display for SurrogateKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

// ─── Members ─────────────────────────────────────────────────────────────────

/// Descriptive columns of a dimension row, captured on first sighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dimension", rename_all = "lowercase")]
pub enum MemberAttributes {
  Time {
    timestamp: DateTime<Utc>,
    parts:     TimeParts,
  },
  Sensor {
    location: Option<String>,
  },
  Tweet {
    author_id:  Option<String>,
    tweet_text: Option<String>,
  },
  Topic,
  Competitor,
}

impl MemberAttributes {
  pub fn dimension(&self) -> Dimension {
    match self {
      Self::Time { .. } => Dimension::Time,
      Self::Sensor { .. } => Dimension::Sensor,
      Self::Tweet { .. } => Dimension::Tweet,
      Self::Topic => Dimension::Topic,
      Self::Competitor => Dimension::Competitor,
    }
  }
}

/// A member as seen in a source batch, before it has a surrogate key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionMember {
  pub natural_key: NaturalKey,
  pub attributes:  MemberAttributes,
}

impl DimensionMember {
  pub fn dimension(&self) -> Dimension { self.attributes.dimension() }
}

/// A member allocated in this run and not yet written to the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMember {
  pub surrogate_key: SurrogateKey,
  pub member:        DimensionMember,
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Outcome of registering one batch of members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registration {
  /// Members that received a fresh surrogate key.
  pub created:      usize,
  /// Members whose natural key was already mapped.
  pub known:        usize,
  /// Repeats of a natural key within the batch.
  pub deduplicated: usize,
}

/// The natural → surrogate mapping of one dimension for the current run.
#[derive(Debug, Clone)]
pub struct DimensionSnapshot {
  dimension:     Dimension,
  committed:     HashMap<NaturalKey, SurrogateKey>,
  pending:       Vec<NewMember>,
  pending_index: HashMap<NaturalKey, SurrogateKey>,
  next_key:      i64,
}

impl DimensionSnapshot {
  /// An empty dimension; the first allocated key is 1.
  pub fn empty(dimension: Dimension) -> Self {
    Self::from_existing(dimension, Vec::new())
  }

  /// Build a snapshot from the pairs already persisted in the warehouse.
  pub fn from_existing(
    dimension: Dimension,
    pairs: impl IntoIterator<Item = (NaturalKey, SurrogateKey)>,
  ) -> Self {
    let committed: HashMap<_, _> = pairs.into_iter().collect();
    let next_key = committed.values().map(|k| k.0).max().unwrap_or(0) + 1;
    Self {
      dimension,
      committed,
      pending: Vec::new(),
      pending_index: HashMap::new(),
      next_key,
    }
  }

  pub fn dimension(&self) -> Dimension { self.dimension }

  /// Committed members only.
  pub fn get(&self, natural_key: &NaturalKey) -> Option<SurrogateKey> {
    self.committed.get(natural_key).copied()
  }

  /// Committed or pending members.
  pub fn lookup(&self, natural_key: &NaturalKey) -> Option<SurrogateKey> {
    self
      .get(natural_key)
      .or_else(|| self.pending_index.get(natural_key).copied())
  }

  pub fn len(&self) -> usize { self.committed.len() }

  pub fn is_empty(&self) -> bool { self.committed.is_empty() }

  /// The committed natural → surrogate pairs.
  pub fn committed(&self) -> &HashMap<NaturalKey, SurrogateKey> {
    &self.committed
  }

  /// Members allocated since the last commit or rollback.
  pub fn pending(&self) -> &[NewMember] { &self.pending }

  /// Return the surrogate key for `member`, allocating one if its natural key
  /// has not been seen. The `bool` is `true` when a key was allocated.
  ///
  /// Panics in debug builds if `member` belongs to another dimension.
  pub fn resolve_or_create(
    &mut self,
    member: DimensionMember,
  ) -> (SurrogateKey, bool) {
    debug_assert_eq!(member.dimension(), self.dimension);
    if let Some(key) = self.lookup(&member.natural_key) {
      return (key, false);
    }
    let key = SurrogateKey(self.next_key);
    self.next_key += 1;
    self.pending_index.insert(member.natural_key.clone(), key);
    self.pending.push(NewMember { surrogate_key: key, member });
    (key, true)
  }

  /// Register a whole batch: repeats collapse to their last sighting, known
  /// natural keys keep their key, and the rest are allocated in input order.
  pub fn register(&mut self, members: Vec<DimensionMember>) -> Registration {
    let split = partition_by(
      members,
      |m| m.natural_key.clone(),
      |k| self.lookup(k).is_some(),
    );

    let created = split.new.len();
    for member in split.new {
      self.resolve_or_create(member);
    }

    Registration {
      created,
      known: split.known.len(),
      deduplicated: split.deduplicated,
    }
  }

  /// Promote pending members after the warehouse has persisted them.
  pub fn commit(&mut self) {
    for new in self.pending.drain(..) {
      self.committed.insert(new.member.natural_key, new.surrogate_key);
    }
    self.pending_index.clear();
  }

  /// Discard pending members after a failed write. Their keys were never
  /// visible outside this snapshot and are handed out again.
  pub fn rollback(&mut self) {
    self.pending.clear();
    self.pending_index.clear();
    self.next_key =
      self.committed.values().map(|k| k.0).max().unwrap_or(0) + 1;
  }
}

// ─── Lookup seam ─────────────────────────────────────────────────────────────

/// Read access to committed dimension keys, used by the fact merge engine.
pub trait KeyLookup {
  fn surrogate(
    &self,
    dimension: Dimension,
    natural_key: &NaturalKey,
  ) -> Option<SurrogateKey>;
}

/// A point-in-time copy of the committed members of several dimensions.
#[derive(Debug, Clone, Default)]
pub struct RegistryView {
  maps: HashMap<Dimension, HashMap<NaturalKey, SurrogateKey>>,
}

impl RegistryView {
  pub fn new() -> Self { Self::default() }

  /// Copy the committed members of `snapshot` into the view.
  pub fn include(&mut self, snapshot: &DimensionSnapshot) {
    self
      .maps
      .insert(snapshot.dimension(), snapshot.committed().clone());
  }
}

impl KeyLookup for RegistryView {
  fn surrogate(
    &self,
    dimension: Dimension,
    natural_key: &NaturalKey,
  ) -> Option<SurrogateKey> {
    self.maps.get(&dimension)?.get(natural_key).copied()
  }
}

impl KeyLookup for DimensionSnapshot {
  fn surrogate(
    &self,
    dimension: Dimension,
    natural_key: &NaturalKey,
  ) -> Option<SurrogateKey> {
    (dimension == self.dimension)
      .then(|| self.get(natural_key))
      .flatten()
  }
}
