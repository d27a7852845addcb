//! The relationship index engine.
//!
//! [`RelationIndex`] owns a primary map (record id → record) and one inverted
//! map per secondary index (key → record ids). Every mutation updates the
//! primary map and each affected index together, so that a record's keys and
//! the index entries pointing at it always agree.
//!
//! Two modes share the engine:
//!
//! - **multi-record** ([`RelationIndex::insert`] / [`RelationIndex::remove_record`]):
//!   records are immutable and keyed by id; many may share a key.
//! - **single-record-per-subject** (records implementing [`ValueSet`]): one
//!   record per subject whose value set is edited in place by
//!   [`RelationIndex::upsert`], with the value index maintained by set
//!   difference.
//!
//! Lookups of missing ids or subjects are not errors; they report a status
//! (`None`, `false`, `0`, or an empty [`Upsert`]).

use std::{
  collections::{BTreeSet, HashMap, HashSet},
  fmt,
  hash::Hash,
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use crate::record::{RecordId, SubjectKey};

type KeyMap = HashMap<String, HashSet<RecordId>>;

// ─── Record contracts ────────────────────────────────────────────────────────

/// A record shape the engine can index.
pub trait Indexed: Clone {
  /// Names of the secondary indexes.
  type Index: Copy + Eq + Hash + fmt::Debug + fmt::Display + 'static;

  /// Every secondary index maintained for this record type.
  const INDEXES: &'static [Self::Index];
  /// Indexes in which a key may be held by at most one record.
  const UNIQUE: &'static [Self::Index];

  fn id(&self) -> RecordId;

  fn timestamp(&self) -> DateTime<Utc>;

  /// The keys this record contributes to `index`.
  fn index_keys(&self, index: Self::Index) -> Vec<String>;

  /// Structural check applied on rebuild. `Err` carries a human-readable
  /// reason and causes the record to be skipped.
  fn validate(&self) -> Result<(), String>;
}

/// A record whose relation values form a set owned by a single subject.
///
/// `index_keys(VALUE_INDEX)` must equal `values()`, and
/// `index_keys(SUBJECT_INDEX)` must be the subject key alone.
pub trait ValueSet: Indexed {
  const SUBJECT_INDEX: Self::Index;
  const VALUE_INDEX: Self::Index;

  fn create(subject: SubjectKey, values: BTreeSet<String>, actor: &str) -> Self;

  fn subject_key(&self) -> &SubjectKey;

  fn values(&self) -> &BTreeSet<String>;

  fn values_mut(&mut self) -> &mut BTreeSet<String>;

  fn actor(&self) -> &str;

  /// Record who changed the value set, and when.
  fn touch(&mut self, actor: &str);
}

// ─── Results ─────────────────────────────────────────────────────────────────

/// Why a record could not be indexed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Conflict {
  #[error("record {0} is already indexed")]
  DuplicateId(RecordId),

  #[error("{index} key {key:?} is already held by record {existing}")]
  UniqueKey {
    index:    String,
    key:      String,
    existing: RecordId,
  },
}

/// Outcome of [`RelationIndex::rebuild_from`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
  pub indexed: usize,
  pub skipped: usize,
}

/// Outcome of a value-set mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Upsert {
  /// The subject's record after the mutation; `None` when the resulting set
  /// is empty (record deleted, or never created).
  pub record_id: Option<RecordId>,
  pub added:     BTreeSet<String>,
  pub removed:   BTreeSet<String>,
}

impl Upsert {
  pub fn is_change(&self) -> bool { !self.added.is_empty() || !self.removed.is_empty() }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// In-memory primary store plus inverted indexes over records of type `R`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationIndex<R: Indexed> {
  records: HashMap<RecordId, R>,
  indexes: HashMap<R::Index, KeyMap>,
}

impl<R: Indexed> Default for RelationIndex<R> {
  fn default() -> Self { Self::new() }
}

impl<R: Indexed> RelationIndex<R> {
  pub fn new() -> Self {
    Self {
      records: HashMap::new(),
      indexes: R::INDEXES.iter().map(|&index| (index, KeyMap::new())).collect(),
    }
  }

  pub fn clear(&mut self) { *self = Self::new(); }

  pub fn len(&self) -> usize { self.records.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() }

  pub fn get(&self, id: RecordId) -> Option<&R> { self.records.get(&id) }

  /// Clear everything and index `records` from scratch.
  ///
  /// Records that fail [`Indexed::validate`], repeat an id, or collide on a
  /// unique index are skipped with a warning. Calling this twice with the
  /// same input yields the same state.
  pub fn rebuild_from(&mut self, records: impl IntoIterator<Item = R>) -> RebuildReport {
    self.clear();
    let mut report = RebuildReport::default();

    for (position, record) in records.into_iter().enumerate() {
      if let Err(reason) = record.validate() {
        warn!(position, %reason, "skipping malformed record");
        report.skipped += 1;
        continue;
      }
      if let Some(conflict) = self.conflict(&record) {
        warn!(position, %conflict, "skipping conflicting record");
        report.skipped += 1;
        continue;
      }
      self.attach(record);
      report.indexed += 1;
    }

    report
  }

  /// Index a freshly built record in the primary map and every secondary
  /// index. Nothing is mutated when the record conflicts.
  pub fn insert(&mut self, record: R) -> Result<RecordId, Conflict> {
    if let Some(conflict) = self.conflict(&record) {
      return Err(conflict);
    }
    Ok(self.attach(record))
  }

  /// Delete one record and scrub it from every index. `None` if absent.
  pub fn remove_record(&mut self, id: RecordId) -> Option<R> {
    let record = self.records.remove(&id)?;
    for &index in R::INDEXES {
      if let Some(keys) = self.indexes.get_mut(&index) {
        for key in record.index_keys(index) {
          detach(keys, &key, id);
        }
      }
    }
    Some(record)
  }

  /// Full records reachable through `index` under `key`, oldest first.
  pub fn query(&self, index: R::Index, key: &str) -> Vec<R> {
    let mut found: Vec<R> = self
      .index_set(index, key)
      .into_iter()
      .flatten()
      .filter_map(|id| self.records.get(id))
      .cloned()
      .collect();
    sort_records(&mut found);
    found
  }

  /// A copy of the id set under `key`, safe to iterate while mutating.
  pub fn ids_for(&self, index: R::Index, key: &str) -> Vec<RecordId> {
    let mut ids: Vec<RecordId> =
      self.index_set(index, key).into_iter().flatten().copied().collect();
    ids.sort();
    ids
  }

  pub fn key_count(&self, index: R::Index, key: &str) -> usize {
    self.index_set(index, key).map_or(0, HashSet::len)
  }

  /// Every key currently present in `index`, sorted.
  pub fn keys(&self, index: R::Index) -> Vec<String> {
    let mut keys: Vec<String> = self
      .indexes
      .get(&index)
      .map(|keys| keys.keys().cloned().collect())
      .unwrap_or_default();
    keys.sort();
    keys
  }

  /// All records, ordered by `(timestamp, id)`. This is what gets saved.
  pub fn records(&self) -> Vec<R> {
    let mut all: Vec<R> = self.records.values().cloned().collect();
    sort_records(&mut all);
    all
  }

  /// Check that every record's keys are indexed and every index entry points
  /// at an existing record that holds that key.
  pub fn is_consistent(&self) -> bool {
    let forward = self.records.values().all(|record| {
      R::INDEXES.iter().all(|&index| {
        record.index_keys(index).iter().all(|key| {
          self.index_set(index, key).is_some_and(|ids| ids.contains(&record.id()))
        })
      })
    });

    let inverted = self.indexes.iter().all(|(&index, keys)| {
      keys.iter().all(|(key, ids)| {
        !ids.is_empty()
          && ids.iter().all(|id| {
            self
              .records
              .get(id)
              .is_some_and(|record| record.index_keys(index).contains(key))
          })
      })
    });

    forward && inverted
  }

  fn index_set(&self, index: R::Index, key: &str) -> Option<&HashSet<RecordId>> {
    self.indexes.get(&index).and_then(|keys| keys.get(key))
  }

  fn conflict(&self, record: &R) -> Option<Conflict> {
    if self.records.contains_key(&record.id()) {
      return Some(Conflict::DuplicateId(record.id()));
    }
    for &index in R::UNIQUE {
      for key in record.index_keys(index) {
        if let Some(&existing) = self.index_set(index, &key).and_then(|ids| ids.iter().next()) {
          return Some(Conflict::UniqueKey {
            index: index.to_string(),
            key,
            existing,
          });
        }
      }
    }
    None
  }

  fn attach(&mut self, record: R) -> RecordId {
    let id = record.id();
    for &index in R::INDEXES {
      let keys = self.indexes.entry(index).or_default();
      for key in record.index_keys(index) {
        keys.entry(key).or_default().insert(id);
      }
    }
    self.records.insert(id, record);
    id
  }
}

// ─── Single-record-per-subject mode ──────────────────────────────────────────

impl<R: ValueSet> RelationIndex<R> {
  pub fn record_for(&self, subject: &SubjectKey) -> Option<&R> {
    self.subject_record_id(subject).and_then(|id| self.records.get(&id))
  }

  /// Replace the subject's value set with `values`.
  ///
  /// Only the difference between the old and new sets touches the value
  /// index. An empty `values` deletes the record.
  pub fn upsert(
    &mut self,
    subject: &SubjectKey,
    values: BTreeSet<String>,
    actor: &str,
  ) -> Upsert {
    let Some(id) = self.subject_record_id(subject) else {
      if values.is_empty() {
        return Upsert::default();
      }
      let record = R::create(subject.clone(), values.clone(), actor);
      let id = self.attach(record);
      return Upsert { record_id: Some(id), added: values, removed: BTreeSet::new() };
    };

    let current = match self.records.get(&id) {
      Some(record) => record.values().clone(),
      None => BTreeSet::new(),
    };
    let added: BTreeSet<String> = values.difference(&current).cloned().collect();
    let removed: BTreeSet<String> = current.difference(&values).cloned().collect();

    if values.is_empty() {
      self.remove_record(id);
      return Upsert { record_id: None, added, removed };
    }

    if !added.is_empty() || !removed.is_empty() {
      if let Some(keys) = self.indexes.get_mut(&R::VALUE_INDEX) {
        for value in &removed {
          detach(keys, value, id);
        }
      }
      let keys = self.indexes.entry(R::VALUE_INDEX).or_default();
      for value in &added {
        keys.entry(value.clone()).or_default().insert(id);
      }
      if let Some(record) = self.records.get_mut(&id) {
        *record.values_mut() = values;
        record.touch(actor);
      }
    }

    Upsert { record_id: Some(id), added, removed }
  }

  /// Remove `values` from the subject's set, deleting the record if nothing
  /// is left. No-op for an unknown subject.
  pub fn remove_values(&mut self, subject: &SubjectKey, values: &BTreeSet<String>) -> Upsert {
    let Some(record) = self.record_for(subject) else {
      return Upsert::default();
    };
    let remaining: BTreeSet<String> = record.values().difference(values).cloned().collect();
    let actor = record.actor().to_owned();
    self.upsert(subject, remaining, &actor)
  }

  /// Remove `value` from every subject carrying it. Affected subjects are
  /// found through the value index. Returns how many subjects changed.
  pub fn cascade_delete_by_value(&mut self, value: &str) -> usize {
    let mut affected = 0;
    for id in self.ids_for(R::VALUE_INDEX, value) {
      let Some(record) = self.records.get(&id) else { continue };
      let subject = record.subject_key().clone();
      let mut remaining = record.values().clone();
      remaining.remove(value);
      let actor = record.actor().to_owned();
      if self.upsert(&subject, remaining, &actor).is_change() {
        affected += 1;
      }
    }
    affected
  }

  /// Drop the subject's record entirely.
  pub fn remove_subject(&mut self, subject: &SubjectKey) -> Option<R> {
    let id = self.subject_record_id(subject)?;
    self.remove_record(id)
  }

  /// Subjects holding `value`, sorted.
  pub fn subjects_with(&self, value: &str) -> Vec<SubjectKey> {
    let mut subjects: Vec<SubjectKey> = self
      .index_set(R::VALUE_INDEX, value)
      .into_iter()
      .flatten()
      .filter_map(|id| self.records.get(id))
      .map(|record| record.subject_key().clone())
      .collect();
    subjects.sort();
    subjects
  }

  fn subject_record_id(&self, subject: &SubjectKey) -> Option<RecordId> {
    self
      .index_set(R::SUBJECT_INDEX, subject.as_str())
      .and_then(|ids| ids.iter().next().copied())
  }
}

fn detach(keys: &mut KeyMap, key: &str, id: RecordId) {
  if let Some(ids) = keys.get_mut(key) {
    ids.remove(&id);
    if ids.is_empty() {
      keys.remove(key);
    }
  }
}

fn sort_records<R: Indexed>(records: &mut [R]) {
  records.sort_by(|a, b| a.timestamp().cmp(&b.timestamp()).then_with(|| a.id().cmp(&b.id())));
}
