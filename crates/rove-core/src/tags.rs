//! [`TagStore`] — theme tags on content.
//!
//! One [`TagRecord`] per subject; its value is the subject's full tag set.
//! Every mutating call that changes anything ends in exactly one document
//! save, including batch calls over many subjects.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::Arc,
};

use tracing::debug;

use crate::{
  InitReport, Result,
  document::DocumentStore,
  error::require_key,
  index::Upsert,
  observe::{Snapshot, StoreStatus, Subscription},
  record::{SubjectKey, TagId, TagIndex, TagRecord},
  repository::Repository,
};

/// Default document name for the theme relationship store.
pub const DEFAULT_DOCUMENT: &str = "theme-relationships.json";

pub struct TagStore<D> {
  repo: Repository<TagRecord, D>,
}

impl<D: DocumentStore> TagStore<D> {
  pub fn new(store: Arc<D>, document: impl Into<String>) -> Self {
    Self { repo: Repository::new(store, document) }
  }

  /// Load the document and build the indexes. Never fails: a document that
  /// cannot be loaded yields an empty, degraded store (see
  /// [`InitReport::degraded`]), read-only if it was read but not understood.
  pub async fn init(&mut self) -> InitReport { self.repo.init().await }

  pub fn dispose(&mut self) { self.repo.dispose(); }

  /// Discard every record and replace the document with an empty one.
  /// Clears read-only mode after an unreadable document.
  pub async fn reset(&mut self) -> Result<()> { self.repo.reset().await }

  pub fn status(&self) -> StoreStatus { self.repo.status() }

  pub fn subscribe(
    &self,
    callback: impl Fn(&Snapshot<TagRecord>) + Send + Sync + 'static,
  ) -> Subscription {
    self.repo.subscribe(callback)
  }

  // ── Mutations ─────────────────────────────────────────────────────────

  /// Replace the subject's tag set. An empty set removes the subject.
  pub async fn assign(
    &mut self,
    subject: &SubjectKey,
    tag_ids: impl IntoIterator<Item = impl Into<TagId>>,
    actor: &str,
  ) -> Result<Upsert> {
    self.repo.ensure_writable()?;
    require_key("subject key", subject.as_str())?;
    require_key("actor", actor)?;
    let tags = collect_tags(tag_ids)?;

    let change = self.repo.index_mut().upsert(subject, tags, actor);
    if change.is_change() {
      debug!(%subject, added = ?change.added, removed = ?change.removed, "assigned tags");
      self.repo.commit().await?;
    }
    Ok(change)
  }

  /// Give every subject in `subjects` the same tag set, with one save for the
  /// whole batch.
  pub async fn assign_batch(
    &mut self,
    subjects: &[SubjectKey],
    tag_ids: impl IntoIterator<Item = impl Into<TagId>>,
    actor: &str,
  ) -> Result<Vec<Upsert>> {
    self.repo.ensure_writable()?;
    for subject in subjects {
      require_key("subject key", subject.as_str())?;
    }
    require_key("actor", actor)?;
    let tags = collect_tags(tag_ids)?;

    let changes: Vec<Upsert> = subjects
      .iter()
      .map(|subject| self.repo.index_mut().upsert(subject, tags.clone(), actor))
      .collect();

    if changes.iter().any(Upsert::is_change) {
      debug!(subjects = subjects.len(), tags = ?tags, "assigned tags in batch");
      self.repo.commit().await?;
    }
    Ok(changes)
  }

  /// Add tags to the subject's existing set.
  pub async fn add_tags(
    &mut self,
    subject: &SubjectKey,
    tag_ids: impl IntoIterator<Item = impl Into<TagId>>,
    actor: &str,
  ) -> Result<Upsert> {
    self.repo.ensure_writable()?;
    require_key("subject key", subject.as_str())?;
    require_key("actor", actor)?;
    let mut tags = collect_tags(tag_ids)?;
    tags.extend(self.tags_for(subject));

    let change = self.repo.index_mut().upsert(subject, tags, actor);
    if change.is_change() {
      self.repo.commit().await?;
    }
    Ok(change)
  }

  /// Remove tags from the subject's set; the record goes away with its last
  /// tag. Unknown subjects are a no-op.
  pub async fn remove_tags(
    &mut self,
    subject: &SubjectKey,
    tag_ids: impl IntoIterator<Item = impl Into<TagId>>,
  ) -> Result<Upsert> {
    self.repo.ensure_writable()?;
    require_key("subject key", subject.as_str())?;
    let tags = collect_tags(tag_ids)?;

    let change = self.repo.index_mut().remove_values(subject, &tags);
    if change.is_change() {
      self.repo.commit().await?;
    }
    Ok(change)
  }

  /// Forget a subject entirely, e.g. when the content itself is deleted.
  pub async fn remove_subject(&mut self, subject: &SubjectKey) -> Result<Option<TagRecord>> {
    self.repo.ensure_writable()?;
    let removed = self.repo.index_mut().remove_subject(subject);
    if removed.is_some() {
      self.repo.commit().await?;
    }
    Ok(removed)
  }

  /// Remove `tag_id` from every subject, for when the theme itself is
  /// deleted. Returns the number of subjects affected.
  pub async fn delete_tag_cascade(&mut self, tag_id: &str) -> Result<usize> {
    self.repo.ensure_writable()?;
    require_key("tag id", tag_id)?;

    let affected = self.repo.index_mut().cascade_delete_by_value(tag_id);
    if affected > 0 {
      debug!(tag = tag_id, affected, "deleted tag from all subjects");
      self.repo.commit().await?;
    }
    Ok(affected)
  }

  // ── Queries ───────────────────────────────────────────────────────────

  pub fn tags_for(&self, subject: &SubjectKey) -> BTreeSet<TagId> {
    self
      .repo
      .index()
      .record_for(subject)
      .map(|record| record.tag_ids.clone())
      .unwrap_or_default()
  }

  /// Subjects carrying `tag_id`, read from the inverted index.
  pub fn subjects_for(&self, tag_id: &str) -> Vec<SubjectKey> {
    self.repo.index().subjects_with(tag_id)
  }

  pub fn record_for(&self, subject: &SubjectKey) -> Option<TagRecord> {
    self.repo.index().record_for(subject).cloned()
  }

  /// Number of subjects per tag in use.
  pub fn tag_counts(&self) -> BTreeMap<TagId, usize> {
    let index = self.repo.index();
    index
      .keys(TagIndex::Tag)
      .into_iter()
      .map(|tag| {
        let count = index.key_count(TagIndex::Tag, &tag);
        (tag, count)
      })
      .collect()
  }

  pub fn records(&self) -> Vec<TagRecord> { self.repo.index().records() }

  pub fn len(&self) -> usize { self.repo.index().len() }

  pub fn is_empty(&self) -> bool { self.repo.index().is_empty() }

  pub fn is_consistent(&self) -> bool { self.repo.index().is_consistent() }
}

fn collect_tags(tag_ids: impl IntoIterator<Item = impl Into<TagId>>) -> Result<BTreeSet<TagId>> {
  let tags: BTreeSet<TagId> = tag_ids.into_iter().map(Into::into).collect();
  for tag in &tags {
    require_key("tag id", tag)?;
  }
  Ok(tags)
}
