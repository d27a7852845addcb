//! [`LinkStore`] — conversation sessions attached to content.
//!
//! Each [`LinkRecord`] ties a session to one piece of content and remembers
//! the message that created the link. Records are indexed by session, by
//! content, and by message. A message originates at most one link: adding a
//! second link for the same message is rejected with
//! [`Error::MessageAlreadyLinked`]; remove the old link first to re-point it.

use std::{collections::BTreeSet, sync::Arc};

use tracing::debug;

use crate::{
  Error, InitReport, Result,
  document::DocumentStore,
  error::require_key,
  index::Conflict,
  observe::{Snapshot, StoreStatus, Subscription},
  record::{LinkIndex, LinkRecord, NewLink, RecordId, SessionId, content_index_key},
  repository::Repository,
};

/// Default document name for the session link store.
pub const DEFAULT_DOCUMENT: &str = "session-links.json";

pub struct LinkStore<D> {
  repo: Repository<LinkRecord, D>,
}

impl<D: DocumentStore> LinkStore<D> {
  pub fn new(store: Arc<D>, document: impl Into<String>) -> Self {
    Self { repo: Repository::new(store, document) }
  }

  /// Load the document and build the indexes. Never fails: a document that
  /// cannot be loaded yields an empty, degraded store.
  pub async fn init(&mut self) -> InitReport { self.repo.init().await }

  pub fn dispose(&mut self) { self.repo.dispose(); }

  /// Discard every record and replace the document with an empty one.
  /// Clears read-only mode after an unreadable document.
  pub async fn reset(&mut self) -> Result<()> { self.repo.reset().await }

  pub fn status(&self) -> StoreStatus { self.repo.status() }

  pub fn subscribe(
    &self,
    callback: impl Fn(&Snapshot<LinkRecord>) + Send + Sync + 'static,
  ) -> Subscription {
    self.repo.subscribe(callback)
  }

  // ── Mutations ─────────────────────────────────────────────────────────

  pub async fn add_link(&mut self, input: NewLink) -> Result<LinkRecord> {
    self.repo.ensure_writable()?;
    require_key("session id", &input.session_id)?;
    require_key("message id", &input.message_id)?;
    require_key("content type", &input.content_type)?;
    require_key("content id", &input.content_id)?;
    require_key("actor", &input.actor)?;

    let record = LinkRecord::from_new(input);
    self
      .repo
      .index_mut()
      .insert(record.clone())
      .map_err(|conflict| match conflict {
        Conflict::UniqueKey { .. } => Error::MessageAlreadyLinked(record.message_id.clone()),
        other => Error::InvalidInput(other.to_string()),
      })?;

    debug!(
      link = %record.id,
      session = %record.session_id,
      content = %record.content_key(),
      "added link"
    );
    self.repo.commit().await?;
    Ok(record)
  }

  /// Remove one link. `Ok(None)` if it did not exist.
  pub async fn remove_link(&mut self, id: RecordId) -> Result<Option<LinkRecord>> {
    self.repo.ensure_writable()?;
    let removed = self.repo.index_mut().remove_record(id);
    if removed.is_some() {
      self.repo.commit().await?;
    }
    Ok(removed)
  }

  /// Remove the link a message created, if any.
  pub async fn remove_links_for_message(&mut self, message_id: &str) -> Result<usize> {
    self.remove_all(LinkIndex::Message, message_id).await
  }

  /// Remove every link of a session (e.g. when the session is deleted).
  pub async fn remove_links_for_session(&mut self, session_id: &str) -> Result<usize> {
    self.remove_all(LinkIndex::Session, session_id).await
  }

  /// Remove every link pointing at a piece of content.
  pub async fn remove_links_for_content(
    &mut self,
    content_type: &str,
    content_id: &str,
  ) -> Result<usize> {
    let key = content_index_key(content_type, content_id);
    self.remove_all(LinkIndex::Content, &key).await
  }

  async fn remove_all(&mut self, index: LinkIndex, key: &str) -> Result<usize> {
    self.repo.ensure_writable()?;
    require_key(&format!("{index} key"), key)?;

    // `ids_for` hands back a copy; removal mutates the set being read.
    let ids = self.repo.index().ids_for(index, key);
    let mut removed = 0;
    for id in ids {
      if self.repo.index_mut().remove_record(id).is_some() {
        removed += 1;
      }
    }

    if removed > 0 {
      debug!(%index, key, removed, "removed links");
      self.repo.commit().await?;
    }
    Ok(removed)
  }

  // ── Queries ───────────────────────────────────────────────────────────

  pub fn links_for_session(&self, session_id: &str) -> Vec<LinkRecord> {
    self.repo.index().query(LinkIndex::Session, session_id)
  }

  pub fn links_for_content(&self, content_type: &str, content_id: &str) -> Vec<LinkRecord> {
    self.repo.index().query(LinkIndex::Content, &content_index_key(content_type, content_id))
  }

  /// Distinct sessions linked to a piece of content.
  pub fn sessions_for_content(&self, content_type: &str, content_id: &str) -> BTreeSet<SessionId> {
    self
      .links_for_content(content_type, content_id)
      .into_iter()
      .map(|link| link.session_id)
      .collect()
  }

  pub fn link_for_message(&self, message_id: &str) -> Option<LinkRecord> {
    self.repo.index().query(LinkIndex::Message, message_id).into_iter().next()
  }

  pub fn get(&self, id: RecordId) -> Option<LinkRecord> { self.repo.index().get(id).cloned() }

  /// Sessions with at least one link, sorted.
  pub fn session_ids(&self) -> Vec<SessionId> { self.repo.index().keys(LinkIndex::Session) }

  pub fn records(&self) -> Vec<LinkRecord> { self.repo.index().records() }

  pub fn len(&self) -> usize { self.repo.index().len() }

  pub fn is_empty(&self) -> bool { self.repo.index().is_empty() }

  pub fn is_consistent(&self) -> bool { self.repo.index().is_consistent() }
}
