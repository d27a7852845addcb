//! Relationship records — the unit of storage in both stores.
//!
//! A record describes one relationship instance: what is annotated, what it is
//! related to, who did it, and when. Records are plain data; all indexing is
//! done by [`crate::index::RelationIndex`].

use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::index::{Indexed, ValueSet};

pub type TagId = String;
pub type SessionId = String;
pub type MessageId = String;

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Opaque record identifier. Generated once, never reused.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
  pub fn generate() -> Self { Self(Uuid::new_v4()) }

  pub fn as_uuid(&self) -> Uuid { self.0 }
}

impl From<Uuid> for RecordId {
  fn from(id: Uuid) -> Self { Self(id) }
}

impl fmt::Display for RecordId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.hyphenated().fmt(f)
  }
}

impl FromStr for RecordId {
  type Err = uuid::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> { Ok(Self(Uuid::parse_str(s)?)) }
}

/// Composite identifier of the thing being annotated, conventionally
/// `"{entity_type}:{entity_id}"` (e.g. `post:42`, `photo:abc123`).
///
/// The engine treats it as an opaque string.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SubjectKey(String);

impl SubjectKey {
  pub fn new(entity_type: &str, entity_id: &str) -> Self {
    Self(format!("{entity_type}:{entity_id}"))
  }

  pub fn as_str(&self) -> &str { &self.0 }

  pub fn entity_type(&self) -> Option<&str> {
    self.0.split_once(':').map(|(kind, _)| kind)
  }

  pub fn entity_id(&self) -> Option<&str> {
    self.0.split_once(':').map(|(_, id)| id)
  }
}

impl From<&str> for SubjectKey {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl From<String> for SubjectKey {
  fn from(s: String) -> Self { Self(s) }
}

impl fmt::Display for SubjectKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── Tag records ─────────────────────────────────────────────────────────────

/// Secondary indexes maintained over [`TagRecord`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TagIndex {
  /// subject key → its single record (unique).
  Subject,
  /// tag id → every record carrying it (the inverted index).
  Tag,
}

/// One subject's theme tags. Exactly one record exists per subject; the record
/// is edited in place when the tag set changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
  pub id:          RecordId,
  pub subject_key: SubjectKey,
  pub tag_ids:     BTreeSet<TagId>,
  pub actor:       String,
  pub timestamp:   DateTime<Utc>,
}

impl Indexed for TagRecord {
  type Index = TagIndex;

  const INDEXES: &'static [TagIndex] = &[TagIndex::Subject, TagIndex::Tag];
  const UNIQUE: &'static [TagIndex] = &[TagIndex::Subject];

  fn id(&self) -> RecordId { self.id }

  fn timestamp(&self) -> DateTime<Utc> { self.timestamp }

  fn index_keys(&self, index: TagIndex) -> Vec<String> {
    match index {
      TagIndex::Subject => vec![self.subject_key.as_str().to_owned()],
      TagIndex::Tag => self.tag_ids.iter().cloned().collect(),
    }
  }

  fn validate(&self) -> Result<(), String> {
    if self.subject_key.as_str().trim().is_empty() {
      return Err("empty subject_key".into());
    }
    if self.tag_ids.is_empty() {
      return Err(format!("record for {} has no tags", self.subject_key));
    }
    if self.tag_ids.iter().any(|t| t.trim().is_empty()) {
      return Err(format!("record for {} has a blank tag id", self.subject_key));
    }
    Ok(())
  }
}

impl ValueSet for TagRecord {
  const SUBJECT_INDEX: TagIndex = TagIndex::Subject;
  const VALUE_INDEX: TagIndex = TagIndex::Tag;

  fn create(subject: SubjectKey, values: BTreeSet<String>, actor: &str) -> Self {
    Self {
      id:          RecordId::generate(),
      subject_key: subject,
      tag_ids:     values,
      actor:       actor.to_owned(),
      timestamp:   Utc::now(),
    }
  }

  fn subject_key(&self) -> &SubjectKey { &self.subject_key }

  fn values(&self) -> &BTreeSet<String> { &self.tag_ids }

  fn values_mut(&mut self) -> &mut BTreeSet<String> { &mut self.tag_ids }

  fn actor(&self) -> &str { &self.actor }

  fn touch(&mut self, actor: &str) {
    actor.clone_into(&mut self.actor);
    self.timestamp = Utc::now();
  }
}

// ─── Link records ────────────────────────────────────────────────────────────

/// Secondary indexes maintained over [`LinkRecord`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum LinkIndex {
  Session,
  /// `"{content_type}:{content_id}"` → links pointing at that content.
  Content,
  /// message id → the single link it originated (unique).
  Message,
}

/// A conversation session attached to a piece of content, originating from
/// one message. Links are never edited: they are removed and re-created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
  pub id:            RecordId,
  pub session_id:    SessionId,
  pub message_id:    MessageId,
  pub content_type:  String,
  pub content_id:    String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content_title: Option<String>,
  pub actor:         String,
  pub timestamp:     DateTime<Utc>,
}

impl LinkRecord {
  /// Build a fresh record from caller input; assigns the id and timestamp.
  pub fn from_new(input: NewLink) -> Self {
    Self {
      id:            RecordId::generate(),
      session_id:    input.session_id,
      message_id:    input.message_id,
      content_type:  input.content_type,
      content_id:    input.content_id,
      content_title: input.content_title,
      actor:         input.actor,
      timestamp:     Utc::now(),
    }
  }

  pub fn content_key(&self) -> SubjectKey {
    SubjectKey::new(&self.content_type, &self.content_id)
  }
}

/// Key of the content index. The type is length-prefixed so that a `:` in
/// either part cannot make two different pieces of content share a key.
pub fn content_index_key(content_type: &str, content_id: &str) -> String {
  format!("{}:{content_type}:{content_id}", content_type.len())
}

impl Indexed for LinkRecord {
  type Index = LinkIndex;

  const INDEXES: &'static [LinkIndex] =
    &[LinkIndex::Session, LinkIndex::Content, LinkIndex::Message];
  const UNIQUE: &'static [LinkIndex] = &[LinkIndex::Message];

  fn id(&self) -> RecordId { self.id }

  fn timestamp(&self) -> DateTime<Utc> { self.timestamp }

  fn index_keys(&self, index: LinkIndex) -> Vec<String> {
    match index {
      LinkIndex::Session => vec![self.session_id.clone()],
      LinkIndex::Content => vec![content_index_key(&self.content_type, &self.content_id)],
      LinkIndex::Message => vec![self.message_id.clone()],
    }
  }

  fn validate(&self) -> Result<(), String> {
    for (field, value) in [
      ("session_id", &self.session_id),
      ("message_id", &self.message_id),
      ("content_type", &self.content_type),
      ("content_id", &self.content_id),
    ] {
      if value.trim().is_empty() {
        return Err(format!("empty {field}"));
      }
    }
    Ok(())
  }
}

/// Input to [`crate::links::LinkStore::add_link`]. The id and timestamp are
/// always assigned by the store.
#[derive(Debug, Clone)]
pub struct NewLink {
  pub session_id:    SessionId,
  pub message_id:    MessageId,
  pub content_type:  String,
  pub content_id:    String,
  pub content_title: Option<String>,
  pub actor:         String,
}

impl NewLink {
  /// Convenience constructor with no content title.
  pub fn new(
    session_id: impl Into<SessionId>,
    message_id: impl Into<MessageId>,
    content_type: impl Into<String>,
    content_id: impl Into<String>,
    actor: impl Into<String>,
  ) -> Self {
    Self {
      session_id:    session_id.into(),
      message_id:    message_id.into(),
      content_type:  content_type.into(),
      content_id:    content_id.into(),
      content_title: None,
      actor:         actor.into(),
    }
  }

  pub fn with_title(mut self, title: impl Into<String>) -> Self {
    self.content_title = Some(title.into());
    self
  }
}
