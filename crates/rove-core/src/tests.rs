//! Store-level tests for `TagStore` and `LinkStore` over an in-memory
//! document store.

use std::{
  collections::BTreeSet,
  sync::{Arc, Mutex},
};

use serde_json::json;

use crate::{
  Error,
  document::{DocumentStore, MemoryDocumentStore},
  links::{self, LinkStore},
  observe::Snapshot,
  persist::Document,
  record::{LinkRecord, NewLink, SubjectKey, TagRecord},
  tags::{self, TagStore},
};

type Docs = Arc<MemoryDocumentStore>;

fn docs() -> Docs { Arc::new(MemoryDocumentStore::new()) }

fn key(s: &str) -> SubjectKey { SubjectKey::from(s) }

fn tags_of(values: &[&str]) -> BTreeSet<String> {
  values.iter().map(|v| (*v).to_owned()).collect()
}

async fn tag_store(docs: &Docs) -> TagStore<MemoryDocumentStore> {
  let mut store = TagStore::new(Arc::clone(docs), tags::DEFAULT_DOCUMENT);
  store.init().await;
  store
}

async fn link_store(docs: &Docs) -> LinkStore<MemoryDocumentStore> {
  let mut store = LinkStore::new(Arc::clone(docs), links::DEFAULT_DOCUMENT);
  store.init().await;
  store
}

fn saved_tags(docs: &Docs) -> Document<TagRecord> {
  let raw = docs.raw(tags::DEFAULT_DOCUMENT).expect("tag document exists");
  serde_json::from_slice(&raw).expect("valid tag document")
}

// ─── Tag store ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn reassigning_tags_moves_subject_between_tags() {
  let docs = docs();
  let mut store = tag_store(&docs).await;

  store.assign(&key("post:1"), ["beach", "food"], "ana").await.unwrap();
  assert_eq!(store.tags_for(&key("post:1")), tags_of(&["beach", "food"]));
  assert_eq!(store.subjects_for("beach"), vec![key("post:1")]);

  store.assign(&key("post:1"), ["food"], "ana").await.unwrap();
  assert!(store.subjects_for("beach").is_empty());
  assert_eq!(store.subjects_for("food"), vec![key("post:1")]);
  assert_eq!(store.len(), 1);
  assert!(store.is_consistent());
}

#[tokio::test]
async fn assign_batch_saves_once() {
  let docs = docs();
  let mut store = tag_store(&docs).await;
  let before = docs.save_count();

  let subjects = [key("post:1"), key("post:2"), key("photo:a")];
  let changes = store.assign_batch(&subjects, ["sunset", "hike"], "ben").await.unwrap();

  assert_eq!(changes.len(), 3);
  assert_eq!(docs.save_count() - before, 1);
  for subject in &subjects {
    assert_eq!(store.tags_for(subject), tags_of(&["hike", "sunset"]));
  }
  assert_eq!(saved_tags(&docs).records.len(), 3);
  assert!(store.is_consistent());
}

#[tokio::test]
async fn unchanged_assignment_does_not_save() {
  let docs = docs();
  let mut store = tag_store(&docs).await;
  store.assign(&key("post:1"), ["beach"], "ana").await.unwrap();
  let before = docs.save_count();

  let change = store.assign(&key("post:1"), ["beach"], "ana").await.unwrap();
  assert!(!change.is_change());
  store.remove_tags(&key("post:9"), ["beach"]).await.unwrap();
  assert_eq!(store.delete_tag_cascade("unused").await.unwrap(), 0);

  assert_eq!(docs.save_count(), before);
}

#[tokio::test]
async fn add_and_remove_tags() {
  let docs = docs();
  let mut store = tag_store(&docs).await;

  store.add_tags(&key("post:1"), ["beach"], "ana").await.unwrap();
  store.add_tags(&key("post:1"), ["food"], "ben").await.unwrap();
  assert_eq!(store.tags_for(&key("post:1")), tags_of(&["beach", "food"]));
  assert_eq!(store.record_for(&key("post:1")).unwrap().actor, "ben");

  store.remove_tags(&key("post:1"), ["beach"]).await.unwrap();
  assert_eq!(store.tags_for(&key("post:1")), tags_of(&["food"]));

  let last = store.remove_tags(&key("post:1"), ["food"]).await.unwrap();
  assert_eq!(last.record_id, None);
  assert!(store.record_for(&key("post:1")).is_none());
  assert!(store.subjects_for("food").is_empty());
  assert!(saved_tags(&docs).records.is_empty());
}

#[tokio::test]
async fn delete_tag_cascade_clears_every_subject() {
  let docs = docs();
  let mut store = tag_store(&docs).await;
  store.assign(&key("post:1"), ["beach", "food"], "ana").await.unwrap();
  store.assign(&key("post:2"), ["beach"], "ana").await.unwrap();
  store.assign(&key("post:3"), ["food"], "ana").await.unwrap();
  let before = docs.save_count();

  assert_eq!(store.delete_tag_cascade("beach").await.unwrap(), 2);

  assert_eq!(docs.save_count() - before, 1);
  assert!(store.subjects_for("beach").is_empty());
  assert!(store.records().iter().all(|r| !r.tag_ids.contains("beach")));
  assert!(store.record_for(&key("post:2")).is_none());
  assert_eq!(store.tag_counts().get("food"), Some(&2));
  assert!(store.is_consistent());
}

#[tokio::test]
async fn remove_subject_drops_its_record() {
  let docs = docs();
  let mut store = tag_store(&docs).await;
  store.assign(&key("photo:a"), ["night"], "ana").await.unwrap();

  let removed = store.remove_subject(&key("photo:a")).await.unwrap();
  assert_eq!(removed.map(|r| r.subject_key), Some(key("photo:a")));
  assert!(store.subjects_for("night").is_empty());
  assert_eq!(store.remove_subject(&key("photo:a")).await.unwrap(), None);
}

#[tokio::test]
async fn tag_counts_reflect_inverted_index() {
  let docs = docs();
  let mut store = tag_store(&docs).await;
  store.assign(&key("post:1"), ["beach", "food"], "ana").await.unwrap();
  store.assign(&key("post:2"), ["beach"], "ana").await.unwrap();

  let counts = store.tag_counts();
  assert_eq!(counts.get("beach"), Some(&2));
  assert_eq!(counts.get("food"), Some(&1));
  assert_eq!(counts.len(), 2);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_mutation() {
  let docs = docs();
  let mut store = tag_store(&docs).await;
  store.assign(&key("post:1"), ["beach"], "ana").await.unwrap();
  let before = docs.save_count();

  let err = store.assign(&key(""), ["beach"], "ana").await.unwrap_err();
  assert!(matches!(err, Error::InvalidInput(_)));

  let err = store.assign(&key("post:1"), ["food", " "], "ana").await.unwrap_err();
  assert!(matches!(err, Error::InvalidInput(_)));

  let err = store
    .assign_batch(&[key("post:2"), key("")], ["food"], "ana")
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidInput(_)));

  let err = store.assign(&key("post:1"), ["food"], "").await.unwrap_err();
  assert!(matches!(err, Error::InvalidInput(_)));

  assert_eq!(store.tags_for(&key("post:1")), tags_of(&["beach"]));
  assert!(store.record_for(&key("post:2")).is_none());
  assert_eq!(docs.save_count(), before);
}

#[tokio::test]
async fn tags_survive_reload() {
  let docs = docs();
  let mut store = tag_store(&docs).await;
  store.assign(&key("post:1"), ["beach", "food"], "ana").await.unwrap();
  store.assign(&key("post:2"), ["food"], "ben").await.unwrap();
  let expected = store.records();

  let reloaded = tag_store(&docs).await;
  assert_eq!(reloaded.records(), expected);
  assert_eq!(reloaded.subjects_for("food"), vec![key("post:1"), key("post:2")]);
  assert!(reloaded.is_consistent());
}

#[tokio::test]
async fn first_run_creates_empty_document() {
  let docs = docs();
  let mut store = TagStore::new(Arc::clone(&docs), tags::DEFAULT_DOCUMENT);

  let report = store.init().await;

  assert!(report.created);
  assert!(!report.degraded);
  assert!(store.is_empty());
  assert!(saved_tags(&docs).records.is_empty());
  assert_eq!(docs.list_documents().await.unwrap().len(), 1);
}

#[tokio::test]
async fn load_failure_starts_empty_and_degraded() {
  let docs = docs();
  tag_store(&docs).await.assign(&key("post:1"), ["beach"], "ana").await.unwrap();
  docs.set_fail_loads(true);

  let mut store = TagStore::new(Arc::clone(&docs), tags::DEFAULT_DOCUMENT);
  let report = store.init().await;

  assert!(report.degraded);
  assert_eq!(report.indexed, 0);
  assert!(store.is_empty());
  assert!(store.status().ready);
  assert!(store.status().degraded);
  assert!(!store.status().read_only);

  // Still usable; the first successful save ends degraded mode.
  store.assign(&key("post:2"), ["food"], "ana").await.unwrap();
  assert!(!store.status().degraded);
  assert!(store.status().last_synced_at.is_some());
}

#[tokio::test]
async fn corrupt_or_newer_documents_degrade_instead_of_failing() {
  let docs = docs();
  docs.put_raw(tags::DEFAULT_DOCUMENT, b"not json".to_vec());
  let mut store = TagStore::new(Arc::clone(&docs), tags::DEFAULT_DOCUMENT);
  let report = store.init().await;
  assert!(report.degraded);
  assert!(report.read_only);

  let newer = json!({ "version": 99, "last_modified": "2024-05-01T10:00:00Z", "records": [] });
  docs.put_raw(tags::DEFAULT_DOCUMENT, serde_json::to_vec(&newer).unwrap());
  let mut store = TagStore::new(Arc::clone(&docs), tags::DEFAULT_DOCUMENT);
  let report = store.init().await;
  assert!(report.degraded);
  assert!(report.read_only);
}

#[tokio::test]
async fn unreadable_document_is_never_overwritten() {
  let docs = docs();
  let newer = json!({
    "version": 2,
    "last_modified": "2024-05-01T10:00:00Z",
    "records": [{ "keep": "me" }],
  });
  let original = serde_json::to_vec(&newer).unwrap();
  docs.put_raw(tags::DEFAULT_DOCUMENT, original.clone());

  let mut store = tag_store(&docs).await;
  assert!(store.status().read_only);
  let before = docs.save_count();

  let err = store.assign(&key("post:1"), ["x"], "ana").await.unwrap_err();
  assert!(matches!(err, Error::ReadOnly(_)));
  let err = store.delete_tag_cascade("x").await.unwrap_err();
  assert!(matches!(err, Error::ReadOnly(_)));

  assert!(store.is_empty());
  assert_eq!(docs.save_count(), before);
  assert_eq!(docs.raw(tags::DEFAULT_DOCUMENT), Some(original));
}

#[tokio::test]
async fn reset_replaces_unreadable_document_and_allows_writes() {
  let docs = docs();
  docs.put_raw(links::DEFAULT_DOCUMENT, b"{ truncated".to_vec());
  let mut store = link_store(&docs).await;
  let err = store.add_link(new_link("S1", "M1", "photo", "P1")).await.unwrap_err();
  assert!(matches!(err, Error::ReadOnly(_)));

  store.reset().await.unwrap();
  assert!(!store.status().read_only);
  assert!(!store.status().degraded);

  store.add_link(new_link("S1", "M1", "photo", "P1")).await.unwrap();
  let reloaded = link_store(&docs).await;
  assert_eq!(reloaded.links_for_session("S1").len(), 1);
}

#[tokio::test]
async fn malformed_records_are_skipped_on_load() {
  let docs = docs();
  let document = json!({
    "version": 1,
    "last_modified": "2024-05-01T10:00:00Z",
    "records": [
      {
        "id": "6a1f8a4e-0c1b-4c59-9a0f-3d1e2b7c8d90",
        "subject_key": "post:1",
        "tag_ids": ["beach"],
        "actor": "ana",
        "timestamp": "2024-05-01T10:00:00Z"
      },
      {
        "id": "7b2f8a4e-0c1b-4c59-9a0f-3d1e2b7c8d91",
        "tag_ids": ["food"],
        "actor": "ana",
        "timestamp": "2024-05-01T10:00:00Z"
      },
      {
        "id": "8c3f8a4e-0c1b-4c59-9a0f-3d1e2b7c8d92",
        "subject_key": "post:3",
        "tag_ids": [],
        "actor": "ana",
        "timestamp": "2024-05-01T10:00:00Z"
      }
    ]
  });
  docs.put_raw(tags::DEFAULT_DOCUMENT, serde_json::to_vec(&document).unwrap());

  let mut store = TagStore::new(Arc::clone(&docs), tags::DEFAULT_DOCUMENT);
  let report = store.init().await;

  assert!(!report.degraded);
  assert_eq!(report.indexed, 1);
  assert_eq!(report.skipped, 2);
  assert_eq!(store.subjects_for("beach"), vec![key("post:1")]);
  assert!(store.is_consistent());
}

#[tokio::test]
async fn save_failure_keeps_local_state_and_marks_dirty() {
  let docs = docs();
  let mut store = tag_store(&docs).await;
  docs.set_fail_saves(true);

  let err = store.assign(&key("post:1"), ["beach"], "ana").await.unwrap_err();
  assert!(err.is_save_failure());
  assert_eq!(store.tags_for(&key("post:1")), tags_of(&["beach"]));
  assert!(store.status().dirty);

  docs.set_fail_saves(false);
  store.assign(&key("post:1"), ["beach", "food"], "ana").await.unwrap();
  assert!(!store.status().dirty);
  assert_eq!(saved_tags(&docs).records[0].tag_ids, tags_of(&["beach", "food"]));
}

#[tokio::test]
async fn mutations_require_init() {
  let docs = docs();
  let mut store = TagStore::new(Arc::clone(&docs), tags::DEFAULT_DOCUMENT);

  let err = store.assign(&key("post:1"), ["beach"], "ana").await.unwrap_err();
  assert!(matches!(err, Error::NotReady));

  store.init().await;
  store.assign(&key("post:1"), ["beach"], "ana").await.unwrap();

  store.dispose();
  assert!(store.is_empty());
  let err = store.delete_tag_cascade("beach").await.unwrap_err();
  assert!(matches!(err, Error::NotReady));
}

#[tokio::test]
async fn subscribers_see_initial_state_and_changes() {
  let docs = docs();
  let mut store = tag_store(&docs).await;
  store.assign(&key("post:1"), ["beach"], "ana").await.unwrap();

  let seen: Arc<Mutex<Vec<usize>>> = Arc::default();
  let sink = Arc::clone(&seen);
  let subscription = store.subscribe(move |snap: &Snapshot<TagRecord>| {
    sink.lock().unwrap().push(snap.records.len());
  });

  store.assign(&key("post:2"), ["food"], "ana").await.unwrap();
  store.assign(&key("post:2"), ["food"], "ana").await.unwrap();
  subscription.unsubscribe();
  store.assign(&key("post:3"), ["food"], "ana").await.unwrap();

  assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn subscribers_are_told_about_failed_saves() {
  let docs = docs();
  let mut store = tag_store(&docs).await;

  let dirty: Arc<Mutex<Vec<bool>>> = Arc::default();
  let sink = Arc::clone(&dirty);
  let _subscription = store.subscribe(move |snap: &Snapshot<TagRecord>| {
    sink.lock().unwrap().push(snap.status.dirty);
  });

  docs.set_fail_saves(true);
  assert!(store.assign(&key("post:1"), ["beach"], "ana").await.is_err());

  assert_eq!(*dirty.lock().unwrap(), vec![false, true]);
}

// ─── Link store ──────────────────────────────────────────────────────────────

fn new_link(session: &str, message: &str, content_type: &str, content_id: &str) -> NewLink {
  NewLink::new(session, message, content_type, content_id, "ana")
}

#[tokio::test]
async fn removing_by_message_clears_session_and_content() {
  let docs = docs();
  let mut store = link_store(&docs).await;

  store.add_link(new_link("S1", "M1", "photo", "P1")).await.unwrap();
  assert_eq!(store.links_for_session("S1").len(), 1);

  assert_eq!(store.remove_links_for_message("M1").await.unwrap(), 1);
  assert!(store.links_for_session("S1").is_empty());
  assert!(store.sessions_for_content("photo", "P1").is_empty());
  assert!(store.link_for_message("M1").is_none());
  assert!(store.is_consistent());
}

#[tokio::test]
async fn link_for_message_returns_that_link() {
  let docs = docs();
  let mut store = link_store(&docs).await;

  let added = store
    .add_link(new_link("S1", "M1", "post", "42").with_title("Lisbon tram"))
    .await
    .unwrap();

  let found = store.link_for_message("M1").unwrap();
  assert_eq!(found, added);
  assert_eq!(found.content_title.as_deref(), Some("Lisbon tram"));
  assert_eq!(store.get(added.id), Some(added));
}

#[tokio::test]
async fn duplicate_message_is_rejected() {
  let docs = docs();
  let mut store = link_store(&docs).await;
  let first = store.add_link(new_link("S1", "M1", "photo", "P1")).await.unwrap();
  let before = docs.save_count();

  let err = store.add_link(new_link("S2", "M1", "photo", "P2")).await.unwrap_err();

  assert!(matches!(err, Error::MessageAlreadyLinked(ref m) if m == "M1"));
  assert_eq!(store.link_for_message("M1"), Some(first));
  assert!(store.links_for_session("S2").is_empty());
  assert_eq!(store.len(), 1);
  assert_eq!(docs.save_count(), before);

  // Re-pointing a message means removing its link first.
  store.remove_links_for_message("M1").await.unwrap();
  store.add_link(new_link("S2", "M1", "photo", "P2")).await.unwrap();
  assert_eq!(store.link_for_message("M1").unwrap().session_id, "S2");
}

#[tokio::test]
async fn sessions_for_content_dedupes() {
  let docs = docs();
  let mut store = link_store(&docs).await;
  store.add_link(new_link("S1", "M1", "photo", "P1")).await.unwrap();
  store.add_link(new_link("S1", "M2", "photo", "P1")).await.unwrap();
  store.add_link(new_link("S2", "M3", "photo", "P1")).await.unwrap();
  store.add_link(new_link("S3", "M4", "post", "P1")).await.unwrap();

  assert_eq!(store.links_for_content("photo", "P1").len(), 3);
  let sessions: Vec<String> = store.sessions_for_content("photo", "P1").into_iter().collect();
  assert_eq!(sessions, vec!["S1".to_owned(), "S2".to_owned()]);
}

#[tokio::test]
async fn removing_a_session_cascades_over_all_its_links() {
  let docs = docs();
  let mut store = link_store(&docs).await;
  store.add_link(new_link("S1", "M1", "photo", "P1")).await.unwrap();
  store.add_link(new_link("S1", "M2", "photo", "P2")).await.unwrap();
  store.add_link(new_link("S1", "M3", "post", "9")).await.unwrap();
  store.add_link(new_link("S2", "M4", "photo", "P1")).await.unwrap();
  let before = docs.save_count();

  assert_eq!(store.remove_links_for_session("S1").await.unwrap(), 3);

  assert_eq!(docs.save_count() - before, 1);
  assert!(store.links_for_session("S1").is_empty());
  assert_eq!(store.session_ids(), vec!["S2".to_owned()]);
  assert!(store.link_for_message("M2").is_none());
  assert_eq!(store.sessions_for_content("photo", "P1").len(), 1);
  assert!(store.is_consistent());

  assert_eq!(store.remove_links_for_session("S1").await.unwrap(), 0);
}

#[tokio::test]
async fn removing_content_cascades_over_its_links() {
  let docs = docs();
  let mut store = link_store(&docs).await;
  store.add_link(new_link("S1", "M1", "photo", "P1")).await.unwrap();
  store.add_link(new_link("S2", "M2", "photo", "P1")).await.unwrap();
  store.add_link(new_link("S2", "M3", "photo", "P2")).await.unwrap();

  assert_eq!(store.remove_links_for_content("photo", "P1").await.unwrap(), 2);
  assert!(store.links_for_session("S1").is_empty());
  assert_eq!(store.links_for_session("S2").len(), 1);
  assert!(store.is_consistent());
}

#[tokio::test]
async fn colons_in_content_parts_do_not_alias() {
  let docs = docs();
  let mut store = link_store(&docs).await;
  store.add_link(new_link("S1", "M1", "photo", "a:b")).await.unwrap();
  store.add_link(new_link("S2", "M2", "photo:a", "b")).await.unwrap();

  let links = store.links_for_content("photo", "a:b");
  assert_eq!(links.len(), 1);
  assert_eq!(links[0].message_id, "M1");
  assert_eq!(store.sessions_for_content("photo:a", "b"), BTreeSet::from(["S2".to_owned()]));

  assert_eq!(store.remove_links_for_content("photo:a", "b").await.unwrap(), 1);
  assert_eq!(store.link_for_message("M1").unwrap().content_id, "a:b");
  assert!(store.is_consistent());
}

#[tokio::test]
async fn remove_link_by_id() {
  let docs = docs();
  let mut store = link_store(&docs).await;
  let link = store.add_link(new_link("S1", "M1", "photo", "P1")).await.unwrap();

  assert_eq!(store.remove_link(link.id).await.unwrap(), Some(link.clone()));
  assert_eq!(store.remove_link(link.id).await.unwrap(), None);
  assert!(store.is_empty());
}

#[tokio::test]
async fn links_survive_reload() {
  let docs = docs();
  let mut store = link_store(&docs).await;
  store
    .add_link(new_link("S1", "M1", "photo", "P1").with_title("Harbour at dusk"))
    .await
    .unwrap();
  store.add_link(new_link("S2", "M2", "post", "7")).await.unwrap();
  let expected: Vec<LinkRecord> = store.records();

  let reloaded = link_store(&docs).await;
  assert_eq!(reloaded.records(), expected);
  assert_eq!(reloaded.link_for_message("M2").unwrap().session_id, "S2");
  assert!(reloaded.is_consistent());
}

#[tokio::test]
async fn link_input_is_validated() {
  let docs = docs();
  let mut store = link_store(&docs).await;

  let err = store.add_link(new_link("", "M1", "photo", "P1")).await.unwrap_err();
  assert!(matches!(err, Error::InvalidInput(_)));
  let err = store.add_link(new_link("S1", "M1", "photo", "")).await.unwrap_err();
  assert!(matches!(err, Error::InvalidInput(_)));
  assert!(store.is_empty());
}

#[tokio::test]
async fn link_store_load_failure_does_not_error() {
  let docs = docs();
  docs.set_fail_loads(true);
  let mut store = LinkStore::new(Arc::clone(&docs), links::DEFAULT_DOCUMENT);

  let report = store.init().await;

  assert!(report.degraded);
  assert!(store.is_empty());
  store.add_link(new_link("S1", "M1", "photo", "P1")).await.unwrap();
  assert_eq!(store.links_for_session("S1").len(), 1);
}
