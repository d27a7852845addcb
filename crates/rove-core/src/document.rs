//! The `DocumentStore` trait and an in-memory implementation.
//!
//! A document store holds named, opaque blobs. Each relationship store keeps
//! its whole state in exactly one document, rewritten on every mutation.
//! Backends (e.g. `rove-store-sqlite`) implement this trait; nothing in the
//! core depends on a concrete backend.

use std::{
  collections::HashMap,
  future::Future,
  sync::{
    Mutex, PoisonError,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Summary of a stored document, as returned by
/// [`DocumentStore::list_documents`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
  pub name:       String,
  pub size:       usize,
  pub updated_at: DateTime<Utc>,
}

/// Abstraction over a named-document persistence backend.
///
/// All methods return `Send` futures so stores can be driven from
/// multi-threaded async runtimes.
pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read a document. `Ok(None)` means it does not exist.
  fn load_document<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send + 'a;

  /// Create or overwrite a document in one call.
  fn save_document<'a>(
    &'a self,
    name: &'a str,
    bytes: Vec<u8>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// List every stored document, sorted by name.
  fn list_documents(
    &self,
  ) -> impl Future<Output = Result<Vec<DocumentInfo>, Self::Error>> + Send + '_;

  /// Delete a document. Returns `false` if it did not exist.
  fn delete_document<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}

// ─── In-memory backend ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MemoryStoreError {
  #[error("document store unavailable")]
  Unavailable,
}

/// A process-local document store.
///
/// Nothing survives the process. Loads and saves can be switched to fail, and
/// saves are counted, which is what the store tests rely on.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
  documents:  Mutex<HashMap<String, (Vec<u8>, DateTime<Utc>)>>,
  fail_loads: AtomicBool,
  fail_saves: AtomicBool,
  saves:      AtomicUsize,
}

impl MemoryDocumentStore {
  pub fn new() -> Self { Self::default() }

  pub fn set_fail_loads(&self, fail: bool) { self.fail_loads.store(fail, Ordering::SeqCst); }

  pub fn set_fail_saves(&self, fail: bool) { self.fail_saves.store(fail, Ordering::SeqCst); }

  /// Number of successful `save_document` calls so far.
  pub fn save_count(&self) -> usize { self.saves.load(Ordering::SeqCst) }

  /// Raw document bytes, bypassing failure switches.
  pub fn raw(&self, name: &str) -> Option<Vec<u8>> {
    self.lock().get(name).map(|(bytes, _)| bytes.clone())
  }

  /// Write raw bytes without counting a save.
  pub fn put_raw(&self, name: &str, bytes: Vec<u8>) {
    self.lock().insert(name.to_owned(), (bytes, Utc::now()));
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Vec<u8>, DateTime<Utc>)>> {
    self.documents.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl DocumentStore for MemoryDocumentStore {
  type Error = MemoryStoreError;

  async fn load_document(&self, name: &str) -> Result<Option<Vec<u8>>, MemoryStoreError> {
    if self.fail_loads.load(Ordering::SeqCst) {
      return Err(MemoryStoreError::Unavailable);
    }
    Ok(self.raw(name))
  }

  async fn save_document(&self, name: &str, bytes: Vec<u8>) -> Result<(), MemoryStoreError> {
    if self.fail_saves.load(Ordering::SeqCst) {
      return Err(MemoryStoreError::Unavailable);
    }
    self.put_raw(name, bytes);
    self.saves.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  async fn list_documents(&self) -> Result<Vec<DocumentInfo>, MemoryStoreError> {
    let mut infos: Vec<DocumentInfo> = self
      .lock()
      .iter()
      .map(|(name, (bytes, updated_at))| DocumentInfo {
        name:       name.clone(),
        size:       bytes.len(),
        updated_at: *updated_at,
      })
      .collect();
    infos.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(infos)
  }

  async fn delete_document(&self, name: &str) -> Result<bool, MemoryStoreError> {
    Ok(self.lock().remove(name).is_some())
  }
}
