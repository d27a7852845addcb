//! Persistence adapter: load and save a store's full record list as one
//! document.
//!
//! The document is always a complete snapshot. There are no deltas and no
//! log to replay: every save serialises the entire current record list and
//! overwrites the previous document in a single backend call.
//!
//! # Format
//!
//! ```json
//! { "version": 1, "last_modified": "2024-05-01T10:00:00Z", "records": [ ... ] }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{Error, Result, document::DocumentStore};

/// Newest document format this crate reads and the one it writes.
pub const FORMAT_VERSION: u32 = 1;

/// The serialised envelope around a record list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document<R> {
  pub version:       u32,
  pub last_modified: DateTime<Utc>,
  pub records:       Vec<R>,
}

/// Records read by [`Persistence::load`].
#[derive(Debug, Clone)]
pub struct Loaded<R> {
  pub records:       Vec<R>,
  /// Entries that did not deserialise and were dropped.
  pub skipped:       usize,
  /// `true` if the document was absent and an empty one was created.
  pub created:       bool,
  pub last_modified: Option<DateTime<Utc>>,
}

/// Reads and writes one named document through a [`DocumentStore`].
pub struct Persistence<D> {
  store: Arc<D>,
  name:  String,
}

impl<D: DocumentStore> Persistence<D> {
  pub fn new(store: Arc<D>, name: impl Into<String>) -> Self {
    Self { store, name: name.into() }
  }

  pub fn name(&self) -> &str { &self.name }

  /// Load the record list.
  ///
  /// An absent document is a first run: an empty document is written and an
  /// empty list returned. Backend errors are [`Error::LoadFailed`]; an
  /// envelope that does not decode or carries a newer format version is
  /// [`Error::Unreadable`]. Individual records that do not deserialise are
  /// skipped.
  pub async fn load<R>(&self) -> Result<Loaded<R>>
  where
    R: Serialize + DeserializeOwned,
  {
    let bytes = self
      .store
      .load_document(&self.name)
      .await
      .map_err(|e| self.load_failed(e))?;

    let Some(bytes) = bytes else {
      debug!(document = %self.name, "document absent; creating an empty one");
      if let Err(err) = self.save::<R>(&[]).await {
        warn!(document = %self.name, error = %err, "could not create empty document");
      }
      return Ok(Loaded {
        records:       Vec::new(),
        skipped:       0,
        created:       true,
        last_modified: None,
      });
    };

    let document: Document<serde_json::Value> =
      serde_json::from_slice(&bytes).map_err(|e| self.unreadable(e))?;

    if document.version > FORMAT_VERSION {
      return Err(self.unreadable(Error::UnsupportedVersion {
        found:     document.version,
        supported: FORMAT_VERSION,
      }));
    }

    let mut records = Vec::with_capacity(document.records.len());
    let mut skipped = 0;
    for (position, raw) in document.records.into_iter().enumerate() {
      match serde_json::from_value::<R>(raw) {
        Ok(record) => records.push(record),
        Err(e) => {
          let err = Error::MalformedRecord { position, reason: e.to_string() };
          warn!(document = %self.name, error = %err, "skipping record");
          skipped += 1;
        }
      }
    }

    debug!(
      document = %self.name,
      records = records.len(),
      skipped,
      "loaded document"
    );

    Ok(Loaded {
      records,
      skipped,
      created: false,
      last_modified: Some(document.last_modified),
    })
  }

  /// Serialise `records` in full and overwrite the document. Returns the
  /// `last_modified` stamp written.
  pub async fn save<R: Serialize>(&self, records: &[R]) -> Result<DateTime<Utc>> {
    let document = Document {
      version:       FORMAT_VERSION,
      last_modified: Utc::now(),
      records:       records.iter().collect::<Vec<&R>>(),
    };
    let bytes = serde_json::to_vec(&document)?;
    let size = bytes.len();

    self
      .store
      .save_document(&self.name, bytes)
      .await
      .map_err(|e| Error::SaveFailed {
        document: self.name.clone(),
        source:   Box::new(e),
      })?;

    debug!(document = %self.name, records = records.len(), bytes = size, "saved document");
    Ok(document.last_modified)
  }

  fn load_failed(&self, source: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::LoadFailed { document: self.name.clone(), source: Box::new(source) }
  }

  fn unreadable(&self, source: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::Unreadable { document: self.name.clone(), source: Box::new(source) }
  }
}
