//! Shared plumbing behind both stores: index + persistence + observers +
//! sync status, with an explicit `init` / `dispose` lifecycle.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use tracing::{error, info, warn};

use crate::{
  Error, Result,
  document::DocumentStore,
  index::{Indexed, RelationIndex},
  observe::{Observers, Snapshot, StoreStatus, Subscription},
  persist::Persistence,
};

/// Outcome of a store's `init`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InitReport {
  /// Records indexed and ready to query.
  pub indexed:   usize,
  /// Records dropped while loading or rebuilding.
  pub skipped:   usize,
  /// The document was absent and an empty one was created.
  pub created:   bool,
  /// The document could not be loaded; the store runs empty and unsynced.
  pub degraded:  bool,
  /// The document could not be decoded; writes wait for a reset.
  pub read_only: bool,
}

pub(crate) struct Repository<R: Indexed, D> {
  index:       RelationIndex<R>,
  persistence: Persistence<D>,
  observers:   Observers<R>,
  status:      StoreStatus,
}

impl<R, D> Repository<R, D>
where
  R: Indexed + Serialize + DeserializeOwned + Send + Sync + 'static,
  D: DocumentStore,
{
  pub fn new(store: Arc<D>, document: impl Into<String>) -> Self {
    Self {
      index:       RelationIndex::new(),
      persistence: Persistence::new(store, document),
      observers:   Observers::new(),
      status:      StoreStatus::default(),
    }
  }

  pub fn document(&self) -> &str { self.persistence.name() }

  /// Load the document and rebuild every index. A load failure leaves the
  /// store empty and degraded instead of failing; an unreadable document
  /// also makes it read-only.
  pub async fn init(&mut self) -> InitReport {
    let report = match self.persistence.load::<R>().await {
      Ok(loaded) => {
        let rebuilt = self.index.rebuild_from(loaded.records);
        self.status = StoreStatus {
          ready:          true,
          degraded:       false,
          dirty:          false,
          read_only:      false,
          last_synced_at: Some(chrono::Utc::now()),
        };
        InitReport {
          indexed:   rebuilt.indexed,
          skipped:   loaded.skipped + rebuilt.skipped,
          created:   loaded.created,
          degraded:  false,
          read_only: false,
        }
      }
      Err(err) => {
        let read_only = matches!(err, Error::Unreadable { .. });
        if read_only {
          error!(document = %self.document(), error = %err, "document unreadable; writes disabled");
        } else {
          error!(document = %self.document(), error = %err, "running without persistence");
        }
        self.index.clear();
        self.status =
          StoreStatus { ready: true, degraded: true, read_only, ..StoreStatus::default() };
        InitReport { degraded: true, read_only, ..InitReport::default() }
      }
    };

    info!(
      document = %self.document(),
      indexed = report.indexed,
      skipped = report.skipped,
      degraded = report.degraded,
      read_only = report.read_only,
      "store ready"
    );
    self.observers.notify(&self.snapshot());
    report
  }

  /// Drop subscribers and in-memory state. The document is untouched.
  pub fn dispose(&mut self) {
    self.observers.clear();
    self.index.clear();
    self.status = StoreStatus::default();
  }

  /// Gate for every mutation: the store must be initialised and its
  /// document must have been readable.
  pub fn ensure_writable(&self) -> Result<()> {
    if !self.status.ready {
      return Err(Error::NotReady);
    }
    if self.status.read_only {
      return Err(Error::ReadOnly(self.document().to_owned()));
    }
    Ok(())
  }

  /// Drop every record and overwrite the document with an empty one. This is
  /// the only way out of read-only mode.
  pub async fn reset(&mut self) -> Result<()> {
    if !self.status.ready {
      return Err(Error::NotReady);
    }
    warn!(document = %self.document(), "resetting store; existing document is replaced");
    self.index.clear();
    self.status.read_only = false;
    self.commit().await
  }

  pub fn index(&self) -> &RelationIndex<R> { &self.index }

  pub fn index_mut(&mut self) -> &mut RelationIndex<R> { &mut self.index }

  pub fn status(&self) -> StoreStatus { self.status }

  pub fn snapshot(&self) -> Snapshot<R> {
    Snapshot { records: self.index.records(), status: self.status }
  }

  pub fn subscribe(
    &self,
    callback: impl Fn(&Snapshot<R>) + Send + Sync + 'static,
  ) -> Subscription {
    self.observers.subscribe(callback, &self.snapshot())
  }

  /// Save the full record list, update sync status, and notify subscribers.
  ///
  /// On failure the in-memory state is kept and the store is marked dirty.
  pub async fn commit(&mut self) -> Result<()> {
    let records = self.index.records();
    let saved = self.persistence.save(&records).await;

    match &saved {
      Ok(at) => {
        self.status.dirty = false;
        self.status.degraded = false;
        self.status.last_synced_at = Some(*at);
      }
      Err(err) => {
        error!(document = %self.document(), error = %err, "save failed; local state kept");
        self.status.dirty = true;
      }
    }

    self.observers.notify(&Snapshot { records, status: self.status });
    saved.map(|_| ())
  }
}
