//! Publish/subscribe for store changes.
//!
//! A subscriber is called once with the current [`Snapshot`] when it
//! subscribes, and again after every mutation that changed the store.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Sync state of a store relative to its document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
  /// `init` has completed and `dispose` has not been called.
  pub ready:          bool,
  /// The document could not be loaded; the store started empty.
  pub degraded:       bool,
  /// The last save failed, so the document lags the in-memory state.
  pub dirty:          bool,
  /// The document exists but could not be decoded. Writes are refused until
  /// the store is reset.
  pub read_only:      bool,
  /// When memory and document last matched (successful load or save).
  pub last_synced_at: Option<DateTime<Utc>>,
}

/// What a subscriber sees.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot<R> {
  pub records: Vec<R>,
  pub status:  StoreStatus,
}

type Callback<R> = Arc<dyn Fn(&Snapshot<R>) + Send + Sync>;

struct Registry<R> {
  next_id:   u64,
  callbacks: Vec<(u64, Callback<R>)>,
}

/// The subscriber list of one store.
pub struct Observers<R> {
  registry: Arc<Mutex<Registry<R>>>,
}

impl<R> Default for Observers<R> {
  fn default() -> Self {
    Self {
      registry: Arc::new(Mutex::new(Registry { next_id: 0, callbacks: Vec::new() })),
    }
  }
}

impl<R: 'static> Observers<R> {
  pub fn new() -> Self { Self::default() }

  /// Register `callback` and invoke it immediately with `current`.
  pub fn subscribe(
    &self,
    callback: impl Fn(&Snapshot<R>) + Send + Sync + 'static,
    current: &Snapshot<R>,
  ) -> Subscription {
    let callback: Callback<R> = Arc::new(callback);
    let id = {
      let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
      let id = registry.next_id;
      registry.next_id += 1;
      registry.callbacks.push((id, Arc::clone(&callback)));
      id
    };

    callback(current);

    let registry: Weak<Mutex<Registry<R>>> = Arc::downgrade(&self.registry);
    Subscription {
      detach: Some(Box::new(move || {
        if let Some(registry) = registry.upgrade() {
          registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .retain(|(other, _)| *other != id);
        }
      })),
    }
  }

  /// Invoke every subscriber with `snapshot`.
  ///
  /// The list is copied first, so callbacks may unsubscribe while being
  /// notified.
  pub fn notify(&self, snapshot: &Snapshot<R>) {
    let callbacks: Vec<Callback<R>> = self
      .registry
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .callbacks
      .iter()
      .map(|(_, callback)| Arc::clone(callback))
      .collect();
    for callback in callbacks {
      callback(snapshot);
    }
  }

  pub fn len(&self) -> usize {
    self.registry.lock().unwrap_or_else(PoisonError::into_inner).callbacks.len()
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  pub fn clear(&self) {
    self.registry.lock().unwrap_or_else(PoisonError::into_inner).callbacks.clear();
  }
}

/// Handle returned by `subscribe`. Dropping it keeps the subscription alive;
/// call [`Subscription::unsubscribe`] to end it.
pub struct Subscription {
  detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
  pub fn unsubscribe(mut self) {
    if let Some(detach) = self.detach.take() {
      detach();
    }
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription").field("active", &self.detach.is_some()).finish()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  fn snapshot(records: Vec<u32>) -> Snapshot<u32> {
    Snapshot { records, status: StoreStatus::default() }
  }

  #[test]
  fn subscriber_sees_current_state_then_updates() {
    let observers = Observers::<u32>::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    let _sub = observers.subscribe(
      move |snap| sink.lock().unwrap().push(snap.records.len()),
      &snapshot(vec![1]),
    );
    observers.notify(&snapshot(vec![1, 2, 3]));

    assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
  }

  #[test]
  fn unsubscribe_stops_notifications() {
    let observers = Observers::<u32>::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let sub = observers.subscribe(
      move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
      },
      &snapshot(vec![]),
    );
    sub.unsubscribe();
    observers.notify(&snapshot(vec![7]));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(observers.is_empty());
  }

  #[test]
  fn unsubscribe_after_observers_dropped_is_harmless() {
    let observers = Observers::<u32>::new();
    let sub = observers.subscribe(|_| {}, &snapshot(vec![]));
    drop(observers);
    sub.unsubscribe();
  }
}
