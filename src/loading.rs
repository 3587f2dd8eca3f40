//! Busy flag shared with UI collaborators.
//!
//! Counts outstanding remote fetches and publishes `true` while at least one is running.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

pub struct LoadingTracker {
  outstanding: Mutex<usize>,
  busy: watch::Sender<bool>,
}

impl LoadingTracker {
  pub fn new() -> Self {
    let (busy, _rx) = watch::channel(false);
    Self {
      outstanding: Mutex::new(0),
      busy,
    }
  }

  /// Receiver that observes every transition of the busy flag.
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.busy.subscribe()
  }

  pub fn is_loading(&self) -> bool {
    *self.busy.borrow()
  }

  pub fn outstanding(&self) -> usize {
    *self.outstanding.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Mark one fetch as started. The fetch counts as outstanding until the guard drops.
  pub fn begin(self: &Arc<Self>) -> LoadingGuard {
    self.adjust(true);
    LoadingGuard {
      tracker: Arc::clone(self),
    }
  }

  fn adjust(&self, started: bool) {
    let mut outstanding = self.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
    if started {
      *outstanding += 1;
    } else {
      *outstanding = outstanding.saturating_sub(1);
    }

    // Published under the lock so transitions can't be observed out of order
    let busy = *outstanding > 0;
    self.busy.send_if_modified(|current| {
      let changed = *current != busy;
      *current = busy;
      changed
    });
  }
}

impl Default for LoadingTracker {
  fn default() -> Self {
    Self::new()
  }
}

/// Keeps one fetch counted as outstanding while alive.
pub struct LoadingGuard {
  tracker: Arc<LoadingTracker>,
}

impl Drop for LoadingGuard {
  fn drop(&mut self) {
    self.tracker.adjust(false);
  }
}
