//! Registry of pending requests, so identical concurrent requests share one fetch.

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The task driving a shared computation ended without a value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct TaskAborted(String);

pub type SharedFuture<T> = Shared<BoxFuture<'static, Result<T, TaskAborted>>>;

type InflightMap<T> = HashMap<String, SharedFuture<T>>;

/// Pending computations keyed by request key.
///
/// Every caller attached to a key observes the same settled value. Each computation runs
/// on its own Tokio task, so it settles even when every caller stops awaiting it. The
/// entry is removed exactly once, when the task finishes, panics or is cancelled.
pub struct InFlightRegistry<T: Clone> {
  entries: Arc<Mutex<InflightMap<T>>>,
}

impl<T> InFlightRegistry<T>
where
  T: Clone + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      entries: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  fn lock(entries: &Mutex<InflightMap<T>>) -> MutexGuard<'_, InflightMap<T>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Attach to the pending future for `key`, or start one with `factory`.
  ///
  /// Returns the shared future and whether an existing one was joined. `factory` is only
  /// invoked when nothing is pending for `key`, and its future is spawned, so this must be
  /// called from within a Tokio runtime.
  pub fn get_or_create<F, Fut>(&self, key: &str, factory: F) -> (SharedFuture<T>, bool)
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T> + Send + 'static,
  {
    let mut entries = Self::lock(&self.entries);

    if let Some(existing) = entries.get(key) {
      if existing.peek().is_none() {
        return (existing.clone(), true);
      }
    }

    let future = factory();
    let release = Release {
      entries: Arc::clone(&self.entries),
      key: key.to_string(),
    };
    // The map lock is still held, so the task cannot remove its entry before it is inserted
    let task = tokio::spawn(async move {
      let _release = release;
      future.await
    });
    let shared = task
      .map(|joined| joined.map_err(|e| TaskAborted(e.to_string())))
      .boxed()
      .shared();

    entries.insert(key.to_string(), shared.clone());
    (shared, false)
  }

  pub fn contains(&self, key: &str) -> bool {
    Self::lock(&self.entries).contains_key(key)
  }

  pub fn len(&self) -> usize {
    Self::lock(&self.entries).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<T> Default for InFlightRegistry<T>
where
  T: Clone + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

/// Removes the registry entry when the task finishes or is unwound.
struct Release<T: Clone> {
  entries: Arc<Mutex<InflightMap<T>>>,
  key: String,
}

impl<T: Clone> Drop for Release<T> {
  fn drop(&mut self) {
    let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
    entries.remove(&self.key);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_callers_share_one_factory_call() {
    let registry = InFlightRegistry::<u32>::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let start = |calls: Arc<AtomicUsize>| {
      move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        7
      }
    };

    let (first, joined_first) = registry.get_or_create("k", start(calls.clone()));
    let (second, joined_second) = registry.get_or_create("k", start(calls.clone()));

    assert!(!joined_first);
    assert!(joined_second);
    assert_eq!(registry.len(), 1);

    let (a, b) = tokio::join!(first, second);
    assert_eq!((a, b), (Ok(7), Ok(7)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(registry.is_empty());
  }

  #[tokio::test]
  async fn test_settled_entry_is_removed_and_next_call_starts_fresh() {
    let registry = InFlightRegistry::<u32>::new();

    let (first, _) = registry.get_or_create("k", || async { 1 });
    assert!(registry.contains("k"));
    assert_eq!(first.await, Ok(1));
    assert!(!registry.contains("k"));

    let (second, joined) = registry.get_or_create("k", || async { 2 });
    assert!(!joined);
    assert_eq!(second.await, Ok(2));
  }

  #[tokio::test]
  async fn test_distinct_keys_do_not_share() {
    let registry = InFlightRegistry::<&'static str>::new();

    let (a, joined_a) = registry.get_or_create("a", || async { "a" });
    let (b, joined_b) = registry.get_or_create("b", || async { "b" });

    assert!(!joined_a && !joined_b);
    assert_eq!(registry.len(), 2);
    assert_eq!(tokio::join!(a, b), (Ok("a"), Ok("b")));
    assert!(registry.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_abandoned_computation_still_settles_and_releases() {
    let registry = InFlightRegistry::<u32>::new();
    let finished = Arc::new(AtomicUsize::new(0));

    let (shared, _) = registry.get_or_create("k", {
      let finished = finished.clone();
      move || async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        finished.fetch_add(1, Ordering::SeqCst);
        3
      }
    });

    // The only caller gives up before the computation settles
    assert!(tokio::time::timeout(Duration::from_millis(10), shared).await.is_err());
    assert!(registry.contains("k"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert!(registry.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_joiner_after_abandonment_gets_running_result() {
    let registry = InFlightRegistry::<u32>::new();

    let (first, _) = registry.get_or_create("k", || async {
      tokio::time::sleep(Duration::from_millis(100)).await;
      5
    });
    drop(first);

    let (second, joined) = registry.get_or_create("k", || async { 6 });
    assert!(joined);
    assert_eq!(second.await, Ok(5));
  }

  #[tokio::test]
  async fn test_panicking_computation_reports_aborted_to_all_callers() {
    let registry = InFlightRegistry::<u32>::new();

    let (first, _) = registry.get_or_create("k", || async {
      tokio::task::yield_now().await;
      panic!("boom")
    });
    let (second, joined) = registry.get_or_create("k", || async { 1 });
    assert!(joined);

    let (a, b) = tokio::join!(first, second);
    assert!(a.is_err());
    assert_eq!(a, b);
    assert!(registry.is_empty());
  }
}
