//! In-memory TTL storage for fetched results.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clock::Clock;

/// A single cached value.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
  pub key: String,
  pub value: V,
  /// Unix milliseconds when the entry was stored
  pub created_at: i64,
  pub ttl_millis: i64,
}

impl<V> CacheEntry<V> {
  fn is_expired(&self, now: i64) -> bool {
    now - self.created_at > self.ttl_millis
  }
}

/// Key-addressed store with lazy expiry: an expired entry is evicted by the read that
/// finds it. There is no background sweep.
pub struct TtlCache<V> {
  entries: Mutex<HashMap<String, CacheEntry<V>>>,
  clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlCache<V> {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      clock,
    }
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
    // Nothing is left half-written while the lock is held, so a poisoned map is still usable
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Look up a live entry, evicting it if it has expired.
  pub fn get(&self, key: &str) -> Option<CacheEntry<V>> {
    let now = self.clock.now_millis();
    let mut entries = self.entries();

    match entries.get(key) {
      Some(entry) if entry.is_expired(now) => {
        tracing::debug!(key, "cache entry expired");
        entries.remove(key);
        None
      }
      Some(entry) => Some(entry.clone()),
      None => None,
    }
  }

  /// Store `value` under `key`, replacing any previous entry.
  pub fn set(&self, key: &str, value: V, ttl_millis: i64) {
    let entry = CacheEntry {
      key: key.to_string(),
      value,
      created_at: self.clock.now_millis(),
      ttl_millis,
    };
    self.entries().insert(key.to_string(), entry);
  }

  /// Remove one entry, or everything when `key` is `None`.
  pub fn clear(&self, key: Option<&str>) {
    let mut entries = self.entries();
    match key {
      Some(key) => {
        entries.remove(key);
      }
      None => entries.clear(),
    }
  }

  /// Number of stored entries, including expired ones not yet read.
  pub fn len(&self) -> usize {
    self.entries().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
