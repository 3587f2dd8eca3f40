//! Data service: the single entry point that turns a data source descriptor into a
//! response envelope.
//!
//! Remote sources go through the full pipeline:
//! 1. Cache lookup (explicit key or derived request key) - a hit returns immediately
//! 2. Join or start the in-flight fetch for the request key
//! 3. Transport attempt wrapped in timeout and retry
//! 4. Transform, cache store, envelope
//!
//! Static and computed sources are resolved synchronously and never touch the cache,
//! the in-flight registry or the loading flag.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

use crate::cache::{InFlightRegistry, TtlCache};
use crate::clock::{Clock, SystemClock};
use crate::envelope::{ResponseEnvelope, ServiceError};
use crate::loading::LoadingTracker;
use crate::retry;
use crate::source::{self, DataSourceDescriptor, RequestKey, SourceKind, ValidationResult};
use crate::transform;
use crate::transport::{Transport, TransportRequest};

/// Fetches, caches and transforms widget data.
///
/// Cloning is cheap; clones share the same cache, in-flight registry and loading flag.
#[derive(Clone)]
pub struct DataService {
  transport: Arc<dyn Transport>,
  clock: Arc<dyn Clock>,
  cache: Arc<TtlCache<Value>>,
  inflight: Arc<InFlightRegistry<ResponseEnvelope<Value>>>,
  loading: Arc<LoadingTracker>,
}

impl DataService {
  pub fn new(transport: Arc<dyn Transport>) -> Self {
    Self::with_clock(transport, Arc::new(SystemClock))
  }

  pub fn with_clock(transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
    Self {
      transport,
      cache: Arc::new(TtlCache::new(Arc::clone(&clock))),
      clock,
      inflight: Arc::new(InFlightRegistry::new()),
      loading: Arc::new(LoadingTracker::new()),
    }
  }

  /// Fetch data for `descriptor`. Never fails: every error is carried in the envelope.
  ///
  /// Concurrent remote fetches are deduplicated by request key alone, which does not
  /// include the transform. Two widgets that request the same endpoint with different
  /// transforms while a fetch is pending both receive the result shaped by the transform
  /// of whichever fetch started first. The same holds for a cache hit under a shared key.
  pub async fn fetch_data(&self, descriptor: &DataSourceDescriptor) -> ResponseEnvelope<Value> {
    let validation = source::validate(descriptor);
    if !validation.valid {
      tracing::warn!(errors = ?validation.errors, "rejecting invalid data source");
      return self.failure(ServiceError::validation(&validation.errors));
    }

    // Validation rejects unknown kinds, so anything that is not remote is local
    if descriptor.kind == SourceKind::Remote {
      self.fetch_remote(descriptor).await
    } else {
      self.resolve_local(descriptor)
    }
  }

  /// Fetch and deserialize into `T`. A payload of the wrong shape becomes a
  /// `DECODE_ERROR` envelope.
  pub async fn fetch_data_as<T: DeserializeOwned>(
    &self,
    descriptor: &DataSourceDescriptor,
  ) -> ResponseEnvelope<T> {
    self
      .fetch_data(descriptor)
      .await
      .and_then(|data| serde_json::from_value(data).map_err(ServiceError::decode))
  }

  pub fn validate_data_source(&self, descriptor: &DataSourceDescriptor) -> ValidationResult {
    source::validate(descriptor)
  }

  /// Receiver for the busy flag: `true` while at least one remote fetch is outstanding.
  pub fn loading_state(&self) -> watch::Receiver<bool> {
    self.loading.subscribe()
  }

  /// Drop one cache entry by key, or the whole cache.
  pub fn clear_cache(&self, key: Option<&str>) {
    self.cache.clear(key);
  }

  pub fn cache_size(&self) -> usize {
    self.cache.len()
  }

  /// Number of remote fetches currently shared through the in-flight registry.
  pub fn in_flight_count(&self) -> usize {
    self.inflight.len()
  }

  /// The key a descriptor's result is cached under.
  pub fn cache_key(descriptor: &DataSourceDescriptor) -> String {
    descriptor
      .cache_policy
      .as_ref()
      .and_then(|policy| policy.explicit_key.clone())
      .unwrap_or_else(|| RequestKey::derive(descriptor).to_string())
  }

  fn failure(&self, error: ServiceError) -> ResponseEnvelope<Value> {
    ResponseEnvelope::failure(error, self.clock.now_millis())
  }

  /// Static data is passed through the optional transform; computed sources use the
  /// transform as the producer, fed with the static payload (or an empty array).
  fn resolve_local(&self, descriptor: &DataSourceDescriptor) -> ResponseEnvelope<Value> {
    let input = descriptor
      .static_data
      .clone()
      .unwrap_or_else(|| Value::Array(Vec::new()));

    match transform::apply(input, descriptor.transform.as_ref()) {
      Ok(data) => ResponseEnvelope::success(data, false, self.clock.now_millis()),
      Err(error) => self.failure(error),
    }
  }

  async fn fetch_remote(&self, descriptor: &DataSourceDescriptor) -> ResponseEnvelope<Value> {
    let request_key = RequestKey::derive(descriptor);
    let cache_key = Self::cache_key(descriptor);
    let cache_ttl = descriptor.active_cache().map(|policy| policy.ttl());

    if cache_ttl.is_some() {
      if let Some(entry) = self.cache.get(&cache_key) {
        tracing::debug!(key = %cache_key, request = request_key.description(), "cache hit");
        return ResponseEnvelope::success(entry.value, true, entry.created_at);
      }
    }

    let (shared, joined) = self.inflight.get_or_create(request_key.as_str(), || {
      self.remote_pipeline(descriptor, cache_key, cache_ttl)
    });
    if joined {
      tracing::debug!(request = request_key.description(), "joined in-flight request");
    }

    match shared.await {
      Ok(envelope) => envelope,
      Err(aborted) => {
        tracing::error!(
          request = request_key.description(),
          error = %aborted,
          "in-flight fetch aborted"
        );
        self.failure(ServiceError::internal(aborted))
      }
    }
  }

  /// Build the owned future that performs one remote fetch end to end.
  fn remote_pipeline(
    &self,
    descriptor: &DataSourceDescriptor,
    cache_key: String,
    cache_ttl: Option<i64>,
  ) -> impl Future<Output = ResponseEnvelope<Value>> + Send + 'static {
    let transport = Arc::clone(&self.transport);
    let cache = Arc::clone(&self.cache);
    let clock = Arc::clone(&self.clock);
    let request = TransportRequest::from_descriptor(descriptor);
    let transform = descriptor.transform.clone();
    let backoff = descriptor.backoff();
    let timeout = descriptor.timeout();
    let loading = self.loading.begin();

    async move {
      let _loading = loading;

      let fetched = retry::retry(backoff, |attempt| {
        let transport = Arc::clone(&transport);
        let request = request.clone();
        async move {
          tracing::debug!(attempt = attempt + 1, request = %request, "sending request");
          retry::with_timeout(timeout, async {
            transport.send(&request).await.map_err(ServiceError::from)
          })
          .await
        }
      })
      .await;

      let now = clock.now_millis();
      match fetched.and_then(|data| transform::apply(data, transform.as_ref())) {
        Ok(data) => {
          if let Some(ttl) = cache_ttl {
            cache.set(&cache_key, data.clone(), ttl);
          }
          ResponseEnvelope::success(data, false, now)
        }
        Err(error) => {
          tracing::debug!(request = %request, error = %error, "remote fetch failed");
          ResponseEnvelope::failure(error, now)
        }
      }
    }
  }
}
