//! Widget-side handle for loading data through the [`DataService`].
//!
//! A `DataQuery` owns one descriptor and tracks the loading lifecycle a widget renders:
//! idle, loading, empty, success or error. The fetch runs on a background task and
//! the widget picks up the result from its event loop tick.
//!
//! # Example
//!
//! ```ignore
//! let mut query = DataQuery::new(service.clone(), DataSourceDescriptor::remote("/api/sales"));
//!
//! // Start fetching
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match query.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Empty => render_no_data(),
//!     QueryState::Success(data) => render_chart(data),
//!     QueryState::Error(e) => render_error(&e.message, e.retryable),
//!     QueryState::Idle => {}
//! }
//! ```

use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use crate::envelope::{ResponseEnvelope, ServiceError};
use crate::service::DataService;
use crate::source::DataSourceDescriptor;

/// The state of a widget query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed but produced no rows
  Empty,
  /// Query completed with data
  Success(Value),
  /// Query failed
  Error(ServiceError),
}

impl QueryState {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn data(&self) -> Option<&Value> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&ServiceError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }

  fn from_envelope(envelope: ResponseEnvelope<Value>) -> Self {
    match envelope.result {
      Ok(data) if is_empty(&data) => QueryState::Empty,
      Ok(data) => QueryState::Success(data),
      Err(error) => QueryState::Error(error),
    }
  }
}

/// `null` and `[]` are treated as "no data" by widgets.
fn is_empty(data: &Value) -> bool {
  match data {
    Value::Null => true,
    Value::Array(rows) => rows.is_empty(),
    _ => false,
  }
}

pub struct DataQuery {
  service: DataService,
  descriptor: DataSourceDescriptor,
  state: QueryState,
  receiver: Option<oneshot::Receiver<ResponseEnvelope<Value>>>,
  fetched_at: Option<Instant>,
  from_cache: bool,
  stale_time: Duration,
}

impl DataQuery {
  pub fn new(service: DataService, descriptor: DataSourceDescriptor) -> Self {
    Self {
      service,
      descriptor,
      state: QueryState::Idle,
      receiver: None,
      fetched_at: None,
      from_cache: false,
      stale_time: Duration::from_secs(60), // Default 1 minute
    }
  }

  /// Set how long a successful result counts as fresh.
  pub fn with_stale_time(mut self, duration: Duration) -> Self {
    self.stale_time = duration;
    self
  }

  pub fn state(&self) -> &QueryState {
    &self.state
  }

  pub fn data(&self) -> Option<&Value> {
    self.state.data()
  }

  pub fn error(&self) -> Option<&ServiceError> {
    self.state.error()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  /// Whether the last settled result came from the cache.
  pub fn from_cache(&self) -> bool {
    self.from_cache
  }

  /// Check if the data is stale (older than stale_time).
  pub fn is_stale(&self) -> bool {
    match &self.state {
      QueryState::Success(_) | QueryState::Empty => self
        .fetched_at
        .map(|t| t.elapsed() > self.stale_time)
        .unwrap_or(true),
      _ => false,
    }
  }

  /// Start fetching unless a fetch is already running.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Start a new fetch, abandoning any pending result.
  ///
  /// A remote fetch that is still in flight is joined rather than sent again, so the new
  /// result is the pending one.
  pub fn refetch(&mut self) {
    self.receiver = None;
    self.start_fetch();
  }

  /// Poll for results from a pending fetch without blocking.
  ///
  /// Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(envelope) => {
        self.from_cache = envelope.from_cache;
        if envelope.is_success() {
          self.fetched_at = Some(Instant::now());
        }
        self.state = QueryState::from_envelope(envelope);
        self.receiver = None;
        true
      }
      Err(oneshot::error::TryRecvError::Empty) => false,
      Err(oneshot::error::TryRecvError::Closed) => {
        // The fetch task went away without answering
        self.state = QueryState::Idle;
        self.receiver = None;
        true
      }
    }
  }

  fn start_fetch(&mut self) {
    let (tx, rx) = oneshot::channel();
    self.receiver = Some(rx);
    self.state = QueryState::Loading;

    let service = self.service.clone();
    let descriptor = self.descriptor.clone();
    tokio::spawn(async move {
      let envelope = service.fetch_data(&descriptor).await;
      // Ignore send errors - the query may have been refetched or dropped
      let _ = tx.send(envelope);
    });
  }
}

impl std::fmt::Debug for DataQuery {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DataQuery")
      .field("state", &self.state)
      .field("fetched_at", &self.fetched_at)
      .field("stale_time", &self.stale_time)
      .finish_non_exhaustive()
  }
}
