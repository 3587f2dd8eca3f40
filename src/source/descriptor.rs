//! Declarative description of where widget data comes from.

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Cache TTL applied when caching is enabled without an explicit TTL.
pub const DEFAULT_CACHE_TTL_MILLIS: i64 = 300_000;
pub const DEFAULT_RETRY_MAX_ATTEMPTS: i64 = 3;
pub const DEFAULT_RETRY_INITIAL_DELAY_MILLIS: i64 = 1_000;
pub const DEFAULT_RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Kind of data source. `api` is accepted as an alias for `remote`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
  #[serde(alias = "api")]
  Remote,
  Static,
  Computed,
  /// Anything else; rejected by validation
  #[serde(other)]
  Unknown,
}

impl SourceKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Remote => "remote",
      Self::Static => "static",
      Self::Computed => "computed",
      Self::Unknown => "unknown",
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
  #[default]
  #[serde(alias = "get")]
  Get,
  #[serde(alias = "post")]
  Post,
  /// Anything other than GET/POST; rejected by validation
  #[serde(other)]
  Unsupported,
}

impl HttpMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Get => "GET",
      Self::Post => "POST",
      Self::Unsupported => "UNSUPPORTED",
    }
  }
}

/// Caller-supplied pure function applied to fetched data (or producing it, for
/// computed sources).
#[derive(Clone)]
pub struct TransformFn(Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>);

impl TransformFn {
  pub fn new<F>(f: F) -> Self
  where
    F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
  {
    Self(Arc::new(f))
  }

  pub fn call(&self, data: Value) -> Result<Value> {
    (self.0)(data)
  }
}

impl fmt::Debug for TransformFn {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("TransformFn(..)")
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePolicy {
  pub enabled: bool,
  #[serde(default, alias = "ttl")]
  pub ttl_millis: Option<i64>,
  /// Overrides the derived request key for cache lookups
  #[serde(default, alias = "key")]
  pub explicit_key: Option<String>,
}

impl CachePolicy {
  pub fn enabled(ttl_millis: i64) -> Self {
    Self {
      enabled: true,
      ttl_millis: Some(ttl_millis),
      explicit_key: None,
    }
  }

  pub fn with_key(mut self, key: impl Into<String>) -> Self {
    self.explicit_key = Some(key.into());
    self
  }

  pub fn ttl(&self) -> i64 {
    self.ttl_millis.unwrap_or(DEFAULT_CACHE_TTL_MILLIS)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
  pub enabled: bool,
  /// Total number of attempts, including the first one
  #[serde(default)]
  pub max_attempts: Option<i64>,
  #[serde(default, alias = "initialDelay")]
  pub initial_delay_millis: Option<i64>,
  #[serde(default)]
  pub backoff_multiplier: Option<f64>,
}

impl RetryPolicy {
  pub fn new(max_attempts: i64, initial_delay_millis: i64, backoff_multiplier: f64) -> Self {
    Self {
      enabled: true,
      max_attempts: Some(max_attempts),
      initial_delay_millis: Some(initial_delay_millis),
      backoff_multiplier: Some(backoff_multiplier),
    }
  }

  pub fn disabled() -> Self {
    Self::default()
  }
}

/// Retry settings with defaults applied and ranges checked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
  pub max_attempts: u32,
  pub initial_delay: Duration,
  pub multiplier: f64,
}

impl Backoff {
  /// A single attempt, no delays.
  pub const NONE: Backoff = Backoff {
    max_attempts: 1,
    initial_delay: Duration::ZERO,
    multiplier: 1.0,
  };

  /// Resolve the effective backoff for an optional policy.
  pub fn from_policy(policy: Option<&RetryPolicy>) -> Self {
    match policy {
      Some(policy) if policy.enabled => Self {
        max_attempts: policy
          .max_attempts
          .unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS)
          .clamp(1, u32::MAX as i64) as u32,
        initial_delay: Duration::from_millis(
          policy
            .initial_delay_millis
            .unwrap_or(DEFAULT_RETRY_INITIAL_DELAY_MILLIS)
            .max(0) as u64,
        ),
        multiplier: policy
          .backoff_multiplier
          .unwrap_or(DEFAULT_RETRY_BACKOFF_MULTIPLIER)
          .max(1.0),
      },
      _ => Self::NONE,
    }
  }

  /// Delay to wait after the failed attempt with the given zero-based index.
  pub fn delay_for(&self, attempt_index: u32) -> Duration {
    let factor = self.multiplier.powi(attempt_index as i32);
    Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
  }
}

/// Declarative description of a widget's data source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceDescriptor {
  #[serde(alias = "type")]
  pub kind: SourceKind,
  #[serde(default)]
  pub endpoint: Option<String>,
  #[serde(default, alias = "method")]
  pub http_method: Option<HttpMethod>,
  /// Query parameters, sent for GET requests only
  #[serde(default, alias = "params")]
  pub query_params: Option<Map<String, Value>>,
  /// Request body, sent for POST requests only
  #[serde(default)]
  pub body: Option<Value>,
  #[serde(default, alias = "data")]
  pub static_data: Option<Value>,
  #[serde(skip)]
  pub transform: Option<TransformFn>,
  #[serde(default, alias = "cache")]
  pub cache_policy: Option<CachePolicy>,
  #[serde(default, alias = "retry")]
  pub retry_policy: Option<RetryPolicy>,
  #[serde(default, alias = "timeout")]
  pub timeout_millis: Option<i64>,
}

impl DataSourceDescriptor {
  fn empty(kind: SourceKind) -> Self {
    Self {
      kind,
      endpoint: None,
      http_method: None,
      query_params: None,
      body: None,
      static_data: None,
      transform: None,
      cache_policy: None,
      retry_policy: None,
      timeout_millis: None,
    }
  }

  /// A remote source fetched from `endpoint` with GET.
  pub fn remote(endpoint: impl Into<String>) -> Self {
    Self {
      endpoint: Some(endpoint.into()),
      ..Self::empty(SourceKind::Remote)
    }
  }

  /// A source serving a fixed array of rows.
  pub fn fixed(data: Value) -> Self {
    Self {
      static_data: Some(data),
      ..Self::empty(SourceKind::Static)
    }
  }

  /// A source whose data is produced by `producer`.
  pub fn computed<F>(producer: F) -> Self
  where
    F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
  {
    Self {
      transform: Some(TransformFn::new(producer)),
      ..Self::empty(SourceKind::Computed)
    }
  }

  /// A descriptor of an arbitrary kind with nothing else set.
  pub fn of_kind(kind: SourceKind) -> Self {
    Self::empty(kind)
  }

  pub fn with_method(mut self, method: HttpMethod) -> Self {
    self.http_method = Some(method);
    self
  }

  /// Set query parameters. Non-object values are ignored.
  pub fn with_params(mut self, params: Value) -> Self {
    if let Value::Object(map) = params {
      self.query_params = Some(map);
    }
    self
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  pub fn with_static_data(mut self, data: Value) -> Self {
    self.static_data = Some(data);
    self
  }

  pub fn with_transform<F>(mut self, transform: F) -> Self
  where
    F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
  {
    self.transform = Some(TransformFn::new(transform));
    self
  }

  pub fn with_cache(mut self, policy: CachePolicy) -> Self {
    self.cache_policy = Some(policy);
    self
  }

  pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
    self.retry_policy = Some(policy);
    self
  }

  pub fn with_timeout(mut self, timeout_millis: i64) -> Self {
    self.timeout_millis = Some(timeout_millis);
    self
  }

  pub fn method(&self) -> HttpMethod {
    self.http_method.unwrap_or_default()
  }

  /// The cache policy, if caching is switched on.
  pub fn active_cache(&self) -> Option<&CachePolicy> {
    self.cache_policy.as_ref().filter(|policy| policy.enabled)
  }

  pub fn backoff(&self) -> Backoff {
    Backoff::from_policy(self.retry_policy.as_ref())
  }

  pub fn timeout(&self) -> Option<Duration> {
    self
      .timeout_millis
      .filter(|millis| *millis > 0)
      .map(|millis| Duration::from_millis(millis as u64))
  }
}
