//! Uniform response shape returned by every fetch, successful or not.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt::Display;

/// Failure class of a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
  /// The descriptor failed structural validation
  Validation,
  /// HTTP status or connection failure
  Transport,
  /// The request deadline elapsed
  Timeout,
  /// The caller-supplied transform or producer failed
  Transform,
  /// The payload could not be converted to the requested type
  Decode,
  /// The task driving a shared fetch died without settling
  Internal,
}

pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const TIMEOUT: &str = "TIMEOUT";
pub const TRANSFORM_ERROR: &str = "TRANSFORM_ERROR";
pub const DECODE_ERROR: &str = "DECODE_ERROR";
pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Error carried inside a [`ResponseEnvelope`]. Never raised to callers.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct ServiceError {
  pub kind: ErrorKind,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub code: Option<String>,
  pub retryable: bool,
  /// Stringified underlying cause, for debugging
  #[serde(skip_serializing_if = "Option::is_none")]
  pub original_cause: Option<String>,
}

impl ServiceError {
  /// Build a validation error out of every collected rule violation.
  pub fn validation(errors: &[String]) -> Self {
    Self {
      kind: ErrorKind::Validation,
      message: format!("Invalid data source: {}", errors.join("; ")),
      code: Some(VALIDATION_ERROR.to_string()),
      retryable: false,
      original_cause: None,
    }
  }

  pub fn timeout(timeout_millis: u64) -> Self {
    Self {
      kind: ErrorKind::Timeout,
      message: format!("Request timed out after {}ms", timeout_millis),
      code: Some(TIMEOUT.to_string()),
      retryable: true,
      original_cause: None,
    }
  }

  pub fn transform(cause: impl Display) -> Self {
    Self {
      kind: ErrorKind::Transform,
      message: format!("Transform failed: {}", cause),
      code: Some(TRANSFORM_ERROR.to_string()),
      retryable: false,
      original_cause: Some(cause.to_string()),
    }
  }

  pub fn decode(cause: impl Display) -> Self {
    Self {
      kind: ErrorKind::Decode,
      message: format!("Failed to decode response data: {}", cause),
      code: Some(DECODE_ERROR.to_string()),
      retryable: false,
      original_cause: Some(cause.to_string()),
    }
  }

  pub fn internal(cause: impl Display) -> Self {
    Self {
      kind: ErrorKind::Internal,
      message: format!("Request aborted: {}", cause),
      code: Some(INTERNAL_ERROR.to_string()),
      retryable: false,
      original_cause: Some(cause.to_string()),
    }
  }
}

/// Settled outcome of a fetch.
///
/// Exactly one of data/error is present, carried as a `Result`. `loading` is always
/// `false` on a delivered envelope; loading transitions are published separately through
/// [`crate::loading::LoadingTracker`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope<T> {
  pub result: Result<T, ServiceError>,
  pub loading: bool,
  /// Unix milliseconds when the data was fetched (cache creation time for cache hits)
  pub timestamp: i64,
  pub from_cache: bool,
}

impl<T> ResponseEnvelope<T> {
  pub fn success(data: T, from_cache: bool, timestamp: i64) -> Self {
    Self {
      result: Ok(data),
      loading: false,
      timestamp,
      from_cache,
    }
  }

  pub fn failure(error: ServiceError, timestamp: i64) -> Self {
    Self {
      result: Err(error),
      loading: false,
      timestamp,
      from_cache: false,
    }
  }

  pub fn data(&self) -> Option<&T> {
    self.result.as_ref().ok()
  }

  pub fn error(&self) -> Option<&ServiceError> {
    self.result.as_ref().err()
  }

  pub fn is_success(&self) -> bool {
    self.result.is_ok()
  }

  pub fn into_data(self) -> Option<T> {
    self.result.ok()
  }

  /// Convert the payload, turning a conversion failure into an error envelope.
  pub fn and_then<U, F>(self, f: F) -> ResponseEnvelope<U>
  where
    F: FnOnce(T) -> Result<U, ServiceError>,
  {
    let result = self.result.and_then(f);
    let from_cache = self.from_cache && result.is_ok();
    ResponseEnvelope {
      result,
      loading: self.loading,
      timestamp: self.timestamp,
      from_cache,
    }
  }
}

impl<T: Serialize> Serialize for ResponseEnvelope<T> {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut state = serializer.serialize_struct("ResponseEnvelope", 5)?;
    state.serialize_field("data", &self.data())?;
    state.serialize_field("loading", &self.loading)?;
    state.serialize_field("error", &self.error())?;
    state.serialize_field("timestamp", &self.timestamp)?;
    state.serialize_field("fromCache", &self.from_cache)?;
    state.end()
  }
}
