//! Transport boundary: issuing a single GET/POST request and decoding its JSON body.

mod http;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::envelope::{ErrorKind, ServiceError, DECODE_ERROR, NETWORK_ERROR};
use crate::source::{DataSourceDescriptor, HttpMethod};

pub use http::HttpTransport;

/// Anything that can carry out a single request attempt.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: &TransportRequest) -> Result<Value, TransportError>;
}

/// A fully-resolved request ready to hand to a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
  pub method: HttpMethod,
  pub url: String,
  /// Query pairs in sorted key order (GET only)
  pub query: Vec<(String, String)>,
  /// JSON body (POST only)
  pub body: Option<Value>,
}

impl TransportRequest {
  pub fn from_descriptor(descriptor: &DataSourceDescriptor) -> Self {
    let method = descriptor.method();
    let url = descriptor.endpoint.clone().unwrap_or_default();

    match method {
      HttpMethod::Post => Self {
        method,
        url,
        query: Vec::new(),
        body: descriptor.body.clone(),
      },
      _ => {
        let mut query: Vec<(String, String)> = descriptor
          .query_params
          .iter()
          .flatten()
          .map(|(key, value)| (key.clone(), query_value(value)))
          .collect();
        query.sort();

        Self {
          method,
          url,
          query,
          body: None,
        }
      }
    }
  }
}

impl fmt::Display for TransportRequest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method.as_str(), self.url)?;
    for (i, (key, value)) in self.query.iter().enumerate() {
      let sep = if i == 0 { '?' } else { '&' };
      write!(f, "{}{}={}", sep, key, value)?;
    }
    Ok(())
  }
}

/// Strings are sent as-is; everything else in its JSON text form.
fn query_value(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
  /// The server answered with a non-success status
  #[error("HTTP {status}: {message}")]
  Status { status: u16, message: String },
  /// The request never got a response
  #[error("Network error: {0}")]
  Network(String),
  /// The endpoint could not be turned into a request URL
  #[error("Invalid request URL: {0}")]
  InvalidUrl(String),
  /// The response body was not valid JSON
  #[error("Invalid response body: {0}")]
  Decode(String),
}

impl TransportError {
  /// Server errors and connection failures are worth another attempt; client errors
  /// are not.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Status { status, .. } => *status >= 500,
      Self::Network(_) => true,
      Self::InvalidUrl(_) | Self::Decode(_) => false,
    }
  }

  pub fn code(&self) -> String {
    match self {
      Self::Status { status, .. } => status.to_string(),
      Self::Network(_) => NETWORK_ERROR.to_string(),
      Self::InvalidUrl(_) => "INVALID_URL".to_string(),
      Self::Decode(_) => DECODE_ERROR.to_string(),
    }
  }
}

impl From<TransportError> for ServiceError {
  fn from(error: TransportError) -> Self {
    Self {
      kind: ErrorKind::Transport,
      message: error.to_string(),
      code: Some(error.code()),
      retryable: error.is_retryable(),
      original_cause: Some(format!("{:?}", error)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_retryability_by_status() {
    let status = |status| TransportError::Status {
      status,
      message: String::new(),
    };

    assert!(status(500).is_retryable());
    assert!(status(503).is_retryable());
    assert!(!status(400).is_retryable());
    assert!(!status(404).is_retryable());
    assert!(TransportError::Network("reset".into()).is_retryable());
    assert!(!TransportError::Decode("eof".into()).is_retryable());
  }

  #[test]
  fn test_service_error_from_status() {
    let error = ServiceError::from(TransportError::Status {
      status: 404,
      message: "Not Found".into(),
    });

    assert_eq!(error.code.as_deref(), Some("404"));
    assert_eq!(error.message, "HTTP 404: Not Found");
    assert!(!error.retryable);
    assert_eq!(error.kind, ErrorKind::Transport);
  }

  #[test]
  fn test_get_request_sorts_query() {
    let descriptor = DataSourceDescriptor::remote("/api/test")
      .with_params(json!({"page": 1, "limit": 10, "q": "text"}))
      .with_body(json!({"ignored": true}));
    let request = TransportRequest::from_descriptor(&descriptor);

    assert_eq!(request.body, None);
    assert_eq!(request.to_string(), "GET /api/test?limit=10&page=1&q=text");
  }

  #[test]
  fn test_post_request_carries_body_only() {
    let descriptor = DataSourceDescriptor::remote("/api/search")
      .with_method(HttpMethod::Post)
      .with_params(json!({"page": 1}))
      .with_body(json!({"query": "x"}));
    let request = TransportRequest::from_descriptor(&descriptor);

    assert!(request.query.is_empty());
    assert_eq!(request.body, Some(json!({"query": "x"})));
    assert_eq!(request.to_string(), "POST /api/search");
  }
}
