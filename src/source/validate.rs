//! Structural validation of data source descriptors.
//!
//! Every rule is checked and all violations are reported together.

use serde::Serialize;
use serde_json::Value;
use url::Url;

use super::descriptor::{DataSourceDescriptor, HttpMethod, SourceKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
  pub valid: bool,
  pub errors: Vec<String>,
}

impl ValidationResult {
  fn from_errors(errors: Vec<String>) -> Self {
    Self {
      valid: errors.is_empty(),
      errors,
    }
  }
}

/// Validate a descriptor without touching the network or any cache.
pub fn validate(descriptor: &DataSourceDescriptor) -> ValidationResult {
  let mut errors = Vec::new();

  match descriptor.kind {
    SourceKind::Remote => match descriptor.endpoint.as_deref().map(str::trim) {
      None | Some("") => errors.push("Endpoint is required for remote data sources".to_string()),
      Some(endpoint) if !is_resolvable_endpoint(endpoint) => {
        errors.push("Endpoint must be an absolute URL or a relative path".to_string())
      }
      Some(_) => {}
    },
    SourceKind::Static => {
      if !matches!(descriptor.static_data, Some(Value::Array(_))) {
        errors.push("Data array is required for static data sources".to_string());
      }
    }
    SourceKind::Computed => {
      if descriptor.transform.is_none() {
        errors.push("Transform function is required for computed data sources".to_string());
      }
    }
    SourceKind::Unknown => errors.push("Unsupported data source type".to_string()),
  }

  match descriptor.http_method {
    Some(HttpMethod::Unsupported) => errors.push("HTTP method must be GET or POST".to_string()),
    Some(HttpMethod::Post) if descriptor.body.is_none() => {
      errors.push("Request body is required for POST requests".to_string())
    }
    _ => {}
  }

  if let Some(cache) = &descriptor.cache_policy {
    if cache.enabled && cache.ttl_millis.is_some_and(|ttl| ttl <= 0) {
      errors.push("Cache TTL must be a positive number".to_string());
    }
    if cache.explicit_key.as_deref().is_some_and(|key| key.trim().is_empty()) {
      errors.push("Cache key must not be empty".to_string());
    }
  }

  if let Some(retry) = descriptor.retry_policy.as_ref().filter(|r| r.enabled) {
    if retry.max_attempts.is_some_and(|n| n <= 0) {
      errors.push("Retry maxAttempts must be a positive number".to_string());
    }
    if retry.initial_delay_millis.is_some_and(|d| d < 0) {
      errors.push("Retry initialDelay must be zero or greater".to_string());
    }
    if retry
      .backoff_multiplier
      .is_some_and(|m| m.is_nan() || m < 1.0)
    {
      errors.push("Retry backoffMultiplier must be at least 1".to_string());
    }
  }

  if descriptor.timeout_millis.is_some_and(|t| t <= 0) {
    errors.push("Timeout must be a positive number".to_string());
  }

  ValidationResult::from_errors(errors)
}

/// Absolute http(s) URLs and anything that resolves as a relative reference are accepted.
fn is_resolvable_endpoint(endpoint: &str) -> bool {
  if endpoint.chars().any(char::is_whitespace) {
    return false;
  }

  match Url::parse(endpoint) {
    Ok(url) => matches!(url.scheme(), "http" | "https"),
    Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse("http://localhost/")
      .and_then(|base| base.join(endpoint))
      .is_ok(),
    Err(_) => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::{CachePolicy, RetryPolicy};
  use serde_json::json;

  fn has_error(result: &ValidationResult, needle: &str) -> bool {
    result.errors.iter().any(|message| message.contains(needle))
  }

  #[test]
  fn test_remote_requires_endpoint() {
    let result = validate(&DataSourceDescriptor::of_kind(SourceKind::Remote));
    assert!(!result.valid);
    assert!(has_error(&result, "Endpoint is required"));
  }

  #[test]
  fn test_static_requires_array() {
    let result = validate(&DataSourceDescriptor::of_kind(SourceKind::Static));
    assert!(has_error(&result, "Data array is required"));

    let result = validate(&DataSourceDescriptor::fixed(json!({"not": "an array"})));
    assert!(has_error(&result, "Data array is required"));

    assert!(validate(&DataSourceDescriptor::fixed(json!([]))).valid);
  }

  #[test]
  fn test_computed_requires_transform() {
    let result = validate(&DataSourceDescriptor::of_kind(SourceKind::Computed));
    assert!(has_error(&result, "Transform function is required"));
  }

  #[test]
  fn test_unknown_kind_rejected() {
    let result = validate(&DataSourceDescriptor::of_kind(SourceKind::Unknown));
    assert_eq!(result.errors, vec!["Unsupported data source type".to_string()]);
  }

  #[test]
  fn test_retry_and_cache_rules() {
    let descriptor = DataSourceDescriptor::remote("/api/retry")
      .with_retry(RetryPolicy {
        enabled: true,
        max_attempts: Some(0),
        initial_delay_millis: Some(-1),
        backoff_multiplier: Some(0.5),
      })
      .with_cache(CachePolicy::enabled(0).with_key(" "))
      .with_timeout(0);

    let result = validate(&descriptor);
    assert!(has_error(&result, "Retry maxAttempts must be a positive number"));
    assert!(has_error(&result, "Retry initialDelay must be zero or greater"));
    assert!(has_error(&result, "Retry backoffMultiplier must be at least 1"));
    assert!(has_error(&result, "Cache TTL must be a positive number"));
    assert!(has_error(&result, "Cache key must not be empty"));
    assert!(has_error(&result, "Timeout must be a positive number"));
    assert_eq!(result.errors.len(), 6);
  }

  #[test]
  fn test_disabled_retry_is_not_checked() {
    let descriptor = DataSourceDescriptor::remote("/api/x").with_retry(RetryPolicy {
      enabled: false,
      max_attempts: Some(0),
      ..RetryPolicy::default()
    });
    assert!(validate(&descriptor).valid);
  }

  #[test]
  fn test_post_requires_body() {
    let descriptor = DataSourceDescriptor::remote("/api/search").with_method(HttpMethod::Post);
    assert!(has_error(&validate(&descriptor), "Request body is required"));

    let descriptor = descriptor.with_body(json!({"q": "x"}));
    assert!(validate(&descriptor).valid);
  }

  #[test]
  fn test_endpoint_forms() {
    assert!(is_resolvable_endpoint("https://example.com/api"));
    assert!(is_resolvable_endpoint("/api/items"));
    assert!(is_resolvable_endpoint("api/items?x=1"));
    assert!(!is_resolvable_endpoint("/api/with space"));
    assert!(!is_resolvable_endpoint("ftp://example.com/file"));
  }

  #[test]
  fn test_valid_configuration() {
    let descriptor = DataSourceDescriptor::remote("/api/valid")
      .with_method(HttpMethod::Get)
      .with_params(json!({"page": 1}))
      .with_cache(CachePolicy::enabled(1_000))
      .with_retry(RetryPolicy::new(3, 100, 2.0));

    let result = validate(&descriptor);
    assert!(result.valid);
    assert!(result.errors.is_empty());
  }
}
