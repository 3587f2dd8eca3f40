//! Request key derivation.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use super::descriptor::{DataSourceDescriptor, HttpMethod};

/// Identity of a logically identical request, used for caching and in-flight dedup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  hash: String,
  description: String,
}

impl RequestKey {
  /// Derive the key for a descriptor.
  ///
  /// Query parameters only take part for GET and the body only for POST, mirroring
  /// what is actually sent.
  pub fn derive(descriptor: &DataSourceDescriptor) -> Self {
    let method = descriptor.method();
    let params = match (method, &descriptor.query_params) {
      (HttpMethod::Get, Some(params)) => stable_serialize(&Value::Object(params.clone())),
      _ => String::new(),
    };
    let body = match (method, &descriptor.body) {
      (HttpMethod::Post, Some(body)) => stable_serialize(body),
      _ => String::new(),
    };

    let description = format!(
      "{}|{}|{}|{}|{}",
      descriptor.kind.as_str(),
      method.as_str(),
      descriptor.endpoint.as_deref().unwrap_or_default(),
      params,
      body
    );

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(description.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Self { hash, description }
  }

  pub fn as_str(&self) -> &str {
    &self.hash
  }

  /// Human-readable form of the key for logs.
  pub fn description(&self) -> &str {
    &self.description
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.hash)
  }
}

/// Serialize JSON with object keys sorted at every level, so that two payloads that
/// differ only in key order serialize identically.
pub fn stable_serialize(value: &Value) -> String {
  let mut out = String::new();
  write_stable(value, &mut out);
  out
}

fn write_stable(value: &Value, out: &mut String) {
  match value {
    Value::Object(map) => {
      let mut entries: Vec<(&String, &Value)> = map.iter().collect();
      entries.sort_by(|a, b| a.0.cmp(b.0));

      out.push('{');
      for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_stable(value, out);
      }
      out.push('}');
    }
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_stable(item, out);
      }
      out.push(']');
    }
    other => out.push_str(&other.to_string()),
  }
}
