use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use url::Url;

use super::{Transport, TransportError, TransportRequest};
use crate::source::HttpMethod;

/// HTTP transport backed by reqwest.
///
/// Relative endpoints are resolved against `base_url`. No client-side timeout is set
/// here; deadlines are enforced by the caller.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Option<Url>,
}

impl HttpTransport {
  pub fn new(base_url: Option<&str>) -> Result<Self> {
    let base_url = base_url
      .map(Url::parse)
      .transpose()
      .map_err(|e| eyre!("Invalid base URL: {}", e))?;

    let client = reqwest::Client::builder()
      .user_agent(concat!("dashdata/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base_url })
  }

  fn resolve(&self, endpoint: &str) -> Result<Url, TransportError> {
    match Url::parse(endpoint) {
      Ok(url) => Ok(url),
      Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
        Some(base) => base
          .join(endpoint)
          .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", endpoint, e))),
        None => Err(TransportError::InvalidUrl(format!(
          "relative endpoint {} needs a base URL",
          endpoint
        ))),
      },
      Err(e) => Err(TransportError::InvalidUrl(format!("{}: {}", endpoint, e))),
    }
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn send(&self, request: &TransportRequest) -> Result<Value, TransportError> {
    let url = self.resolve(&request.url)?;

    let builder = match request.method {
      HttpMethod::Post => self
        .client
        .post(url)
        .json(request.body.as_ref().unwrap_or(&Value::Null)),
      HttpMethod::Get | HttpMethod::Unsupported => self.client.get(url).query(&request.query),
    };

    let response = builder
      .send()
      .await
      .map_err(|e| TransportError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      let message = if body.trim().is_empty() {
        status
          .canonical_reason()
          .unwrap_or("Request failed")
          .to_string()
      } else {
        body
      };
      return Err(TransportError::Status {
        status: status.as_u16(),
        message,
      });
    }

    response
      .json::<Value>()
      .await
      .map_err(|e| TransportError::Decode(e.to_string()))
  }
}
