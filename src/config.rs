use color_eyre::{eyre::eyre, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::source::DataSourceDescriptor;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Base URL that relative endpoints are resolved against
  pub base_url: Option<String>,
  /// Timeout applied to remote sources that don't set their own
  pub default_timeout_millis: Option<i64>,
  #[serde(default)]
  pub sources: BTreeMap<String, SourceConfig>,
}

/// A named data source as written in the config file: a descriptor plus an optional
/// `select` key.
#[derive(Debug, Clone)]
pub struct SourceConfig {
  pub descriptor: DataSourceDescriptor,
  /// JSON pointer selecting part of the fetched data, e.g. `/data/items`
  pub select: Option<String>,
}

impl<'de> Deserialize<'de> for SourceConfig {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let mut raw = Map::<String, Value>::deserialize(deserializer)?;

    let select = match raw.remove("select") {
      None | Some(Value::Null) => None,
      Some(Value::String(pointer)) => Some(pointer),
      Some(other) => {
        return Err(D::Error::custom(format!(
          "select must be a JSON pointer string, got {}",
          other
        )))
      }
    };

    let descriptor = serde_json::from_value(Value::Object(raw)).map_err(D::Error::custom)?;
    Ok(Self { descriptor, select })
  }
}

impl SourceConfig {
  /// Build the runtime descriptor, compiling `select` into a transform.
  pub fn to_descriptor(&self, default_timeout_millis: Option<i64>) -> DataSourceDescriptor {
    let mut descriptor = self.descriptor.clone();

    if let Some(pointer) = self.select.clone() {
      descriptor = descriptor.with_transform(move |data: Value| {
        data
          .pointer(&pointer)
          .cloned()
          .ok_or_else(|| eyre!("nothing found at {}", pointer))
      });
    }

    if descriptor.timeout_millis.is_none() {
      descriptor.timeout_millis = default_timeout_millis;
    }

    descriptor
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./dashdata.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/dashdata/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        return Err(eyre!(
          "No configuration file found. Create one at ./dashdata.yaml or ~/.config/dashdata/config.yaml"
        ))
      }
    };

    if let Some(base_url) = Self::base_url_from_env() {
      config.base_url = Some(base_url);
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("dashdata.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("dashdata").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Base URL override from `DASHDATA_BASE_URL`.
  pub fn base_url_from_env() -> Option<String> {
    std::env::var("DASHDATA_BASE_URL")
      .ok()
      .filter(|url| !url.trim().is_empty())
  }

  /// Descriptors for the named sources, or all sources when `names` is empty.
  pub fn descriptors(&self, names: &[String]) -> Result<Vec<(String, DataSourceDescriptor)>> {
    if names.is_empty() {
      return Ok(
        self
          .sources
          .iter()
          .map(|(name, source)| (name.clone(), source.to_descriptor(self.default_timeout_millis)))
          .collect(),
      );
    }

    names
      .iter()
      .map(|name| {
        self
          .sources
          .get(name)
          .map(|source| (name.clone(), source.to_descriptor(self.default_timeout_millis)))
          .ok_or_else(|| eyre!("Unknown data source: {}", name))
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::{HttpMethod, SourceKind};
  use crate::transform;
  use serde_json::json;

  const SAMPLE: &str = r#"
base_url: https://dashboards.example.com
default_timeout_millis: 2000
sources:
  sales:
    kind: remote
    endpoint: /api/sales
    queryParams:
      region: emea
      limit: 10
    cachePolicy:
      enabled: true
      ttlMillis: 60000
    retryPolicy:
      enabled: true
      maxAttempts: 3
      initialDelayMillis: 200
    select: /data/items
  search:
    type: api
    endpoint: /api/search
    method: POST
    body:
      query: revenue
    timeout: 500
  regions:
    kind: static
    staticData:
      - { id: 1, name: EMEA }
      - { id: 2, name: APAC }
"#;

  #[test]
  fn test_parse_sample() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    assert_eq!(config.base_url.as_deref(), Some("https://dashboards.example.com"));
    assert_eq!(config.sources.len(), 3);

    let sales = &config.sources["sales"];
    assert_eq!(sales.descriptor.kind, SourceKind::Remote);
    assert_eq!(sales.select.as_deref(), Some("/data/items"));
    assert_eq!(sales.descriptor.backoff().max_attempts, 3);

    let search = &config.sources["search"].descriptor;
    assert_eq!(search.method(), HttpMethod::Post);
    assert_eq!(search.body, Some(json!({"query": "revenue"})));

    let regions = &config.sources["regions"].descriptor;
    assert_eq!(regions.kind, SourceKind::Static);
    assert!(crate::source::validate(regions).valid);
  }

  #[test]
  fn test_descriptor_defaults_and_select() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    let descriptors = config.descriptors(&[]).unwrap();
    let names: Vec<&str> = descriptors.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["regions", "sales", "search"]);

    let sales = &descriptors[1].1;
    assert_eq!(sales.timeout_millis, Some(2000));
    let selected = transform::apply(json!({"data": {"items": [1, 2]}}), sales.transform.as_ref());
    assert_eq!(selected, Ok(json!([1, 2])));

    let missing = transform::apply(json!({}), sales.transform.as_ref()).unwrap_err();
    assert!(missing.message.contains("/data/items"));

    // An explicit timeout wins over the default
    assert_eq!(descriptors[2].1.timeout_millis, Some(500));
  }

  #[test]
  fn test_unknown_source_name() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    assert!(config.descriptors(&["nope".to_string()]).is_err());

    let picked = config.descriptors(&["search".to_string()]).unwrap();
    assert_eq!(picked.len(), 1);
  }

  #[test]
  fn test_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
