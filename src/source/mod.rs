//! Data source descriptors: the declarative input to the data service.

mod descriptor;
mod key;
mod validate;

pub use descriptor::{
  Backoff, CachePolicy, DataSourceDescriptor, HttpMethod, RetryPolicy, SourceKind, TransformFn,
  DEFAULT_CACHE_TTL_MILLIS,
};
pub use key::{stable_serialize, RequestKey};
pub use validate::{validate, ValidationResult};
