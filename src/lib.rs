//! Data fetching core for dashboard widgets.
//!
//! A widget describes its data with a [`DataSourceDescriptor`] and hands it to
//! [`DataService::fetch_data`], which always answers with a [`ResponseEnvelope`]:
//! failures are data, never panics or `Err`s.

pub mod cache;
pub mod clock;
pub mod config;
pub mod envelope;
pub mod loading;
pub mod query;
pub mod retry;
pub mod service;
pub mod source;
pub mod transform;
pub mod transport;

pub use envelope::{ErrorKind, ResponseEnvelope, ServiceError};
pub use query::{DataQuery, QueryState};
pub use service::DataService;
pub use source::{
  CachePolicy, DataSourceDescriptor, HttpMethod, RetryPolicy, SourceKind, ValidationResult,
};
pub use transport::{HttpTransport, Transport, TransportError, TransportRequest};
