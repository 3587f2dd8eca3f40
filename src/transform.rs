//! Applies caller-supplied transforms without letting their failures escape.

use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::envelope::ServiceError;
use crate::source::TransformFn;

/// Apply `transform` to `data`, or return `data` unchanged when there is none.
///
/// Both an `Err` and a panic inside the transform become a non-retryable transform error.
pub fn apply(data: Value, transform: Option<&TransformFn>) -> Result<Value, ServiceError> {
  let Some(transform) = transform else {
    return Ok(data);
  };

  match panic::catch_unwind(AssertUnwindSafe(|| transform.call(data))) {
    Ok(Ok(transformed)) => Ok(transformed),
    Ok(Err(report)) => {
      tracing::warn!(error = %report, "transform returned an error");
      Err(ServiceError::transform(format!("{:#}", report)))
    }
    Err(payload) => {
      let reason = panic_message(payload.as_ref());
      tracing::warn!(reason = %reason, "transform panicked");
      Err(ServiceError::transform(format!("panicked: {}", reason)))
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}
