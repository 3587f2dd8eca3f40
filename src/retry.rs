//! Selective exponential-backoff retry and per-attempt timeouts.

use std::future::Future;
use std::time::Duration;

use crate::envelope::ServiceError;
use crate::source::Backoff;

/// Run `attempt` until it succeeds, fails with a non-retryable error, or the attempt
/// budget is spent. The closure receives the zero-based attempt index.
///
/// After failed attempt `i` the controller sleeps `initial_delay * multiplier^i`.
pub async fn retry<T, F, Fut>(backoff: Backoff, mut attempt: F) -> Result<T, ServiceError>
where
  F: FnMut(u32) -> Fut,
  Fut: Future<Output = Result<T, ServiceError>>,
{
  let mut attempt_index = 0;
  loop {
    let error = match attempt(attempt_index).await {
      Ok(value) => return Ok(value),
      Err(error) => error,
    };

    let attempts_made = attempt_index + 1;
    if !error.retryable || attempts_made >= backoff.max_attempts {
      if attempts_made > 1 {
        tracing::warn!(attempts = attempts_made, error = %error, "giving up after retries");
      }
      return Err(error);
    }

    let delay = backoff.delay_for(attempt_index);
    tracing::debug!(
      attempt = attempts_made,
      delay_ms = delay.as_millis() as u64,
      error = %error,
      "retrying request"
    );
    tokio::time::sleep(delay).await;
    attempt_index += 1;
  }
}

/// Race `fut` against `timeout`. On expiry the future is dropped, abandoning the attempt,
/// and a retryable `TIMEOUT` error is returned.
pub async fn with_timeout<T, Fut>(timeout: Option<Duration>, fut: Fut) -> Result<T, ServiceError>
where
  Fut: Future<Output = Result<T, ServiceError>>,
{
  let Some(limit) = timeout else {
    return fut.await;
  };

  match tokio::time::timeout(limit, fut).await {
    Ok(result) => result,
    Err(_) => {
      let millis = limit.as_millis() as u64;
      tracing::debug!(timeout_ms = millis, "request timed out");
      Err(ServiceError::timeout(millis))
    }
  }
}
