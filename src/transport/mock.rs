//! Scripted transport for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{Transport, TransportError, TransportRequest};

enum Step {
  Reply {
    delay: Duration,
    result: Result<Value, TransportError>,
  },
  Hang,
  Panic,
}

/// Replays scripted replies in order and records every request it receives.
#[derive(Default)]
pub struct ScriptedTransport {
  steps: Mutex<VecDeque<Step>>,
  calls: AtomicUsize,
  requests: Mutex<Vec<(Instant, TransportRequest)>>,
  cancelled: AtomicBool,
}

impl ScriptedTransport {
  pub fn new() -> Self {
    Self::default()
  }

  fn push(self, step: Step) -> Self {
    self.steps.lock().unwrap().push_back(step);
    self
  }

  pub fn ok(self, value: Value) -> Self {
    self.ok_after(Duration::ZERO, value)
  }

  pub fn ok_after(self, delay: Duration, value: Value) -> Self {
    self.push(Step::Reply {
      delay,
      result: Ok(value),
    })
  }

  pub fn status(self, status: u16) -> Self {
    self.push(Step::Reply {
      delay: Duration::ZERO,
      result: Err(TransportError::Status {
        status,
        message: format!("status {}", status),
      }),
    })
  }

  pub fn network_error(self) -> Self {
    self.push(Step::Reply {
      delay: Duration::ZERO,
      result: Err(TransportError::Network("connection reset".into())),
    })
  }

  /// Never answer; records whether the pending call was dropped.
  pub fn hang(self) -> Self {
    self.push(Step::Hang)
  }

  /// Panic inside the call, as a broken transport would.
  pub fn panic(self) -> Self {
    self.push(Step::Panic)
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn requests(&self) -> Vec<TransportRequest> {
    let requests = self.requests.lock().unwrap();
    requests.iter().map(|(_, r)| r.clone()).collect()
  }

  /// Times at which each request was received.
  pub fn sent_at(&self) -> Vec<Instant> {
    let requests = self.requests.lock().unwrap();
    requests.iter().map(|(at, _)| *at).collect()
  }

  pub fn was_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }
}

struct CancelOnDrop<'a>(&'a AtomicBool);

impl Drop for CancelOnDrop<'_> {
  fn drop(&mut self) {
    self.0.store(true, Ordering::SeqCst);
  }
}

#[async_trait]
impl Transport for ScriptedTransport {
  async fn send(&self, request: &TransportRequest) -> Result<Value, TransportError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self
      .requests
      .lock()
      .unwrap()
      .push((Instant::now(), request.clone()));

    let step = self.steps.lock().unwrap().pop_front();
    match step {
      Some(Step::Reply { delay, result }) => {
        if !delay.is_zero() {
          tokio::time::sleep(delay).await;
        }
        result
      }
      Some(Step::Hang) => {
        let _cancel = CancelOnDrop(&self.cancelled);
        std::future::pending::<()>().await;
        Err(TransportError::Network("unreachable".into()))
      }
      Some(Step::Panic) => panic!("scripted transport panic"),
      None => Err(TransportError::Network("no scripted reply left".into())),
    }
  }
}
