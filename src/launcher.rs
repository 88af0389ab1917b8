use crate::error::OperationError;
use crate::record::{InFlightRecord, Outcome};
use crate::request::{OperationFuture, RequestDescriptor, SharedOperation};

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle as TokioHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info_span, trace, Instrument};

/// An operation future that has been built but not started yet.
///
/// Launching is split in two so the caller-supplied function runs outside the
/// registry lock, while the spawn itself happens under it. A `Launch` that is
/// dropped without being started never runs, since futures are lazy.
pub(crate) struct Launch<T: Send + 'static, E: Send + 'static> {
  request_id: u64,
  request: Arc<RequestDescriptor>,
  cancellation: CancellationToken,
  future: OperationFuture<T, E>,
}

impl<T: Send + 'static, E: Send + 'static> Launch<T, E> {
  /// Creates the cancellation handle and asks the operation for its future.
  pub(crate) fn prepare(
    request_id: u64,
    request: RequestDescriptor,
    operation: &SharedOperation<T, E>,
  ) -> Self {
    let request = Arc::new(request);
    let cancellation = CancellationToken::new();
    let future = operation(request.clone(), cancellation.clone());
    Self {
      request_id,
      request,
      cancellation,
      future,
    }
  }

  /// Spawns the operation on `tokio_handle` and returns its record. Never
  /// suspends.
  pub(crate) fn start(self, tokio_handle: &TokioHandle, queue_name: &str) -> InFlightRecord<T, E> {
    let Launch {
      request_id,
      request,
      cancellation,
      future,
    } = self;

    let task_token = cancellation.clone();
    let span = info_span!(
      "request_operation",
      queue = %queue_name,
      request_id,
      request_target = %request.target()
    );

    let pending = tokio_handle.spawn(
      async move {
        let outcome: Outcome<T, E> = match AssertUnwindSafe(future).catch_unwind().await {
          Ok(Ok(value)) => {
            trace!("Operation resolved.");
            Ok(value)
          }
          Ok(Err(e)) if task_token.is_cancelled() => {
            trace!("Operation rejected after cancellation was signaled.");
            Err(OperationError::Aborted(e))
          }
          Ok(Err(e)) => {
            trace!("Operation rejected.");
            Err(OperationError::Failed(e))
          }
          Err(_panic_payload) => {
            error!("Operation panicked during execution.");
            Err(OperationError::Panicked)
          }
        };
        outcome
      }
      .instrument(span),
    );

    InFlightRecord {
      request_id,
      request,
      pending,
      cancellation,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::request::share_operation;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  #[tokio::test]
  async fn test_prepare_does_not_start_the_future() {
    let polled = Arc::new(AtomicUsize::new(0));
    let polled_in_op = polled.clone();
    let operation = share_operation(move |_request, _token| {
      let polled = polled_in_op.clone();
      async move {
        polled.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(())
      }
    });

    let launch = Launch::prepare(1, RequestDescriptor::new("lazy"), &operation);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(polled.load(Ordering::SeqCst), 0);

    drop(launch);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(polled.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_start_runs_without_being_awaited() {
    let polled = Arc::new(AtomicUsize::new(0));
    let polled_in_op = polled.clone();
    let operation = share_operation(move |_request, _token| {
      let polled = polled_in_op.clone();
      async move {
        polled.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(())
      }
    });

    let record = Launch::prepare(1, RequestDescriptor::new("eager"), &operation)
      .start(&TokioHandle::current(), "launcher_test");
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(polled.load(Ordering::SeqCst), 1);
    assert!(record.is_settled());
  }

  #[tokio::test]
  async fn test_rejection_after_cancel_is_aborted() {
    let operation = share_operation(|_request, token: CancellationToken| async move {
      token.cancelled().await;
      Err::<(), _>("stopped".to_string())
    });

    let mut record = Launch::prepare(7, RequestDescriptor::new("cancellable"), &operation)
      .start(&TokioHandle::current(), "launcher_test");
    record.cancellation.cancel();

    assert_eq!(record.join().await, Err(OperationError::Aborted("stopped".to_string())));
  }

  #[tokio::test]
  async fn test_panic_is_caught() {
    let operation = share_operation(|request: Arc<RequestDescriptor>, _token| async move {
      if request.target() == "explode" {
        panic!("operation blew up");
      }
      Ok::<(), String>(())
    });

    let mut record = Launch::prepare(9, RequestDescriptor::new("explode"), &operation)
      .start(&TokioHandle::current(), "launcher_test");

    assert_eq!(record.join().await, Err(OperationError::Panicked));
  }
}
