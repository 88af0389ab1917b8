use crate::error::OperationError;
use crate::request::RequestDescriptor;

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// What a launched operation settles to once panics and failures are folded in.
pub(crate) type Outcome<T, E> = Result<T, OperationError<E>>;

/// A launched operation that has not been handed to a consumer yet.
///
/// The record owns the only queue-side clone of the cancellation token. It is
/// released either by [`InFlightRecord::settle`] or by [`InFlightRecord::cancel`],
/// both of which consume the record.
pub(crate) struct InFlightRecord<T: Send + 'static, E: Send + 'static> {
  pub(crate) request_id: u64,
  pub(crate) request: Arc<RequestDescriptor>,
  pub(crate) pending: JoinHandle<Outcome<T, E>>,
  pub(crate) cancellation: CancellationToken,
}

impl<T: Send + 'static, E: Send + 'static> fmt::Debug for InFlightRecord<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("InFlightRecord")
      .field("request_id", &self.request_id)
      .field("target", &self.request.target())
      .field("settled", &self.pending.is_finished())
      .finish_non_exhaustive()
  }
}

impl<T: Send + 'static, E: Send + 'static> InFlightRecord<T, E> {
  /// Returns `true` once the underlying operation has produced its outcome.
  pub(crate) fn is_settled(&self) -> bool {
    self.pending.is_finished()
  }

  /// Waits for the already running operation to settle.
  ///
  /// Cancel-safe: dropping this future leaves the record intact and joinable
  /// again. Must not be called again after it has returned.
  pub(crate) async fn join(&mut self) -> Outcome<T, E> {
    match (&mut self.pending).await {
      Ok(outcome) => outcome,
      Err(join_error) if join_error.is_panic() => {
        error!(request_id = self.request_id, "Operation task panicked outside of the catch guard.");
        Err(OperationError::Panicked)
      }
      Err(join_error) => {
        warn!(request_id = self.request_id, "Operation task was interrupted: {}", join_error);
        Err(OperationError::Interrupted)
      }
    }
  }

  /// Normalizes a settled record into its terminal [`ResultRecord`], releasing
  /// the cancellation handle.
  pub(crate) fn settle(self, outcome: Outcome<T, E>) -> ResultRecord<T, E> {
    let InFlightRecord {
      request_id,
      request,
      pending,
      cancellation,
    } = self;
    drop(cancellation);
    drop(pending);

    ResultRecord {
      request_id,
      request,
      outcome,
    }
  }

  /// Signals cancellation to the operation and discards the record.
  ///
  /// The operation task is detached, not killed; it stops only if it observes
  /// its token.
  pub(crate) fn cancel(self) {
    debug!(request_id = self.request_id, request_target = %self.request.target(), "Signaling cancellation for in-flight request.");
    self.cancellation.cancel();
  }
}

/// The terminal, uniform outcome of one submitted request.
#[derive(Debug)]
pub struct ResultRecord<T, E> {
  request_id: u64,
  request: Arc<RequestDescriptor>,
  outcome: Outcome<T, E>,
}

impl<T, E> ResultRecord<T, E> {
  /// The id returned by `submit` for this request.
  pub fn id(&self) -> u64 {
    self.request_id
  }

  /// The descriptor this result was produced for.
  pub fn request(&self) -> &RequestDescriptor {
    &self.request
  }

  pub fn is_ok(&self) -> bool {
    self.outcome.is_ok()
  }

  /// The value, if the operation succeeded.
  pub fn data(&self) -> Option<&T> {
    self.outcome.as_ref().ok()
  }

  /// The failure, if the operation did not succeed.
  pub fn error(&self) -> Option<&OperationError<E>> {
    self.outcome.as_ref().err()
  }

  pub fn into_result(self) -> Result<T, OperationError<E>> {
    self.outcome
  }

  /// Splits the record into its request descriptor and outcome.
  pub fn into_parts(self) -> (Arc<RequestDescriptor>, Result<T, OperationError<E>>) {
    (self.request, self.outcome)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn spawned_record(
    request_id: u64,
    outcome: Outcome<String, String>,
  ) -> InFlightRecord<String, String> {
    InFlightRecord {
      request_id,
      request: Arc::new(RequestDescriptor::new(format!("record-{}", request_id))),
      pending: tokio::spawn(async move { outcome }),
      cancellation: CancellationToken::new(),
    }
  }

  #[tokio::test]
  async fn test_settle_success() {
    let mut record = spawned_record(1, Ok("payload".to_string()));
    let outcome = record.join().await;
    let result = record.settle(outcome);

    assert_eq!(result.id(), 1);
    assert_eq!(result.request().target(), "record-1");
    assert!(result.is_ok());
    assert_eq!(result.data(), Some(&"payload".to_string()));
    assert!(result.error().is_none());
  }

  #[tokio::test]
  async fn test_settle_failure_carries_error() {
    let mut record = spawned_record(2, Err(OperationError::Failed("boom".to_string())));
    let outcome = record.join().await;
    let result = record.settle(outcome);

    assert!(!result.is_ok());
    assert!(result.data().is_none());
    assert_eq!(result.error(), Some(&OperationError::Failed("boom".to_string())));
  }

  #[tokio::test]
  async fn test_join_maps_escaped_panic() {
    let explode = || -> Outcome<String, String> { panic!("escaped the guard") };
    let mut record: InFlightRecord<String, String> = InFlightRecord {
      request_id: 3,
      request: Arc::new(RequestDescriptor::new("panics")),
      pending: tokio::spawn(async move { explode() }),
      cancellation: CancellationToken::new(),
    };
    assert_eq!(record.join().await, Err(OperationError::Panicked));
  }

  #[tokio::test]
  async fn test_join_maps_runtime_shutdown_to_interrupted() {
    // The operation lives on its own runtime, which goes away before it settles.
    let side_runtime = tokio::runtime::Builder::new_current_thread()
      .enable_time()
      .build()
      .expect("failed to build side runtime");
    let pending = side_runtime.spawn(async {
      tokio::time::sleep(std::time::Duration::from_secs(60)).await;
      Ok::<_, OperationError<String>>("never".to_string())
    });
    let mut record: InFlightRecord<String, String> = InFlightRecord {
      request_id: 5,
      request: Arc::new(RequestDescriptor::new("interrupted")),
      pending,
      cancellation: CancellationToken::new(),
    };
    side_runtime.shutdown_background();

    let outcome = tokio::time::timeout(std::time::Duration::from_secs(1), record.join())
      .await
      .expect("join did not observe the runtime shutdown");
    assert_eq!(outcome, Err(OperationError::Interrupted));
    assert!(outcome.unwrap_err().inner().is_none());
  }

  #[tokio::test]
  async fn test_cancel_signals_token() {
    let record = spawned_record(4, Ok("late".to_string()));
    let observer = record.cancellation.clone();
    record.cancel();
    assert!(observer.is_cancelled());
  }
}
