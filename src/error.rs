use thiserror::Error;

/// Errors reported synchronously by the queue to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
  #[error("Queue is closed or terminated, cannot accept new requests")]
  QueueClosed,
}

/// Why a launched operation did not produce a value.
///
/// Every variant is delivered as data inside a [`ResultRecord`](crate::ResultRecord);
/// the result sequence itself never fails because of a single request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError<E> {
  /// The operation returned an error on its own.
  #[error("Operation failed: {0}")]
  Failed(E),

  /// The operation returned an error after its cancellation token was signaled.
  #[error("Operation aborted: {0}")]
  Aborted(E),

  #[error("Operation panicked")]
  Panicked,

  /// The spawned operation was dropped by the runtime before it settled,
  /// typically because the runtime itself is shutting down.
  #[error("Operation was interrupted by the runtime before settling")]
  Interrupted,
}

impl<E> OperationError<E> {
  /// Returns `true` for failures observed after cancellation was requested.
  pub fn is_aborted(&self) -> bool {
    matches!(self, OperationError::Aborted(_))
  }

  /// Returns the operation's own error value, if it produced one.
  pub fn inner(&self) -> Option<&E> {
    match self {
      OperationError::Failed(e) | OperationError::Aborted(e) => Some(e),
      OperationError::Panicked | OperationError::Interrupted => None,
    }
  }

  /// Consumes the error and returns the operation's own error value, if any.
  pub fn into_inner(self) -> Option<E> {
    match self {
      OperationError::Failed(e) | OperationError::Aborted(e) => Some(e),
      OperationError::Panicked | OperationError::Interrupted => None,
    }
  }
}
