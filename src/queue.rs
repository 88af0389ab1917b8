use crate::config::{AbortPolicy, QueueConfig};
use crate::consumer::Results;
use crate::error::QueueError;
use crate::launcher::Launch;
use crate::record::InFlightRecord;
use crate::registry::{QueueState, Registry};
use crate::request::{share_operation, RequestDescriptor, SharedOperation};
use crate::signal::Signal;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// State shared between a queue handle and its result consumers.
pub(crate) struct QueueShared<T: Send + 'static, E: Send + 'static> {
  pub(crate) name: Arc<String>,
  pub(crate) config: QueueConfig,
  pub(crate) registry: Mutex<Registry<T, E>>,
  pub(crate) signal: Signal,
}

impl<T: Send + 'static, E: Send + 'static> QueueShared<T, E> {
  /// Graceful close. Returns `true` if this call moved the queue out of `Open`.
  pub(crate) fn close(&self) -> bool {
    let mut registry = self.registry.lock();
    let changed = registry.begin_draining();
    if changed {
      info!(
        queue = %*self.name,
        resident = registry.len(),
        claimed = registry.claimed(),
        "Queue closed. Draining remaining requests."
      );
    }
    if registry.settle() {
      self.announce_terminated();
    }
    changed
  }

  /// Hard abort. Returns how many records were signaled for cancellation.
  pub(crate) fn abort(&self) -> usize {
    let victims: Vec<InFlightRecord<T, E>> = {
      let mut registry = self.registry.lock();
      if registry.state() == QueueState::Terminated {
        trace!(queue = %*self.name, "Abort on a terminated queue. Nothing to do.");
        return 0;
      }
      let victims = match self.config.abort_policy {
        AbortPolicy::DiscardAll => registry.drain_all(),
        AbortPolicy::KeepSettled => registry.drain_unsettled(),
      };
      registry.begin_draining();
      info!(
        queue = %*self.name,
        cancelled = victims.len(),
        kept = registry.len(),
        claimed = registry.claimed(),
        "Queue aborted."
      );
      if registry.settle() {
        self.announce_terminated();
      }
      victims
    };

    let cancelled = victims.len();
    for record in victims {
      record.cancel();
    }
    cancelled
  }

  /// Ends a consumer's claim on a record.
  pub(crate) fn release_claim(&self) {
    let mut registry = self.registry.lock();
    if registry.release_claim() {
      self.announce_terminated();
    }
  }

  /// Must be called with the registry lock held, right after the transition.
  pub(crate) fn announce_terminated(&self) {
    info!(queue = %*self.name, "Queue terminated. No further results will be yielded.");
    self.signal.notify_all();
  }
}

/// A queue that launches requests immediately on submission and hands their
/// results to consumers as they are pulled.
///
/// Dropping the last handle closes the queue gracefully, so consumers still
/// drain what is in flight and then end.
pub struct RequestQueue<T: Send + 'static, E: Send + 'static> {
  shared: Arc<QueueShared<T, E>>,
  operation: SharedOperation<T, E>,
  tokio_handle: TokioHandle,
  next_request_id: AtomicU64,
}

impl<T: Send + 'static, E: Send + 'static> RequestQueue<T, E> {
  /// Creates a queue with the default [`QueueConfig`].
  ///
  /// `operation` is invoked once per submission with the shared descriptor and
  /// a cancellation token it should observe.
  pub fn new<F, Fut>(operation: F, tokio_handle: TokioHandle, queue_name: &str) -> Arc<Self>
  where
    F: Fn(Arc<RequestDescriptor>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
  {
    Self::with_config(operation, tokio_handle, queue_name, QueueConfig::default())
  }

  pub fn with_config<F, Fut>(
    operation: F,
    tokio_handle: TokioHandle,
    queue_name: &str,
    config: QueueConfig,
  ) -> Arc<Self>
  where
    F: Fn(Arc<RequestDescriptor>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
  {
    info!(queue = %queue_name, ?config, "Creating request queue.");
    Arc::new(Self {
      shared: Arc::new(QueueShared {
        name: Arc::new(queue_name.to_string()),
        registry: Mutex::new(Registry::new(config.order)),
        config,
        signal: Signal::new(),
      }),
      operation: share_operation(operation),
      tokio_handle,
      next_request_id: AtomicU64::new(0),
    })
  }

  pub fn name(&self) -> &str {
    &self.shared.name
  }

  pub fn config(&self) -> &QueueConfig {
    &self.shared.config
  }

  pub fn state(&self) -> QueueState {
    self.shared.registry.lock().state()
  }

  pub fn is_terminated(&self) -> bool {
    self.state() == QueueState::Terminated
  }

  /// Number of launched requests not yet claimed by a consumer.
  pub fn queued_count(&self) -> usize {
    self.shared.registry.lock().len()
  }

  /// Number of requests claimed by a consumer whose result is not yielded yet.
  pub fn claimed_count(&self) -> usize {
    self.shared.registry.lock().claimed()
  }

  /// Starts `descriptor`'s operation immediately and queues its record.
  ///
  /// Never waits for the operation. Returns the request id that the matching
  /// [`ResultRecord`](crate::ResultRecord) will carry.
  ///
  /// # Errors
  /// Returns `QueueError::QueueClosed` once the queue has been closed or
  /// aborted; nothing is launched in that case.
  pub fn submit(&self, descriptor: RequestDescriptor) -> Result<u64, QueueError> {
    if !self.shared.registry.lock().accepts_submissions() {
      warn!(queue = %*self.shared.name, request_target = %descriptor.target(), "Submit: Queue is closed, rejecting request.");
      return Err(QueueError::QueueClosed);
    }

    let request_id = self.next_request_id.fetch_add(1, AtomicOrdering::Relaxed);
    // The operation builds its future outside the lock; nothing runs until `start`.
    let launch = Launch::prepare(request_id, descriptor, &self.operation);

    let mut registry = self.shared.registry.lock();
    if !registry.accepts_submissions() {
      warn!(queue = %*self.shared.name, request_id, "Submit: Queue closed while preparing request, discarding it.");
      return Err(QueueError::QueueClosed);
    }
    let record = launch.start(&self.tokio_handle, &self.shared.name);
    debug!(
      queue = %*self.shared.name,
      request_id,
      request_target = %record.request.target(),
      queued = registry.len() + 1,
      "Request launched and queued."
    );
    registry.insert(record);
    self.shared.signal.notify_all();
    Ok(request_id)
  }

  /// Returns a consumer over this queue's results.
  pub fn results(&self) -> Results<T, E> {
    Results::new(self.shared.clone())
  }

  /// Stops accepting submissions. Requests already in flight are still yielded,
  /// after which result sequences end. Idempotent.
  pub fn close(&self) {
    if !self.shared.close() {
      trace!(queue = %*self.shared.name, "Close: Queue already closed.");
    }
  }

  /// Cancels and discards every request not yet claimed by a consumer, and stops
  /// accepting submissions. Records already claimed still yield. Idempotent.
  ///
  /// Returns how many requests were signaled for cancellation by this call.
  pub fn abort(&self) -> usize {
    self.shared.abort()
  }
}

impl<T: Send + 'static, E: Send + 'static> Drop for RequestQueue<T, E> {
  fn drop(&mut self) {
    if self.shared.close() {
      info!(queue = %*self.shared.name, "RequestQueue dropped. Closed implicitly.");
    } else {
      trace!(queue = %*self.shared.name, "Drop: Queue already closed. No new signals sent.");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn instant_queue() -> Arc<RequestQueue<String, String>> {
    RequestQueue::new(
      |request: Arc<RequestDescriptor>, _token| async move { Ok(request.target().to_string()) },
      TokioHandle::current(),
      "queue_unit_test",
    )
  }

  #[tokio::test]
  async fn test_request_ids_are_sequential_per_queue() {
    let first = instant_queue();
    let second = instant_queue();

    assert_eq!(first.submit(RequestDescriptor::new("a")), Ok(0));
    assert_eq!(first.submit(RequestDescriptor::new("b")), Ok(1));
    assert_eq!(second.submit(RequestDescriptor::new("c")), Ok(0));
    assert_eq!(first.queued_count(), 2);
    assert_eq!(second.queued_count(), 1);
  }

  #[tokio::test]
  async fn test_close_with_nothing_in_flight_terminates() {
    let queue = instant_queue();
    assert_eq!(queue.state(), QueueState::Open);
    queue.close();
    assert!(queue.is_terminated());
  }

  #[tokio::test]
  async fn test_close_with_work_in_flight_drains() {
    let queue = instant_queue();
    queue.submit(RequestDescriptor::new("a")).unwrap();
    queue.close();
    assert_eq!(queue.state(), QueueState::Draining);
    assert_eq!(queue.queued_count(), 1);
  }

  #[tokio::test]
  async fn test_abort_reports_cancelled_count_once() {
    let queue = instant_queue();
    queue.submit(RequestDescriptor::new("a")).unwrap();
    queue.submit(RequestDescriptor::new("b")).unwrap();

    assert_eq!(queue.abort(), 2);
    assert_eq!(queue.abort(), 0);
    assert!(queue.is_terminated());
    assert_eq!(queue.queued_count(), 0);
  }
}
