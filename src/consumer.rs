use crate::config::WaitStrategy;
use crate::queue::QueueShared;
use crate::record::{InFlightRecord, ResultRecord};
use crate::registry::QueueState;

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, FusedStream};
use futures::StreamExt;
use tracing::{debug, info, trace, warn};

/// A pull-based consumer over a queue's results.
///
/// Each call to [`Results::next`] claims the next record per the queue's
/// removal order, waits for its operation to settle and yields it as a
/// [`ResultRecord`]. While the queue is empty but not terminated, `next`
/// suspends until a request is submitted or the queue terminates. Once `next`
/// has returned `None` it keeps returning `None`.
pub struct Results<T: Send + 'static, E: Send + 'static> {
  shared: Arc<QueueShared<T, E>>,
  claimed: Option<InFlightRecord<T, E>>,
  finished: bool,
}

impl<T: Send + 'static, E: Send + 'static> fmt::Debug for Results<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Results")
      .field("queue", &*self.shared.name)
      .field("claimed", &self.claimed)
      .field("finished", &self.finished)
      .finish()
  }
}

/// What `next` does after inspecting the registry.
enum Wait {
  Claimed,
  Finished,
  Retry,
  Subscribed(crate::signal::Subscription),
  Poll(std::time::Duration),
}

impl<T: Send + 'static, E: Send + 'static> Results<T, E> {
  pub(crate) fn new(shared: Arc<QueueShared<T, E>>) -> Self {
    Self {
      shared,
      claimed: None,
      finished: false,
    }
  }

  /// Returns `true` once the sequence has ended.
  pub fn is_finished(&self) -> bool {
    self.finished && self.claimed.is_none()
  }

  /// Yields the next result, or `None` once the queue has terminated.
  ///
  /// Cancel-safe: if this future is dropped while a claimed request is still
  /// running, the claim is kept and the next call resumes waiting on it.
  pub async fn next(&mut self) -> Option<ResultRecord<T, E>> {
    loop {
      if let Some(record) = self.claimed.as_mut() {
        let outcome = record.join().await;
        if let Some(record) = self.claimed.take() {
          let result = record.settle(outcome);
          self.shared.release_claim();
          debug!(
            queue = %*self.shared.name,
            request_id = result.id(),
            ok = result.is_ok(),
            "Yielding result."
          );
          return Some(result);
        }
      }

      if self.finished {
        return None;
      }

      match self.inspect() {
        Wait::Claimed | Wait::Retry => continue,
        Wait::Finished => {
          self.finished = true;
          debug!(queue = %*self.shared.name, "Result sequence ended.");
          return None;
        }
        Wait::Subscribed(mut subscription) => {
          trace!(queue = %*self.shared.name, "Registry empty. Waiting for a submission or termination.");
          subscription.fired().await;
        }
        Wait::Poll(interval) => {
          trace!(queue = %*self.shared.name, ?interval, "Registry empty. Polling again later.");
          tokio::time::sleep(interval).await;
        }
      }
    }
  }

  /// Adapts this consumer into a [`Stream`](futures::Stream) of results.
  ///
  /// The stream is fused: once it has ended it keeps yielding `None`.
  pub fn into_stream(self) -> impl FusedStream<Item = ResultRecord<T, E>> {
    stream::unfold(self, |mut results| async move {
      let next = results.next().await?;
      Some((next, results))
    })
    .fuse()
  }

  // Claims the next record or decides how to wait, all under one lock so no
  // insertion or termination can slip between the check and the subscription.
  fn inspect(&mut self) -> Wait {
    let mut registry = self.shared.registry.lock();

    if let Some(record) = registry.claim_next() {
      trace!(queue = %*self.shared.name, request_id = record.request_id, "Claimed request.");
      self.claimed = Some(record);
      return Wait::Claimed;
    }

    if registry.state() == QueueState::Terminated {
      return Wait::Finished;
    }

    if self.shared.config.close_when_empty && registry.begin_draining() {
      info!(queue = %*self.shared.name, "Registry drained in close-when-empty mode. Closing queue.");
      if registry.settle() {
        self.shared.announce_terminated();
      }
      return Wait::Retry;
    }

    match self.shared.config.wait {
      WaitStrategy::Notify => Wait::Subscribed(self.shared.signal.subscribe()),
      WaitStrategy::Poll(interval) => Wait::Poll(interval),
    }
  }
}

impl<T: Send + 'static, E: Send + 'static> Drop for Results<T, E> {
  fn drop(&mut self) {
    if let Some(record) = self.claimed.take() {
      warn!(
        queue = %*self.shared.name,
        request_id = record.request_id,
        "Results dropped while holding a claimed request. Abandoning it."
      );
      record.cancel();
      self.shared.release_claim();
    }
  }
}
