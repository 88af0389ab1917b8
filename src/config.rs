use std::time::Duration;

/// Which in-flight record the consumer claims next.
///
/// This changes the observable order of results, so it is always an explicit
/// choice per queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalOrder {
  /// Oldest submission first.
  #[default]
  Fifo,
  /// Most recent submission first.
  Lifo,
}

/// How a consumer suspends while the registry is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
  /// Subscribe to the queue and get woken on the next insertion or termination.
  #[default]
  Notify,
  /// Re-check the registry every given interval. Response time is bounded
  /// below by the interval.
  Poll(Duration),
}

impl WaitStrategy {
  pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

  /// Polling with [`WaitStrategy::DEFAULT_POLL_INTERVAL`].
  pub fn poll() -> Self {
    WaitStrategy::Poll(Self::DEFAULT_POLL_INTERVAL)
  }
}

/// What a hard abort does with records whose operation has already settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbortPolicy {
  /// Cancel and drop every record still resident in the registry.
  #[default]
  DiscardAll,
  /// Cancel and drop only unsettled records; settled ones stay resident and
  /// are still yielded before the sequence ends.
  KeepSettled,
}

/// Per-queue configuration. `Default` gives FIFO order, notify-based waiting,
/// discard-all aborts and batch mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueConfig {
  pub order: RemovalOrder,
  pub wait: WaitStrategy,
  pub abort_policy: AbortPolicy,
  /// When set, the first consumer to find the registry empty closes the queue,
  /// so a single batch is drained and the result sequence ends.
  pub close_when_empty: bool,
}

impl QueueConfig {
  pub fn with_order(mut self, order: RemovalOrder) -> Self {
    self.order = order;
    self
  }

  pub fn with_wait(mut self, wait: WaitStrategy) -> Self {
    self.wait = wait;
    self
  }

  pub fn with_abort_policy(mut self, abort_policy: AbortPolicy) -> Self {
    self.abort_policy = abort_policy;
    self
  }

  pub fn with_close_when_empty(mut self, close_when_empty: bool) -> Self {
    self.close_when_empty = close_when_empty;
    self
  }
}
