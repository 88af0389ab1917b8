use crate::config::RemovalOrder;
use crate::record::InFlightRecord;

use std::collections::VecDeque;
use std::fmt;

/// Lifecycle of a queue.
///
/// `Open --close/abort--> Draining --registry empty, no claims--> Terminated`.
/// `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
  /// Accepting submissions and yielding results.
  Open,
  /// No longer accepting submissions; finishing what is already in flight.
  Draining,
  /// No further results will be yielded.
  Terminated,
}

/// The ordered set of launched-but-unclaimed records, plus the queue state.
///
/// Not synchronized on its own: the owning queue keeps it behind a single lock
/// and never holds that lock across an await.
pub(crate) struct Registry<T: Send + 'static, E: Send + 'static> {
  records: VecDeque<InFlightRecord<T, E>>,
  order: RemovalOrder,
  state: QueueState,
  /// Records removed by a consumer whose result has not been yielded yet.
  claimed: usize,
}

impl<T: Send + 'static, E: Send + 'static> fmt::Debug for Registry<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Registry")
      .field("len", &self.records.len())
      .field("order", &self.order)
      .field("state", &self.state)
      .field("claimed", &self.claimed)
      .finish()
  }
}

impl<T: Send + 'static, E: Send + 'static> Registry<T, E> {
  pub(crate) fn new(order: RemovalOrder) -> Self {
    Self {
      records: VecDeque::new(),
      order,
      state: QueueState::Open,
      claimed: 0,
    }
  }

  pub(crate) fn state(&self) -> QueueState {
    self.state
  }

  pub(crate) fn accepts_submissions(&self) -> bool {
    self.state == QueueState::Open
  }

  pub(crate) fn len(&self) -> usize {
    self.records.len()
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub(crate) fn claimed(&self) -> usize {
    self.claimed
  }

  /// Appends a freshly launched record. Callers check `accepts_submissions`
  /// under the same lock first.
  pub(crate) fn insert(&mut self, record: InFlightRecord<T, E>) {
    debug_assert_eq!(self.state, QueueState::Open, "insert into a closed registry");
    self.records.push_back(record);
  }

  /// Removes the next record per the configured order, without claiming it.
  pub(crate) fn remove_next(&mut self) -> Option<InFlightRecord<T, E>> {
    match self.order {
      RemovalOrder::Fifo => self.records.pop_front(),
      RemovalOrder::Lifo => self.records.pop_back(),
    }
  }

  /// Removes the next record and counts it as claimed by a consumer until
  /// [`Registry::release_claim`] is called.
  pub(crate) fn claim_next(&mut self) -> Option<InFlightRecord<T, E>> {
    let record = self.remove_next()?;
    self.claimed += 1;
    Some(record)
  }

  /// Ends a claim. Returns `true` if this moved the queue to `Terminated`.
  pub(crate) fn release_claim(&mut self) -> bool {
    debug_assert!(self.claimed > 0, "claim released twice");
    self.claimed = self.claimed.saturating_sub(1);
    self.settle()
  }

  /// Removes every resident record.
  pub(crate) fn drain_all(&mut self) -> Vec<InFlightRecord<T, E>> {
    self.records.drain(..).collect()
  }

  /// Removes every resident record whose operation has not settled yet,
  /// keeping the settled ones in their original order.
  pub(crate) fn drain_unsettled(&mut self) -> Vec<InFlightRecord<T, E>> {
    let (settled, unsettled): (VecDeque<_>, VecDeque<_>) = self.records.drain(..).partition(|r| r.is_settled());
    self.records = settled;
    unsettled.into()
  }

  /// `Open -> Draining`. Returns `true` if the state changed.
  pub(crate) fn begin_draining(&mut self) -> bool {
    if self.state == QueueState::Open {
      self.state = QueueState::Draining;
      true
    } else {
      false
    }
  }

  /// `Draining -> Terminated` once nothing is resident or claimed.
  /// Returns `true` if this call performed the transition.
  pub(crate) fn settle(&mut self) -> bool {
    if self.state == QueueState::Draining && self.is_empty() && self.claimed == 0 {
      self.state = QueueState::Terminated;
      true
    } else {
      false
    }
  }
}
