//! Wait-for-nonempty signal: a minimal observer list with single-fire,
//! self-unsubscribing subscriptions.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

struct Observers {
  next_id: u64,
  waiting: Vec<(u64, oneshot::Sender<()>)>,
}

/// A list of parked waiters that are all released on the next `notify_all`.
#[derive(Clone)]
pub(crate) struct Signal {
  observers: Arc<Mutex<Observers>>,
}

impl fmt::Debug for Signal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Signal").field("waiting", &self.waiting()).finish()
  }
}

impl Default for Signal {
  fn default() -> Self {
    Self::new()
  }
}

impl Signal {
  pub(crate) fn new() -> Self {
    Self {
      observers: Arc::new(Mutex::new(Observers {
        next_id: 0,
        waiting: Vec::new(),
      })),
    }
  }

  /// Registers a waiter. The returned subscription fires at most once and
  /// removes itself from the list when dropped.
  pub(crate) fn subscribe(&self) -> Subscription {
    let (tx, rx) = oneshot::channel();
    let mut guard = self.observers.lock();
    let id = guard.next_id;
    guard.next_id = guard.next_id.wrapping_add(1);
    guard.waiting.push((id, tx));
    trace!(subscription_id = id, waiting = guard.waiting.len(), "Signal: subscribed.");

    Subscription {
      id,
      observers: self.observers.clone(),
      rx,
    }
  }

  /// Wakes every current waiter and empties the list. Returns how many were woken.
  pub(crate) fn notify_all(&self) -> usize {
    let waiting = std::mem::take(&mut self.observers.lock().waiting);
    let woken = waiting.len();
    for (_, tx) in waiting {
      // A receiver dropped between subscribe and now is already gone.
      let _ = tx.send(());
    }
    if woken > 0 {
      trace!(woken, "Signal: notified waiters.");
    }
    woken
  }

  pub(crate) fn waiting(&self) -> usize {
    self.observers.lock().waiting.len()
  }
}

/// One parked waiter. Await [`Subscription::fired`] to suspend until notified.
pub(crate) struct Subscription {
  id: u64,
  observers: Arc<Mutex<Observers>>,
  rx: oneshot::Receiver<()>,
}

impl fmt::Debug for Subscription {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subscription").field("id", &self.id).finish_non_exhaustive()
  }
}

impl Subscription {
  /// Resolves once the signal fires. Also resolves if the signal itself is
  /// gone, so a waiter can never be stranded.
  pub(crate) async fn fired(&mut self) {
    let _ = (&mut self.rx).await;
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    let mut guard = self.observers.lock();
    let before = guard.waiting.len();
    guard.waiting.retain(|(id, _)| *id != self.id);
    if guard.waiting.len() != before {
      trace!(subscription_id = self.id, "Signal: unsubscribed before firing.");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn test_notify_wakes_all_waiters_once() {
    let signal = Signal::new();
    let mut first = signal.subscribe();
    let mut second = signal.subscribe();
    assert_eq!(signal.waiting(), 2);

    assert_eq!(signal.notify_all(), 2);
    assert_eq!(signal.waiting(), 0);

    tokio::time::timeout(Duration::from_millis(50), first.fired())
      .await
      .expect("first waiter was not woken");
    tokio::time::timeout(Duration::from_millis(50), second.fired())
      .await
      .expect("second waiter was not woken");

    assert_eq!(signal.notify_all(), 0, "Fired subscriptions must not be notified again");
  }

  #[tokio::test]
  async fn test_waiter_blocks_until_notified() {
    let signal = Signal::new();
    let mut subscription = signal.subscribe();

    let waited = tokio::time::timeout(Duration::from_millis(50), subscription.fired()).await;
    assert!(waited.is_err(), "Subscription fired without a notification");

    let notifier = signal.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(20)).await;
      notifier.notify_all();
    });

    tokio::time::timeout(Duration::from_millis(500), subscription.fired())
      .await
      .expect("waiter was not woken by notify_all");
  }

  #[test]
  fn test_drop_unsubscribes() {
    let signal = Signal::new();
    let subscription = signal.subscribe();
    let _kept = signal.subscribe();
    assert_eq!(signal.waiting(), 2);

    drop(subscription);
    assert_eq!(signal.waiting(), 1);
  }

  #[tokio::test]
  async fn test_fired_resolves_when_signal_is_gone() {
    let signal = Signal::new();
    let mut subscription = signal.subscribe();
    // Dropping every sender closes the channel.
    signal.observers.lock().waiting.clear();
    drop(signal);

    tokio::time::timeout(Duration::from_millis(50), subscription.fired())
      .await
      .expect("orphaned subscription never resolved");
  }
}
