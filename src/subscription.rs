//! Subscription trait: the live link between a publisher and a subscriber.

use std::sync::Arc;

use crate::demand::Demand;

pub mod dynamic;
pub mod state;
pub use dynamic::*;
pub use state::*;

/// Handle a subscriber uses to grant credit and to cancel.
///
/// `cancel` is idempotent and terminal, and never calls back into the
/// subscriber that owns this subscription.
pub trait Subscription: Send + Sync {
  /// Adds `demand` to the outstanding credit. Granting credit after it ran
  /// out resumes delivery.
  fn request(&self, demand: Demand);

  /// Stops delivery and releases every resource held for the subscriber.
  fn cancel(&self);
}

/// Type-erased subscription as handed to [`Subscriber::on_subscribe`].
///
/// [`Subscriber::on_subscribe`]: crate::subscriber::Subscriber::on_subscribe
pub type BoxedSubscription = Arc<dyn Subscription>;

impl<T: Subscription + ?Sized> Subscription for Arc<T> {
  #[inline]
  fn request(&self, demand: Demand) { (**self).request(demand) }

  #[inline]
  fn cancel(&self) { (**self).cancel() }
}

/// Subscription for publishers that complete before any value can be
/// requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySubscription;

impl EmptySubscription {
  #[inline]
  pub fn boxed() -> BoxedSubscription { Arc::new(EmptySubscription) }
}

impl Subscription for EmptySubscription {
  #[inline]
  fn request(&self, _demand: Demand) {}

  #[inline]
  fn cancel(&self) {}
}

/// An RAII implementation of a "scoped subscribed" of a subscription.
/// When this structure is dropped (falls out of scope), the subscription is
/// cancelled.
///
/// If you want to drop it immediately, wrap it in its own scope, or call
/// [`detach`](SubscriptionGuard::detach) to keep the stream running after the
/// guard is gone.
#[must_use]
pub struct SubscriptionGuard<T: Subscription>(Option<T>);

impl<T: Subscription> SubscriptionGuard<T> {
  /// Wraps an existing subscription with a guard to enable RAII behavior for
  /// it.
  pub fn new(subscription: T) -> SubscriptionGuard<T> { SubscriptionGuard(Some(subscription)) }

  /// Requests more values through the guarded subscription.
  pub fn request(&self, demand: Demand) {
    if let Some(subscription) = &self.0 {
      subscription.request(demand);
    }
  }

  /// Cancels now instead of at drop time.
  pub fn cancel(mut self) {
    if let Some(subscription) = self.0.take() {
      subscription.cancel();
    }
  }

  /// Releases the subscription without cancelling it.
  pub fn detach(mut self) -> T {
    match self.0.take() {
      Some(subscription) => subscription,
      None => unreachable!("guard only empties itself when consumed"),
    }
  }
}

impl<T: Subscription> Drop for SubscriptionGuard<T> {
  #[inline]
  fn drop(&mut self) {
    if let Some(subscription) = self.0.take() {
      subscription.cancel();
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  #[derive(Default)]
  struct Counting {
    requested: AtomicUsize,
    cancelled: AtomicUsize,
  }

  impl Subscription for Counting {
    fn request(&self, demand: Demand) {
      self.requested.fetch_add(demand.max_count().unwrap_or(0) as usize, Ordering::SeqCst);
    }

    fn cancel(&self) { self.cancelled.fetch_add(1, Ordering::SeqCst); }
  }

  #[rxflow_macro::test]
  fn guard_cancels_on_drop() {
    let counting = Arc::new(Counting::default());
    {
      let guard = SubscriptionGuard::new(counting.clone());
      guard.request(Demand::max(3));
    }
    assert_eq!(counting.requested.load(Ordering::SeqCst), 3);
    assert_eq!(counting.cancelled.load(Ordering::SeqCst), 1);
  }

  #[rxflow_macro::test]
  fn explicit_cancel_runs_once() {
    let counting = Arc::new(Counting::default());
    SubscriptionGuard::new(counting.clone()).cancel();
    assert_eq!(counting.cancelled.load(Ordering::SeqCst), 1);
  }

  #[rxflow_macro::test]
  fn detach_keeps_running() {
    let counting = Arc::new(Counting::default());
    let inner = SubscriptionGuard::new(counting.clone()).detach();
    drop(inner);
    assert_eq!(counting.cancelled.load(Ordering::SeqCst), 0);
  }
}
