use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
  demand::Demand,
  subscriber::{Completion, Subscriber},
  subscription::BoxedSubscription,
};

/// One recorded signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T, E> {
  Subscribed,
  Value(T),
  Completion(Completion<E>),
}

/// Records the ordered signals it receives.
///
/// On subscription it requests `initial`; every received value grants
/// `per_value` more. Further credit can be granted with
/// [`request`](TestSubscriber::request).
pub struct TestSubscriber<T, E> {
  initial: Demand,
  per_value: Demand,
  events: Mutex<Vec<Event<T, E>>>,
  subscription: Mutex<Option<BoxedSubscription>>,
}

impl<T, E> TestSubscriber<T, E> {
  pub fn new(initial: Demand) -> Arc<Self> { Self::with_demand_per_value(initial, Demand::NONE) }

  pub fn with_demand_per_value(initial: Demand, per_value: Demand) -> Arc<Self> {
    Arc::new(TestSubscriber {
      initial,
      per_value,
      events: Mutex::new(Vec::new()),
      subscription: Mutex::new(None),
    })
  }

  /// Grants more credit through the held subscription.
  pub fn request(&self, demand: Demand) {
    let subscription = self.subscription.lock().clone();
    if let Some(subscription) = subscription {
      subscription.request(demand);
    }
  }

  /// Cancels the held subscription. Calling it again cancels again, which a
  /// conforming subscription ignores.
  pub fn cancel(&self) {
    let subscription = self.subscription.lock().clone();
    if let Some(subscription) = subscription {
      subscription.cancel();
    }
  }

  /// Number of terminal signals received; anything above one is a protocol
  /// violation.
  pub fn completions(&self) -> usize {
    self.events.lock().iter().filter(|e| matches!(e, Event::Completion(_))).count()
  }
}

impl<T: Clone, E: Clone> TestSubscriber<T, E> {
  pub fn events(&self) -> Vec<Event<T, E>> { self.events.lock().clone() }

  pub fn values(&self) -> Vec<T> {
    self
      .events
      .lock()
      .iter()
      .filter_map(|e| match e {
        Event::Value(v) => Some(v.clone()),
        _ => None,
      })
      .collect()
  }

  /// The first terminal signal, if any.
  pub fn completion(&self) -> Option<Completion<E>> {
    self.events.lock().iter().find_map(|e| match e {
      Event::Completion(c) => Some(c.clone()),
      _ => None,
    })
  }
}

impl<T, E> Subscriber for TestSubscriber<T, E>
where
  T: Send,
  E: Send,
{
  type Item = T;
  type Err = E;

  fn on_subscribe(&self, subscription: BoxedSubscription) {
    {
      let mut held = self.subscription.lock();
      if held.is_some() {
        drop(held);
        subscription.cancel();
        return;
      }
      *held = Some(subscription.clone());
    }
    self.events.lock().push(Event::Subscribed);
    if !self.initial.is_zero() {
      subscription.request(self.initial);
    }
  }

  fn on_next(&self, value: T) -> Demand {
    self.events.lock().push(Event::Value(value));
    self.per_value
  }

  fn on_complete(&self, completion: Completion<E>) {
    self.events.lock().push(Event::Completion(completion));
  }
}
