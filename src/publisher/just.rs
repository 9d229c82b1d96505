use std::{marker::PhantomData, sync::Arc};

use parking_lot::Mutex;

use crate::{
  demand::Demand,
  publisher::Publisher,
  subscriber::{Completion, Subscriber},
  subscription::Subscription,
};

/// Emits a single value on the first positive demand, then finishes.
#[derive(Clone)]
pub struct Just<T, E> {
  value: T,
  _hint: PhantomData<fn() -> E>,
}

impl<T, E> Just<T, E> {
  pub fn new(value: T) -> Self { Just { value, _hint: PhantomData } }
}

enum Slot<T> {
  Pending(T),
  Delivering,
  Done,
}

struct JustSubscription<S, T> {
  downstream: S,
  slot: Mutex<Slot<T>>,
}

impl<T, E> Publisher for Just<T, E>
where
  T: Send + 'static,
  E: 'static,
{
  type Item = T;
  type Err = E;

  fn subscribe<S>(self, subscriber: S)
  where
    S: Subscriber<Item = T, Err = E> + 'static,
  {
    let subscription =
      Arc::new(JustSubscription { downstream: subscriber, slot: Mutex::new(Slot::Pending(self.value)) });
    subscription.downstream.on_subscribe(subscription.clone());
  }
}

impl<S, T> Subscription for JustSubscription<S, T>
where
  T: Send,
  S: Subscriber<Item = T>,
{
  fn request(&self, demand: Demand) {
    if demand.is_zero() {
      return;
    }
    let value = {
      let mut slot = self.slot.lock();
      match std::mem::replace(&mut *slot, Slot::Delivering) {
        Slot::Pending(value) => value,
        other => {
          *slot = other;
          return;
        }
      }
    };

    self.downstream.on_next(value);

    let delivered = std::mem::replace(&mut *self.slot.lock(), Slot::Done);
    if let Slot::Delivering = delivered {
      self.downstream.on_complete(Completion::Finished);
    }
  }

  fn cancel(&self) { *self.slot.lock() = Slot::Done; }
}

#[cfg(test)]
mod tests {
  use crate::prelude::*;

  #[rxflow_macro::test]
  fn waits_for_demand() {
    let subscriber = TestSubscriber::<&str, ()>::new(Demand::NONE);
    Just::new("hi").subscribe(subscriber.clone());
    assert_eq!(subscriber.events(), vec![Event::Subscribed]);

    subscriber.request(Demand::max(1));
    subscriber.request(Demand::max(1));
    assert_eq!(
      subscriber.events(),
      vec![Event::Subscribed, Event::Value("hi"), Event::Completion(Completion::Finished)]
    );
  }

  #[rxflow_macro::test]
  fn cancel_before_request() {
    let subscriber = TestSubscriber::<i32, ()>::new(Demand::NONE);
    Just::new(1).subscribe(subscriber.clone());
    subscriber.cancel();
    subscriber.request(Demand::UNLIMITED);
    assert_eq!(subscriber.events(), vec![Event::Subscribed]);
  }
}
