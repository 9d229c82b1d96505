//! Demand-driven publisher over an iterator.

use std::{marker::PhantomData, sync::Arc};

use parking_lot::Mutex;

use crate::{
  demand::Demand,
  publisher::Publisher,
  subscriber::{Completion, Subscriber},
  subscription::{EmptySubscription, Subscription},
};

/// Emits the items of an iterator, no faster than requested.
///
/// The iterator is pulled one item ahead, so the stream finishes right after
/// the last value without waiting for more demand. A `request` made from
/// inside `on_next` only adds credit; the running delivery loop picks it up,
/// which keeps the call stack flat.
///
/// ```
/// use rxflow::prelude::*;
///
/// let subscriber = TestSubscriber::<i32, ()>::new(Demand::max(2));
/// Sequence::new(1..=4).subscribe(subscriber.clone());
/// assert_eq!(subscriber.values(), vec![1, 2]);
///
/// subscriber.request(Demand::UNLIMITED);
/// assert_eq!(subscriber.values(), vec![1, 2, 3, 4]);
/// assert_eq!(subscriber.completion(), Some(Completion::Finished));
/// ```
pub struct Sequence<I, E> {
  iter: I,
  _hint: PhantomData<fn() -> E>,
}

impl<I: Clone, E> Clone for Sequence<I, E> {
  fn clone(&self) -> Self { Sequence { iter: self.iter.clone(), _hint: PhantomData } }
}

impl<I: IntoIterator, E> Sequence<I, E> {
  pub fn new(iter: I) -> Self { Sequence { iter, _hint: PhantomData } }
}

struct Emission<It: Iterator> {
  iter: Option<It>,
  next: Option<It::Item>,
  demand: Demand,
  emitting: bool,
  cancelled: bool,
}

struct SequenceSubscription<S, It: Iterator> {
  downstream: S,
  state: Mutex<Emission<It>>,
}

impl<I, E> Publisher for Sequence<I, E>
where
  I: IntoIterator,
  I::IntoIter: Send + 'static,
  I::Item: Send + 'static,
  E: 'static,
{
  type Item = I::Item;
  type Err = E;

  fn subscribe<S>(self, subscriber: S)
  where
    S: Subscriber<Item = I::Item, Err = E> + 'static,
  {
    let mut iter = self.iter.into_iter();
    match iter.next() {
      None => {
        subscriber.on_subscribe(EmptySubscription::boxed());
        subscriber.on_complete(Completion::Finished);
      }
      Some(first) => {
        let subscription = Arc::new(SequenceSubscription {
          downstream: subscriber,
          state: Mutex::new(Emission {
            iter: Some(iter),
            next: Some(first),
            demand: Demand::NONE,
            emitting: false,
            cancelled: false,
          }),
        });
        subscription.downstream.on_subscribe(subscription.clone());
      }
    }
  }
}

impl<S, It> Subscription for SequenceSubscription<S, It>
where
  It: Iterator + Send,
  It::Item: Send,
  S: Subscriber<Item = It::Item>,
{
  fn request(&self, demand: Demand) {
    let mut state = self.state.lock();
    if state.cancelled {
      return;
    }
    state.demand += demand;
    if state.emitting {
      return;
    }
    state.emitting = true;

    loop {
      if !state.demand.take_one() {
        state.emitting = false;
        return;
      }
      let Some(value) = state.next.take() else {
        state.emitting = false;
        return;
      };
      state.next = state.iter.as_mut().and_then(Iterator::next);
      let exhausted = state.next.is_none();
      drop(state);

      let more = self.downstream.on_next(value);

      state = self.state.lock();
      if state.cancelled {
        return;
      }
      if exhausted {
        state.cancelled = true;
        state.iter = None;
        drop(state);
        self.downstream.on_complete(Completion::Finished);
        return;
      }
      state.demand += more;
    }
  }

  fn cancel(&self) {
    let mut state = self.state.lock();
    state.cancelled = true;
    state.iter = None;
    state.next = None;
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use crate::prelude::*;

  #[rxflow_macro::test]
  fn empty_iterator_finishes_immediately() {
    let subscriber = TestSubscriber::<i32, ()>::new(Demand::NONE);
    Sequence::new(Vec::<i32>::new()).subscribe(subscriber.clone());

    assert_eq!(
      subscriber.events(),
      vec![Event::Subscribed, Event::Completion(Completion::Finished)]
    );
  }

  #[rxflow_macro::test]
  fn never_exceeds_demand() {
    for n in 0..6u64 {
      let subscriber = TestSubscriber::<u64, ()>::new(Demand::max(n));
      Sequence::new(0..100u64).subscribe(subscriber.clone());
      assert_eq!(subscriber.values(), (0..n).collect::<Vec<_>>());
    }
  }

  #[rxflow_macro::test]
  fn demand_returned_from_on_next_is_honored() {
    let subscriber = TestSubscriber::<i32, ()>::with_demand_per_value(Demand::max(1), Demand::max(1));
    Sequence::new(0..5).subscribe(subscriber.clone());

    assert_eq!(subscriber.values(), vec![0, 1, 2, 3, 4]);
    assert_eq!(subscriber.completion(), Some(Completion::Finished));
  }

  #[rxflow_macro::test]
  fn reentrant_request_does_not_recurse() {
    struct Reentrant {
      inner: Arc<TestSubscriber<i32, ()>>,
    }

    impl Subscriber for Reentrant {
      type Item = i32;
      type Err = ();

      fn on_subscribe(&self, subscription: BoxedSubscription) { self.inner.on_subscribe(subscription) }

      fn on_next(&self, value: i32) -> Demand {
        self.inner.on_next(value);
        self.inner.request(Demand::max(1));
        Demand::NONE
      }

      fn on_complete(&self, completion: Completion<()>) { self.inner.on_complete(completion) }
    }

    let inner = TestSubscriber::new(Demand::max(1));
    Sequence::new(0..10_000).subscribe(Reentrant { inner: inner.clone() });

    assert_eq!(inner.values().len(), 10_000);
    assert_eq!(inner.completion(), Some(Completion::Finished));
  }

  #[rxflow_macro::test]
  fn cancel_stops_delivery_without_completion() {
    let subscriber = TestSubscriber::<i32, ()>::new(Demand::max(2));
    Sequence::new(0..10).subscribe(subscriber.clone());
    subscriber.cancel();
    subscriber.request(Demand::UNLIMITED);

    assert_eq!(subscriber.values(), vec![0, 1]);
    assert_eq!(subscriber.completion(), None);
  }
}
