//! Closure-driven terminal subscriber.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
  demand::Demand,
  ops::relay::Hint,
  subscriber::{Completion, Subscriber},
  subscription::{BoxedSubscription, Subscription, SubscriptionState, Transition},
};

/// Requests unlimited demand and hands every value to `on_value`; the
/// terminal signal goes to `on_completion`. Cancelling the sink cancels the
/// upstream and suppresses `on_completion`.
pub struct Sink<N, C, T, E> {
  on_value: Mutex<N>,
  on_completion: Mutex<Option<C>>,
  state: SubscriptionState,
  _hint: Hint<(T, E)>,
}

impl<N, C, T, E> Sink<N, C, T, E> {
  pub fn new(on_value: N, on_completion: C) -> Arc<Self> {
    Arc::new(Sink {
      on_value: Mutex::new(on_value),
      on_completion: Mutex::new(Some(on_completion)),
      state: SubscriptionState::new(),
      _hint: Hint::default(),
    })
  }
}

impl<N, C, T, E> Subscriber for Sink<N, C, T, E>
where
  N: FnMut(T) + Send,
  C: FnOnce(Completion<E>) + Send,
{
  type Item = T;
  type Err = E;

  fn on_subscribe(&self, subscription: BoxedSubscription) {
    if self.state.attach(subscription) {
      self.request(Demand::UNLIMITED);
    }
  }

  fn on_next(&self, value: T) -> Demand {
    if !self.state.is_finished() {
      let mut on_value = self.on_value.lock();
      (*on_value)(value);
    }
    Demand::NONE
  }

  fn on_complete(&self, completion: Completion<E>) {
    if let Transition::Terminated(_) = self.state.finish() {
      let on_completion = self.on_completion.lock().take();
      if let Some(on_completion) = on_completion {
        on_completion(completion);
      }
    }
  }
}

impl<N: Send, C: Send, T, E> Subscription for Sink<N, C, T, E> {
  fn request(&self, demand: Demand) {
    if let Some(upstream) = self.state.request(demand) {
      upstream.request(demand);
    }
  }

  fn cancel(&self) {
    if let Transition::Terminated(upstream) = self.state.finish() {
      tracing::trace!("sink cancelled");
      self.on_completion.lock().take();
      if let Some(upstream) = upstream {
        upstream.cancel();
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use parking_lot::Mutex;

  use crate::prelude::*;

  #[rxflow_macro::test]
  fn receives_values_and_completion() {
    let values = Arc::new(Mutex::new(Vec::new()));
    let done = Arc::new(Mutex::new(None));
    let (c_values, c_done) = (values.clone(), done.clone());

    let guard = Sequence::<_, ()>::new(1..=3)
      .sink(move |v| c_values.lock().push(v), move |c| *c_done.lock() = Some(c));

    assert_eq!(*values.lock(), vec![1, 2, 3]);
    assert_eq!(*done.lock(), Some(Completion::Finished));
    guard.detach();
  }

  #[rxflow_macro::test]
  fn dropping_guard_cancels_quietly() {
    let source = ManualPublisher::<i32, ()>::new();
    let done = Arc::new(Mutex::new(None));
    let c_done = done.clone();

    let guard = source.clone().sink(|_| {}, move |c| *c_done.lock() = Some(c));
    assert_eq!(source.requested(), Demand::UNLIMITED);

    drop(guard);
    assert_eq!(source.cancellations(), 1);
    source.complete(Completion::Finished);
    assert_eq!(*done.lock(), None);
  }
}
