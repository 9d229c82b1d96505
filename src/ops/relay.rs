//! One-upstream, one-downstream relay.
//!
//! The relay sits between an upstream publisher and a downstream subscriber,
//! playing the subscriber role towards upstream and the subscription role
//! towards downstream. Each upstream value goes through a [`RelayStep`] that
//! either emits a value, ends the stream normally or fails it. Prefix-while
//! (both variants) and decode are relays.

use std::{
  marker::PhantomData,
  sync::{Arc, Weak},
};

use parking_lot::Mutex;

use crate::{
  demand::Demand,
  subscriber::{Completion, Subscriber},
  subscription::{BoxedSubscription, Subscription, SubscriptionState, Transition},
};

/// What to do with one upstream value.
pub enum Step<T, E> {
  /// Forward this value downstream.
  Emit(T),
  /// Cancel upstream and finish downstream normally.
  Finish,
  /// Cancel upstream and fail downstream.
  Fail(E),
}

/// Per-value logic of a relay operator.
pub trait RelayStep: Send {
  type In;
  type Out;
  type Err;

  fn step(&mut self, value: Self::In) -> Step<Self::Out, Self::Err>;
}

pub struct Relay<D, R> {
  downstream: D,
  step: Mutex<R>,
  state: SubscriptionState,
  this: Weak<Self>,
}

impl<D, R> Relay<D, R> {
  pub fn new(downstream: D, step: R) -> Arc<Self> {
    Arc::new_cyclic(|this| Relay {
      downstream,
      step: Mutex::new(step),
      state: SubscriptionState::new(),
      this: this.clone(),
    })
  }
}

impl<D, R> Relay<D, R>
where
  R: RelayStep,
  D: Subscriber<Item = R::Out, Err = R::Err>,
{
  fn terminate(&self, completion: Completion<R::Err>) {
    if let Transition::Terminated(upstream) = self.state.finish() {
      tracing::debug!(failed = completion.is_failure(), "relay ended early, cancelling upstream");
      if let Some(upstream) = upstream {
        upstream.cancel();
      }
      self.downstream.on_complete(completion);
    }
  }
}

impl<D, R> Subscriber for Relay<D, R>
where
  R: RelayStep + 'static,
  D: Subscriber<Item = R::Out, Err = R::Err> + 'static,
{
  type Item = R::In;
  type Err = R::Err;

  fn on_subscribe(&self, subscription: BoxedSubscription) {
    if self.state.attach(subscription) {
      if let Some(this) = self.this.upgrade() {
        self.downstream.on_subscribe(this);
      }
    }
  }

  fn on_next(&self, value: R::In) -> Demand {
    if !self.state.take_one() {
      if !self.state.is_finished() {
        tracing::warn!("upstream delivered a value without outstanding demand, dropping it");
      }
      return Demand::NONE;
    }

    // The step lock is released before any downstream call.
    let step = self.step.lock().step(value);
    match step {
      Step::Emit(out) => {
        let more = self.downstream.on_next(out);
        self.state.add_demand(more);
        more
      }
      Step::Finish => {
        self.terminate(Completion::Finished);
        Demand::NONE
      }
      Step::Fail(err) => {
        self.terminate(Completion::Failure(err));
        Demand::NONE
      }
    }
  }

  fn on_complete(&self, completion: Completion<R::Err>) {
    if let Transition::Terminated(_) = self.state.finish() {
      self.downstream.on_complete(completion);
    }
  }
}

impl<D, R> Subscription for Relay<D, R>
where
  R: RelayStep,
  D: Subscriber,
{
  fn request(&self, demand: Demand) {
    if let Some(upstream) = self.state.request(demand) {
      tracing::trace!(%demand, "relay forwarding request upstream");
      upstream.request(demand);
    }
  }

  fn cancel(&self) {
    if let Transition::Terminated(upstream) = self.state.finish() {
      tracing::debug!("relay cancelled");
      if let Some(upstream) = upstream {
        upstream.cancel();
      }
    }
  }
}

/// Type marker that keeps step structs `Send` regardless of `T`.
pub(crate) type Hint<T> = PhantomData<fn() -> T>;
