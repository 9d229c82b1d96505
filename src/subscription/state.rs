//! The subscription-side lifecycle shared by every single-upstream operator.
//!
//! ```text
//! waiting ──attach──▶ subscribing(demand) ──finish──▶ finished
//!    └───────────────────finish────────────────────────▲
//! ```
//!
//! All transitions happen under one non-reentrant lock and never call out
//! while holding it. `finish` hands the upstream subscription to exactly one
//! caller; everyone else learns the state was already terminal.

use parking_lot::Mutex;

use crate::{demand::Demand, subscription::BoxedSubscription};

enum State {
  Waiting,
  Subscribing { upstream: BoxedSubscription, demand: Demand },
  Finished,
}

/// Observable snapshot of a [`SubscriptionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Waiting,
  Subscribing(Demand),
  Finished,
}

/// Result of [`SubscriptionState::finish`].
#[must_use]
pub enum Transition {
  /// This caller moved the state to finished and owns the cleanup. Carries
  /// the upstream subscription if one had been attached.
  Terminated(Option<BoxedSubscription>),
  /// Somebody else got there first; nothing left to do.
  AlreadyFinished,
}

pub struct SubscriptionState(Mutex<State>);

impl Default for SubscriptionState {
  fn default() -> Self { Self::new() }
}

impl SubscriptionState {
  pub fn new() -> Self { SubscriptionState(Mutex::new(State::Waiting)) }

  pub fn status(&self) -> Status {
    match &*self.0.lock() {
      State::Waiting => Status::Waiting,
      State::Subscribing { demand, .. } => Status::Subscribing(*demand),
      State::Finished => Status::Finished,
    }
  }

  pub fn is_finished(&self) -> bool { matches!(*self.0.lock(), State::Finished) }

  /// Stores the upstream subscription.
  ///
  /// A second subscription, or one that arrives after the state finished, is
  /// cancelled on the spot and `false` is returned.
  pub fn attach(&self, upstream: BoxedSubscription) -> bool {
    let mut state = self.0.lock();
    match *state {
      State::Waiting => {
        *state = State::Subscribing { upstream, demand: Demand::NONE };
        true
      }
      State::Subscribing { .. } => {
        drop(state);
        tracing::warn!("upstream delivered a second subscription, cancelling it");
        upstream.cancel();
        false
      }
      State::Finished => {
        drop(state);
        upstream.cancel();
        false
      }
    }
  }

  /// Records credit granted by downstream and returns the upstream it should
  /// be forwarded to.
  pub fn request(&self, more: Demand) -> Option<BoxedSubscription> {
    match &mut *self.0.lock() {
      State::Subscribing { upstream, demand } => {
        *demand += more;
        Some(upstream.clone())
      }
      _ => None,
    }
  }

  /// Consumes one unit of credit for a value about to be delivered.
  ///
  /// Returns `false` when the state is not subscribing or when no credit is
  /// left, in which case the value must not reach downstream.
  pub fn take_one(&self) -> bool {
    match &mut *self.0.lock() {
      State::Subscribing { demand, .. } => demand.take_one(),
      _ => false,
    }
  }

  /// Adds credit returned from a downstream `on_next`.
  pub fn add_demand(&self, more: Demand) {
    if let State::Subscribing { demand, .. } = &mut *self.0.lock() {
      *demand += more;
    }
  }

  /// Moves to finished. Only the first caller gets [`Transition::Terminated`].
  pub fn finish(&self) -> Transition {
    let previous = std::mem::replace(&mut *self.0.lock(), State::Finished);
    match previous {
      State::Waiting => Transition::Terminated(None),
      State::Subscribing { upstream, .. } => Transition::Terminated(Some(upstream)),
      State::Finished => Transition::AlreadyFinished,
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  };

  use super::*;
  use crate::subscription::Subscription;

  #[derive(Default)]
  struct Cancels(AtomicUsize);

  impl Subscription for Cancels {
    fn request(&self, _demand: Demand) {}

    fn cancel(&self) { self.0.fetch_add(1, Ordering::SeqCst); }
  }

  #[rxflow_macro::test]
  fn lifecycle() {
    let state = SubscriptionState::new();
    assert_eq!(state.status(), Status::Waiting);
    assert!(!state.take_one());

    let upstream = Arc::new(Cancels::default());
    assert!(state.attach(upstream.clone()));
    assert_eq!(state.status(), Status::Subscribing(Demand::NONE));

    assert!(state.request(Demand::max(1)).is_some());
    assert!(state.take_one());
    assert!(!state.take_one());
    state.add_demand(Demand::max(2));
    assert_eq!(state.status(), Status::Subscribing(Demand::max(2)));

    assert!(matches!(state.finish(), Transition::Terminated(Some(_))));
    assert!(matches!(state.finish(), Transition::AlreadyFinished));
    assert!(state.is_finished());
    assert!(state.request(Demand::UNLIMITED).is_none());
  }

  #[rxflow_macro::test]
  fn late_and_duplicate_subscriptions_are_cancelled() {
    let state = SubscriptionState::new();
    let first = Arc::new(Cancels::default());
    let second = Arc::new(Cancels::default());
    assert!(state.attach(first.clone()));
    assert!(!state.attach(second.clone()));
    assert_eq!(second.0.load(Ordering::SeqCst), 1);
    assert_eq!(first.0.load(Ordering::SeqCst), 0);

    let _ = state.finish();
    let late = Arc::new(Cancels::default());
    assert!(!state.attach(late.clone()));
    assert_eq!(late.0.load(Ordering::SeqCst), 1);
  }

  #[rxflow_macro::test]
  fn exactly_one_thread_wins_finish() {
    let state = Arc::new(SubscriptionState::new());
    assert!(state.attach(Arc::new(Cancels::default())));
    let winners = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
      .map(|_| {
        let state = state.clone();
        let winners = winners.clone();
        std::thread::spawn(move || {
          if let Transition::Terminated(_) = state.finish() {
            winners.fetch_add(1, Ordering::SeqCst);
          }
        })
      })
      .collect();
    handles.into_iter().for_each(|h| h.join().unwrap());

    assert_eq!(winners.load(Ordering::SeqCst), 1);
  }
}
