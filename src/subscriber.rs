//! Subscriber trait: the consuming side of the protocol.
//!
//! A subscriber receives exactly one subscription, any number of values (never
//! more than the credit it granted) and at most one completion. Every method
//! takes `&self`: the same subscriber is shared between the publisher that
//! pushes into it and whoever holds the subscription, possibly on different
//! threads.

use std::sync::Arc;

use crate::{demand::Demand, subscription::BoxedSubscription};

/// Terminal signal of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Completion<E> {
  /// The stream ended normally.
  Finished,
  /// The stream ended with an error.
  Failure(E),
}

impl<E> Completion<E> {
  #[inline]
  pub fn is_failure(&self) -> bool { matches!(self, Completion::Failure(_)) }

  /// Maps the failure payload, leaving `Finished` untouched.
  pub fn map_err<F, E2>(self, f: F) -> Completion<E2>
  where
    F: FnOnce(E) -> E2,
  {
    match self {
      Completion::Finished => Completion::Finished,
      Completion::Failure(err) => Completion::Failure(f(err)),
    }
  }
}

impl<E> From<Result<(), E>> for Completion<E> {
  fn from(result: Result<(), E>) -> Self {
    match result {
      Ok(()) => Completion::Finished,
      Err(err) => Completion::Failure(err),
    }
  }
}

/// Subscriber: the consumer of values in the protocol.
pub trait Subscriber: Send + Sync {
  type Item;
  type Err;

  /// Called once by the publisher with the handle used to request values and
  /// to cancel.
  fn on_subscribe(&self, subscription: BoxedSubscription);

  /// Receives one value.
  ///
  /// The returned demand is *additional* credit on top of whatever credit is
  /// still outstanding. Return [`Demand::NONE`] to keep the current credit.
  fn on_next(&self, value: Self::Item) -> Demand;

  /// Receives the terminal signal. No other method is called afterwards.
  fn on_complete(&self, completion: Completion<Self::Err>);
}

impl<S> Subscriber for Arc<S>
where
  S: Subscriber + ?Sized,
{
  type Item = S::Item;
  type Err = S::Err;

  #[inline]
  fn on_subscribe(&self, subscription: BoxedSubscription) { (**self).on_subscribe(subscription) }

  #[inline]
  fn on_next(&self, value: Self::Item) -> Demand { (**self).on_next(value) }

  #[inline]
  fn on_complete(&self, completion: Completion<Self::Err>) { (**self).on_complete(completion) }
}

/// Type-erased subscriber.
pub type BoxedSubscriber<Item, Err> = Arc<dyn Subscriber<Item = Item, Err = Err>>;

#[cfg(test)]
mod tests {
  use super::*;

  #[rxflow_macro::test]
  fn completion_from_result() {
    assert_eq!(Completion::<()>::from(Ok(())), Completion::Finished);
    assert_eq!(Completion::from(Err::<(), _>(3)), Completion::Failure(3));
  }

  #[rxflow_macro::test]
  fn completion_map_err() {
    assert_eq!(Completion::Failure(2).map_err(|e| e * 10), Completion::Failure(20));
    assert_eq!(Completion::<i32>::Finished.map_err(|e| e * 10), Completion::Finished);
    assert!(Completion::Failure(()).is_failure());
  }
}
