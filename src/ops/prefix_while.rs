//! PrefixWhile operator implementation
//!
//! Relays upstream values unchanged while a predicate accepts them. The first
//! rejected value ends the stream normally: upstream is cancelled, downstream
//! receives `Finished`, and the rejected value is dropped. The fallible
//! variant ends the stream with the predicate's error instead.

use std::marker::PhantomData;

use crate::{
  ops::relay::{Hint, Relay, RelayStep, Step},
  publisher::Publisher,
  subscriber::Subscriber,
};

/// PrefixWhile operator: emits values while a predicate returns true.
///
/// # Examples
///
/// ```
/// use rxflow::prelude::*;
///
/// let subscriber = TestSubscriber::<i32, ()>::new(Demand::UNLIMITED);
/// Sequence::new(0..10).prefix_while(|v| *v < 3).subscribe(subscriber.clone());
/// assert_eq!(subscriber.values(), vec![0, 1, 2]);
/// assert_eq!(subscriber.completion(), Some(Completion::Finished));
/// ```
#[derive(Clone)]
pub struct PrefixWhile<S, P> {
  pub source: S,
  pub predicate: P,
}

/// TryPrefixWhile operator: like [`PrefixWhile`], but the predicate may fail,
/// which fails the stream with that error.
#[derive(Clone)]
pub struct TryPrefixWhile<S, P> {
  pub source: S,
  pub predicate: P,
}

/// Evaluates a prefix predicate, turning the infallible form into the
/// fallible one so both variants share one step.
pub trait PrefixPredicate<T, E>: Send {
  fn test(&mut self, value: &T) -> Result<bool, E>;
}

pub struct Infallible<P>(P);

pub struct Fallible<P>(P);

impl<T, E, P> PrefixPredicate<T, E> for Infallible<P>
where
  P: FnMut(&T) -> bool + Send,
{
  #[inline]
  fn test(&mut self, value: &T) -> Result<bool, E> { Ok((self.0)(value)) }
}

impl<T, E, P> PrefixPredicate<T, E> for Fallible<P>
where
  P: FnMut(&T) -> Result<bool, E> + Send,
{
  #[inline]
  fn test(&mut self, value: &T) -> Result<bool, E> { (self.0)(value) }
}

pub struct PrefixStep<T, E, P> {
  predicate: P,
  _hint: Hint<(T, E)>,
}

impl<T, E, P> PrefixStep<T, E, P> {
  fn new(predicate: P) -> Self { PrefixStep { predicate, _hint: PhantomData } }
}

impl<T, E, P> RelayStep for PrefixStep<T, E, P>
where
  P: PrefixPredicate<T, E>,
{
  type In = T;
  type Out = T;
  type Err = E;

  fn step(&mut self, value: T) -> Step<T, E> {
    match self.predicate.test(&value) {
      Ok(true) => Step::Emit(value),
      Ok(false) => Step::Finish,
      Err(err) => Step::Fail(err),
    }
  }
}

impl<S, P> Publisher for PrefixWhile<S, P>
where
  S: Publisher,
  S::Item: 'static,
  S::Err: 'static,
  P: FnMut(&S::Item) -> bool + Send + 'static,
{
  type Item = S::Item;
  type Err = S::Err;

  fn subscribe<O>(self, subscriber: O)
  where
    O: Subscriber<Item = S::Item, Err = S::Err> + 'static,
  {
    let PrefixWhile { source, predicate } = self;
    source.subscribe(Relay::new(subscriber, PrefixStep::new(Infallible(predicate))));
  }
}

impl<S, P> Publisher for TryPrefixWhile<S, P>
where
  S: Publisher,
  S::Item: 'static,
  S::Err: 'static,
  P: FnMut(&S::Item) -> Result<bool, S::Err> + Send + 'static,
{
  type Item = S::Item;
  type Err = S::Err;

  fn subscribe<O>(self, subscriber: O)
  where
    O: Subscriber<Item = S::Item, Err = S::Err> + 'static,
  {
    let TryPrefixWhile { source, predicate } = self;
    source.subscribe(Relay::new(subscriber, PrefixStep::new(Fallible(predicate))));
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  };

  use crate::prelude::*;

  #[derive(Debug, Clone, PartialEq)]
  struct Rejected(i32);

  #[rxflow_macro::test]
  fn stops_at_first_rejected_value() {
    let subscriber = TestSubscriber::<i32, ()>::new(Demand::UNLIMITED);

    Sequence::new(0..100)
      .prefix_while(|v| *v < 50)
      .subscribe(subscriber.clone());

    assert_eq!(subscriber.values(), (0..50).collect::<Vec<_>>());
    assert_eq!(subscriber.completion(), Some(Completion::Finished));
  }

  #[rxflow_macro::test]
  fn rejected_value_cancels_upstream() {
    let source = ManualPublisher::<i32, ()>::new();
    let subscriber = TestSubscriber::new(Demand::max(10));

    source.clone().prefix_while(|v| *v != 3).subscribe(subscriber.clone());
    assert_eq!(source.requested(), Demand::max(10));

    source.send(1);
    source.send(3);
    assert!(source.is_cancelled());

    source.send(4);
    source.complete(Completion::Failure(()));
    assert_eq!(subscriber.values(), vec![1]);
    assert_eq!(subscriber.completion(), Some(Completion::Finished));
    assert_eq!(subscriber.completions(), 1);
  }

  #[rxflow_macro::test]
  fn upstream_failure_passes_through() {
    let subscriber = TestSubscriber::new(Demand::UNLIMITED);

    Fail::<i32, _>::new(Rejected(7))
      .prefix_while(|_| true)
      .subscribe(subscriber.clone());

    assert_eq!(subscriber.values(), Vec::<i32>::new());
    assert_eq!(subscriber.completion(), Some(Completion::Failure(Rejected(7))));
  }

  #[rxflow_macro::test]
  fn throwing_predicate_fails_once() {
    let source = ManualPublisher::<i32, Rejected>::new();
    let subscriber = TestSubscriber::new(Demand::UNLIMITED);
    let calls = Arc::new(AtomicUsize::new(0));
    let c_calls = calls.clone();

    source
      .clone()
      .try_prefix_while(move |v| {
        c_calls.fetch_add(1, Ordering::SeqCst);
        Err(Rejected(*v))
      })
      .subscribe(subscriber.clone());

    for v in 0..5 {
      source.send(v);
    }

    assert_eq!(subscriber.values(), Vec::<i32>::new());
    assert_eq!(subscriber.completion(), Some(Completion::Failure(Rejected(0))));
    assert_eq!(subscriber.completions(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(source.is_cancelled());
  }

  #[rxflow_macro::test]
  fn try_variant_finishes_normally_on_false() {
    let subscriber = TestSubscriber::<i32, Rejected>::new(Demand::UNLIMITED);

    Sequence::new(1..=5)
      .try_prefix_while(|v| Ok(*v < 3))
      .subscribe(subscriber.clone());

    assert_eq!(subscriber.values(), vec![1, 2]);
    assert_eq!(subscriber.completion(), Some(Completion::Finished));
  }

  #[rxflow_macro::test]
  fn honors_incremental_demand() {
    let subscriber = TestSubscriber::<i32, ()>::new(Demand::max(2));

    Sequence::new(0..10).prefix_while(|v| *v < 8).subscribe(subscriber.clone());
    assert_eq!(subscriber.values(), vec![0, 1]);
    assert_eq!(subscriber.completion(), None);

    subscriber.request(Demand::max(3));
    assert_eq!(subscriber.values(), vec![0, 1, 2, 3, 4]);

    subscriber.request(Demand::UNLIMITED);
    assert_eq!(subscriber.values(), (0..8).collect::<Vec<_>>());
    assert_eq!(subscriber.completion(), Some(Completion::Finished));
  }

  #[rxflow_macro::test]
  fn overdelivery_is_dropped() {
    let source = ManualPublisher::<i32, ()>::new();
    let subscriber = TestSubscriber::new(Demand::max(1));

    source.clone().prefix_while(|_| true).subscribe(subscriber.clone());
    source.send(1);
    source.send(2);

    assert_eq!(subscriber.values(), vec![1]);
  }

  #[rxflow_macro::test]
  fn cancel_is_idempotent_and_silent() {
    let source = ManualPublisher::<i32, ()>::new();
    let subscriber = TestSubscriber::new(Demand::UNLIMITED);

    source.clone().prefix_while(|_| true).subscribe(subscriber.clone());
    source.send(1);
    subscriber.cancel();
    subscriber.cancel();
    source.send(2);
    source.complete(Completion::Finished);

    assert_eq!(subscriber.values(), vec![1]);
    assert_eq!(subscriber.completion(), None);
    assert_eq!(source.cancellations(), 1);
  }
}
