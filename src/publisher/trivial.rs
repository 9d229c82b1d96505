use std::marker::PhantomData;

use crate::{
  publisher::Publisher,
  subscriber::{Completion, Subscriber},
  subscription::EmptySubscription,
};

/// Finishes immediately without emitting a value.
pub struct Empty<T, E>(PhantomData<fn() -> (T, E)>);

impl<T, E> Empty<T, E> {
  pub fn new() -> Self { Empty(PhantomData) }
}

impl<T, E> Default for Empty<T, E> {
  fn default() -> Self { Self::new() }
}

impl<T, E> Clone for Empty<T, E> {
  fn clone(&self) -> Self { Self::new() }
}

impl<T, E> Publisher for Empty<T, E> {
  type Item = T;
  type Err = E;

  fn subscribe<S>(self, subscriber: S)
  where
    S: Subscriber<Item = T, Err = E> + 'static,
  {
    subscriber.on_subscribe(EmptySubscription::boxed());
    subscriber.on_complete(Completion::Finished);
  }
}

/// Fails immediately with the given error.
#[derive(Clone)]
pub struct Fail<T, E> {
  err: E,
  _hint: PhantomData<fn() -> T>,
}

impl<T, E> Fail<T, E> {
  pub fn new(err: E) -> Self { Fail { err, _hint: PhantomData } }
}

impl<T, E> Publisher for Fail<T, E> {
  type Item = T;
  type Err = E;

  fn subscribe<S>(self, subscriber: S)
  where
    S: Subscriber<Item = T, Err = E> + 'static,
  {
    subscriber.on_subscribe(EmptySubscription::boxed());
    subscriber.on_complete(Completion::Failure(self.err));
  }
}
