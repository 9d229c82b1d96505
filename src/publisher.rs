//! Publisher trait and the operator surface.
//!
//! A publisher is a recipe for a stream: subscribing hands it a subscriber,
//! and the publisher answers with exactly one `on_subscribe`. Values only flow
//! once the subscriber requests them.

use std::sync::Arc;

use crate::{
  demand::Demand,
  ops::{
    buffer::{Buffer, Prefetch, WhenFull},
    decode::{Decode, Decoder},
    flat_map::FlatMap,
    into_stream::IntoStream,
    prefix_while::{PrefixWhile, TryPrefixWhile},
    sink::Sink,
  },
  subscriber::{Completion, Subscriber},
  subscription::SubscriptionGuard,
};

pub mod just;
pub mod sequence;
pub mod subject;
pub mod trivial;

pub use just::Just;
pub use sequence::Sequence;
pub use subject::PassthroughSubject;
pub use trivial::{Empty, Fail};

/// Publisher: the producer side of the protocol.
pub trait Publisher: Sized {
  type Item;
  type Err;

  /// Attaches `subscriber`. The publisher calls `on_subscribe` on it at most
  /// once and pushes values only as far as the granted demand allows.
  fn subscribe<S>(self, subscriber: S)
  where
    S: Subscriber<Item = Self::Item, Err = Self::Err> + 'static;

  /// Maps every value to an inner publisher and merges their outputs,
  /// keeping at most `max_publishers` inner publishers subscribed at once.
  ///
  /// # Panics
  ///
  /// When `max_publishers` is [`Demand::NONE`].
  fn flat_map<P, F>(self, max_publishers: Demand, transform: F) -> FlatMap<Self, F>
  where
    P: Publisher<Err = Self::Err>,
    F: FnMut(Self::Item) -> P + Send + 'static,
  {
    FlatMap::new(self, max_publishers, transform)
  }

  /// Puts a queue of at most `size` values between upstream and downstream.
  ///
  /// # Panics
  ///
  /// When `size` is zero.
  fn buffer(self, size: usize, prefetch: Prefetch, when_full: WhenFull<Self::Err>) -> Buffer<Self> {
    Buffer::new(self, size, prefetch, when_full)
  }

  /// Relays values while `predicate` holds, then finishes.
  fn prefix_while<P>(self, predicate: P) -> PrefixWhile<Self, P>
  where
    P: FnMut(&Self::Item) -> bool + Send + 'static,
  {
    PrefixWhile { source: self, predicate }
  }

  /// Relays values while `predicate` returns `Ok(true)`; finishes on
  /// `Ok(false)` and fails on `Err`.
  fn try_prefix_while<P>(self, predicate: P) -> TryPrefixWhile<Self, P>
  where
    P: FnMut(&Self::Item) -> Result<bool, Self::Err> + Send + 'static,
  {
    TryPrefixWhile { source: self, predicate }
  }

  /// Decodes every value with `decoder`.
  fn decode<D>(self, decoder: D) -> Decode<Self, D>
  where
    D: Decoder<Self::Item>,
    Self::Err: From<D::Error>,
  {
    Decode { source: self, decoder }
  }

  /// Subscribes closures with unlimited demand. Dropping the returned guard
  /// cancels the subscription.
  fn sink<N, C>(self, on_value: N, on_completion: C) -> SubscriptionGuard<Arc<Sink<N, C, Self::Item, Self::Err>>>
  where
    N: FnMut(Self::Item) + Send + 'static,
    C: FnOnce(Completion<Self::Err>) + Send + 'static,
    Self::Item: 'static,
    Self::Err: 'static,
  {
    let sink = Sink::new(on_value, on_completion);
    self.subscribe(sink.clone());
    SubscriptionGuard::new(sink)
  }

  /// Converts the publisher into a `futures::Stream` that pulls one value per
  /// poll.
  fn into_stream(self) -> IntoStream<Self::Item, Self::Err>
  where
    Self::Item: Send + 'static,
    Self::Err: Send + 'static,
  {
    IntoStream::new(self)
  }
}
