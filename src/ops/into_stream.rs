//! IntoStream Operator
//!
//! Bridges a publisher into `futures::Stream`. The stream pulls: every poll
//! that finds nothing queued requests one value from upstream, so the
//! publisher never runs ahead of the consumer.
//!
//! # Example
//!
//! ```rust
//! use futures::{executor::block_on, StreamExt};
//! use rxflow::prelude::*;
//!
//! let values: Vec<Result<i32, ()>> = block_on(Sequence::new(1..=3).into_stream().collect());
//! assert_eq!(values, vec![Ok(1), Ok(2), Ok(3)]);
//! ```

use std::{
  collections::VecDeque,
  pin::Pin,
  sync::Arc,
  task::{Context as AsyncContext, Poll, Waker},
};

use futures::Stream;
use parking_lot::Mutex;

use crate::{
  demand::Demand,
  publisher::Publisher,
  subscriber::{Completion, Subscriber},
  subscription::BoxedSubscription,
};

/// State shared between the upstream subscriber and the stream consumer.
struct StreamState<T, E> {
  subscription: Option<BoxedSubscription>,
  queue: VecDeque<T>,
  completion: Option<Completion<E>>,
  /// A one-value request is outstanding.
  in_flight: bool,
  /// The stream has yielded its end, or was dropped.
  closed: bool,
  waker: Option<Waker>,
}

type Shared<T, E> = Arc<Mutex<StreamState<T, E>>>;

/// A `Stream` of the values of a publisher.
///
/// Yields `Ok(value)` per value, one `Err(error)` when the publisher fails
/// and then ends. Dropping the stream cancels the subscription.
pub struct IntoStream<T, E> {
  state: Shared<T, E>,
}

impl<T, E> IntoStream<T, E>
where
  T: Send + 'static,
  E: Send + 'static,
{
  pub fn new<P>(publisher: P) -> Self
  where
    P: Publisher<Item = T, Err = E>,
  {
    let state = Arc::new(Mutex::new(StreamState {
      subscription: None,
      queue: VecDeque::new(),
      completion: None,
      in_flight: false,
      closed: false,
      waker: None,
    }));
    publisher.subscribe(StreamSubscriber { state: state.clone() });
    IntoStream { state }
  }
}

impl<T, E> Stream for IntoStream<T, E> {
  type Item = Result<T, E>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut AsyncContext<'_>) -> Poll<Option<Self::Item>> {
    loop {
      let mut state = self.state.lock();
      if let Some(value) = state.queue.pop_front() {
        return Poll::Ready(Some(Ok(value)));
      }
      match state.completion.take() {
        Some(Completion::Failure(err)) => {
          state.closed = true;
          return Poll::Ready(Some(Err(err)));
        }
        Some(Completion::Finished) => state.closed = true,
        None => {}
      }
      if state.closed {
        return Poll::Ready(None);
      }

      state.waker = Some(cx.waker().clone());
      if state.in_flight {
        return Poll::Pending;
      }
      let Some(subscription) = state.subscription.clone() else {
        return Poll::Pending;
      };
      state.in_flight = true;
      drop(state);
      // A synchronous publisher answers inside this call.
      subscription.request(Demand::max(1));
    }
  }
}

impl<T, E> Drop for IntoStream<T, E> {
  fn drop(&mut self) {
    let subscription = {
      let mut state = self.state.lock();
      state.closed = true;
      state.queue.clear();
      state.subscription.take()
    };
    if let Some(subscription) = subscription {
      tracing::trace!("stream dropped, cancelling subscription");
      subscription.cancel();
    }
  }
}

struct StreamSubscriber<T, E> {
  state: Shared<T, E>,
}

impl<T, E> StreamSubscriber<T, E> {
  fn wake(waker: Option<Waker>) {
    if let Some(waker) = waker {
      waker.wake();
    }
  }
}

impl<T: Send, E: Send> Subscriber for StreamSubscriber<T, E> {
  type Item = T;
  type Err = E;

  fn on_subscribe(&self, subscription: BoxedSubscription) {
    let waker = {
      let mut state = self.state.lock();
      if state.closed || state.subscription.is_some() {
        drop(state);
        subscription.cancel();
        return;
      }
      state.subscription = Some(subscription);
      state.waker.take()
    };
    Self::wake(waker);
  }

  fn on_next(&self, value: T) -> Demand {
    let waker = {
      let mut state = self.state.lock();
      if state.closed {
        return Demand::NONE;
      }
      state.queue.push_back(value);
      state.in_flight = false;
      state.waker.take()
    };
    Self::wake(waker);
    Demand::NONE
  }

  fn on_complete(&self, completion: Completion<E>) {
    let waker = {
      let mut state = self.state.lock();
      if state.closed || state.completion.is_some() {
        return;
      }
      state.completion = Some(completion);
      state.subscription = None;
      state.waker.take()
    };
    Self::wake(waker);
  }
}
